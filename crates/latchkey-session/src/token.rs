//! Token generation.
//!
//! The store never invents token values itself. It asks a
//! [`TokenGenerator`] for a string of the configured length and leaves
//! uniqueness to the caller (the session retries on collision).

use rand::Rng;
use rand::distr::Alphanumeric;

/// Produces opaque token strings.
///
/// Implemented for any `Fn(usize) -> String`, which keeps test stubs short.
pub trait TokenGenerator: Send + Sync {
    /// Returns a token of `length` characters.
    fn generate(&self, length: usize) -> String;
}

impl<F> TokenGenerator for F
where
    F: Fn(usize) -> String + Send + Sync,
{
    fn generate(&self, length: usize) -> String {
        self(length)
    }
}

/// Alphanumeric tokens from the thread-local CSPRNG.
///
/// 62 symbols per character: the default 32-character token carries about
/// 190 bits of entropy, which makes collisions and guessing impractical.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self, length: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
