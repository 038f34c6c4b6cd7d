//! Log output setup for binaries built on Latchkey.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a `tracing` subscriber printing to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once (or after another subscriber was installed) is harmless;
/// the first subscriber stays in place.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`] with a different default filter, e.g.
/// `"latchkey_session=debug,info"`.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}
