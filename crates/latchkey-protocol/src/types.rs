//! Types that cross the session boundary.
//!
//! Nothing here knows about locks, stores or clocks. These are plain
//! values: a description of where a token travels, a description of how to
//! write a freshly issued token, and the frozen state of a session at the
//! moment it was closed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// TokenTransport
// ---------------------------------------------------------------------------

/// Where the session token travels between client and server.
///
/// The session core stores this as configuration only; extracting the
/// token from a request is the job of whoever owns the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransport {
    /// A cookie named after the token label.
    #[default]
    Cookie,
    /// A `label=token` pair in the query string.
    Query,
    /// A string field named after the token label in a JSON body.
    Json,
}

impl TokenTransport {
    /// Describes how a token must be written back to the client.
    ///
    /// Cookies get the `label=token; path=/` form that browsers send back
    /// on every request to the site.
    pub fn place(self, label: &str, token: &str) -> TokenPlacement {
        match self {
            Self::Cookie => TokenPlacement::Cookie {
                set_cookie: format!("{label}={token}; path=/"),
            },
            Self::Query => TokenPlacement::Query {
                pair: format!("{label}={token}"),
            },
            Self::Json => TokenPlacement::Json {
                field: label.to_string(),
                value: token.to_string(),
            },
        }
    }

    /// Lower-case name, matching the configuration and JSON spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cookie => "cookie",
            Self::Query => "query",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for TokenTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenTransport {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(Self::Cookie),
            "query" => Ok(Self::Query),
            "json" => Ok(Self::Json),
            _ => Err(ProtocolError::InvalidTransport(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenPlacement
// ---------------------------------------------------------------------------

/// What the response boundary must write so the client sends the token
/// back next time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TokenPlacement {
    /// Value for a `Set-Cookie` response header.
    Cookie { set_cookie: String },
    /// A `label=token` pair to append to redirect or link URLs.
    Query { pair: String },
    /// A field to add to the JSON response body.
    Json { field: String, value: String },
}

impl TokenPlacement {
    /// Name of the response header for cookie placements.
    pub const SET_COOKIE: &'static str = "Set-Cookie";
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// The state of a session at the moment it was closed.
///
/// Close callbacks receive one of these instead of the session itself: by
/// the time they run the session is already gone from the store, and
/// handing out a frozen copy keeps callbacks from touching live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub token: String,
    /// Last time the session was loaded or updated.
    pub update_time: DateTime<Utc>,
    /// Negative means the session never timed out.
    pub timeout_secs: i64,
    pub token_label: String,
    pub transport: TokenTransport,
    /// Role names held when the session closed, sorted.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Shortened form of a token, safe to put in logs.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(6) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // TokenTransport
    // =====================================================================

    #[test]
    fn test_token_transport_default_is_cookie() {
        assert_eq!(TokenTransport::default(), TokenTransport::Cookie);
    }

    #[test]
    fn test_token_transport_parses_case_insensitively() {
        assert_eq!("Query".parse::<TokenTransport>().unwrap(), TokenTransport::Query);
        assert_eq!(" json ".parse::<TokenTransport>().unwrap(), TokenTransport::Json);
        assert_eq!("COOKIE".parse::<TokenTransport>().unwrap(), TokenTransport::Cookie);
    }

    #[test]
    fn test_token_transport_unknown_name_returns_error() {
        let result = "header".parse::<TokenTransport>();

        assert!(matches!(result, Err(ProtocolError::InvalidTransport(s)) if s == "header"));
    }

    #[test]
    fn test_token_transport_serializes_lowercase() {
        let json = serde_json::to_string(&TokenTransport::Json).unwrap();
        assert_eq!(json, "\"json\"");
        assert_eq!(TokenTransport::Query.to_string(), "query");
    }

    // =====================================================================
    // TokenPlacement
    // =====================================================================

    #[test]
    fn test_place_cookie_sets_root_path() {
        let placement = TokenTransport::Cookie.place("sid", "abc");

        assert_eq!(
            placement,
            TokenPlacement::Cookie {
                set_cookie: "sid=abc; path=/".into()
            }
        );
    }

    #[test]
    fn test_place_query_builds_pair() {
        let placement = TokenTransport::Query.place("token", "xyz");

        assert_eq!(placement, TokenPlacement::Query { pair: "token=xyz".into() });
    }

    #[test]
    fn test_place_json_names_field_after_label() {
        let placement = TokenTransport::Json.place("session", "t1");
        let json = serde_json::to_value(&placement).unwrap();

        assert_eq!(json["transport"], "json");
        assert_eq!(json["field"], "session");
        assert_eq!(json["value"], "t1");
    }

    // =====================================================================
    // token_prefix
    // =====================================================================

    #[test]
    fn test_token_prefix_truncates_long_tokens() {
        assert_eq!(token_prefix("abcdefghijkl"), "abcdef");
    }

    #[test]
    fn test_token_prefix_keeps_short_tokens() {
        assert_eq!(token_prefix("abc"), "abc");
        assert_eq!(token_prefix(""), "");
    }
}
