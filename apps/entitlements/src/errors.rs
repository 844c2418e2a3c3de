use thiserror::Error;

/// Entitlement subsystem error type.
///
/// Errors here stay local to the subsystem: fetch paths record them on the
/// cached snapshot state for consumers to observe, gate and limiter paths
/// resolve them into a deny-or-allow decision. Nothing in this module is
/// expected to take down a caller.
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}
