use thiserror::Error;

/// Failures at the token store boundary.
///
/// All of these are transient from the engine's point of view: the caller
/// must not assume the token was or was not consumed, and must never retry
/// the redemption blindly (the transaction's side effect may already have
/// been applied).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Camera / capture device failures. Scanning stays disabled until resolved.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("capture permission denied")]
    PermissionDenied,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The raw payload could not be parsed into a token identifier.
/// Permanent: the store is never contacted for these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: empty segment")]
    EmptySegment,
}
