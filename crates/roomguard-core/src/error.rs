//! Shared error type across roomguard crates.

use thiserror::Error;

/// Client-facing error codes (stable API, Matrix `errcode` values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Request refused by a room policy.
    Forbidden,
    /// Event or request body did not have the expected shape.
    BadJson,
    /// Invalid parameter / malformed request.
    InvalidParam,
    /// Anything else, including startup failures.
    Unknown,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Forbidden => "M_FORBIDDEN",
            ClientCode::BadJson => "M_BAD_JSON",
            ClientCode::InvalidParam => "M_INVALID_PARAM",
            ClientCode::Unknown => "M_UNKNOWN",
        }
    }

    /// HTTP status the host should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ClientCode::Forbidden => 403,
            ClientCode::BadJson | ClientCode::InvalidParam => 400,
            ClientCode::Unknown => 500,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RoomGuardError>;

/// Unified error type used by core and host.
#[derive(Debug, Error)]
pub enum RoomGuardError {
    /// The event or request would break a room policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    /// A module entry in the config is unknown or has bad keys. Fatal at startup.
    #[error("misconfigured module: {0}")]
    MisconfiguredModule(String),
    /// The event does not have the shape a filter expects. Callers fail closed.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RoomGuardError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RoomGuardError::PolicyViolation(_) => ClientCode::Forbidden,
            RoomGuardError::MalformedEvent(_) => ClientCode::BadJson,
            RoomGuardError::BadRequest(_) => ClientCode::InvalidParam,
            RoomGuardError::MisconfiguredModule(_)
            | RoomGuardError::BadConfig(_)
            | RoomGuardError::Internal(_) => ClientCode::Unknown,
        }
    }
}
