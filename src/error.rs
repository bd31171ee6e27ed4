use std::fmt;

/// Failure taxonomy shared by the store, reconciler and transfer paths.
/// Wire codes are stable; handlers map them straight into the error envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum SisError {
    NotFound(String),
    Conflict(String),
    BadInput(String),
    Internal(String),
}

impl SisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadInput(_) => "bad_input",
            Self::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::Conflict(m) | Self::BadInput(m) | Self::Internal(m) => m,
        }
    }
}

impl fmt::Display for SisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for SisError {}

impl From<rusqlite::Error> for SisError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
