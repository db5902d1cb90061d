//! Internal failure type for the registry core, mapped to `tonic::Status`
//! exactly once, at the gRPC boundary (`grpc::convert`).

use tonic::{Code, Status};

#[derive(Debug, thiserror::Error, Clone)]
pub enum RegistryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RegistryError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RegistryError::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        RegistryError::AlreadyExists(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        RegistryError::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RegistryError::Internal(msg.into())
    }

    /// Whether the server should transparently retry the operation that
    /// produced this error (transaction conflicts on idempotent operations).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Aborted(_))
    }

    fn code(&self) -> Code {
        match self {
            RegistryError::InvalidArgument(_) => Code::InvalidArgument,
            RegistryError::NotFound(_) => Code::NotFound,
            RegistryError::AlreadyExists(_) => Code::AlreadyExists,
            RegistryError::FailedPrecondition(_) => Code::FailedPrecondition,
            RegistryError::Aborted(_) => Code::Aborted,
            RegistryError::Internal(_) => Code::Internal,
            RegistryError::Unavailable(_) => Code::Unavailable,
        }
    }
}

impl From<RegistryError> for Status {
    fn from(error: RegistryError) -> Self {
        Status::new(error.code(), error.to_string())
    }
}
