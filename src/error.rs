//! Error types shared across the operator, the extractor and the scheduler sidecar.

use thiserror::Error;

/// Surface-facing error kind, per the error handling design: a stable
/// discriminant that an outer HTTP/CRD admission layer can map to a status
/// code. The core never constructs HTTP responses itself, it only classifies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("finalizer error: {0}")]
    FinalizerError(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("workload timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify the error for surfaces that need a stable kind/code pair
    /// (metrics labels, admission responses). The core otherwise only uses
    /// the `Error` enum's variants and messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ValidationError(_) => ErrorKind::BadRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnknownReference(_) => ErrorKind::BadRequest,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::KubeError(kube::Error::Api(e)) if e.code == 404 => ErrorKind::NotFound,
            Error::KubeError(kube::Error::Api(e)) if e.code == 401 => ErrorKind::Unauthorized,
            Error::KubeError(kube::Error::Api(e)) if e.code == 403 => ErrorKind::Forbidden,
            Error::KubeError(kube::Error::Api(e)) if e.code == 409 => ErrorKind::Conflict,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the reconciler's error policy should use the short retry
    /// interval. Transient cluster API errors and timeouts are retriable;
    /// validation failures are not (they need a spec change to resolve).
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Error::ValidationError(_) | Error::UnknownReference(_)
        )
    }
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(e: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::FinalizerError(Box::new(e))
    }
}
