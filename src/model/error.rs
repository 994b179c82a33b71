use thiserror::Error;

/// Failure reported by an [`ObjectClient`](crate::adapters::ObjectClient).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("failed to {op} at: {key}, {message}")]
    Request {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("async runtime unavailable: {0}")]
    Runtime(#[from] std::io::Error),
}

impl StoreError {
    pub fn request(op: &'static str, key: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Request {
            op,
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Error returned across the adapter boundary.
///
/// Every store failure collapses into `StoreOperationFailed`; the store's own
/// error stays reachable through `source()`.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{operation} failed for `{path}`")]
    StoreOperationFailed {
        operation: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("path is outside of the defined root: {0}")]
    PathOutsideRoot(String),

    #[error("refusing to {0} the root directory")]
    RootViolation(&'static str),

    #[error("stored key `{key}` does not start with prefix `{prefix}`")]
    PrefixMismatch { prefix: String, key: String },

    #[error("listing `{path}` exceeds the maximum depth of {max_depth}")]
    ListingTooDeep { path: String, max_depth: usize },

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    pub fn store(operation: &'static str, path: &str, source: StoreError) -> Self {
        AdapterError::StoreOperationFailed {
            operation,
            path: path.to_string(),
            source,
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AdapterError::StoreOperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Error raised while turning disk configuration into a filesystem.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key `{0}`")]
    MissingKey(&'static str),

    #[error("no driver registered for `{0}`")]
    UnknownDriver(String),

    #[error("disk `{0}` is not configured")]
    UnknownDisk(String),

    #[error("no default disk configured")]
    NoDefaultDisk,

    #[error("invalid value for `{key}`: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start the async runtime: {0}")]
    Runtime(std::io::Error),
}
