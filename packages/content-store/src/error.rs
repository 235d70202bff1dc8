// Error kinds surfaced by the content store
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A required read found nothing at the location
    #[error("Content not found at: {location}")]
    NotFound { location: String },

    /// The content id could not be turned into a storage location
    #[error("Cannot place content id '{id}': {reason}")]
    Conversion { id: String, reason: String },

    /// Underlying backend read/write/delete failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid store construction or configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn not_found(location: impl Into<String>) -> Self {
        StoreError::NotFound {
            location: location.into(),
        }
    }

    pub fn conversion(id: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Conversion {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error, mapping `ErrorKind::NotFound` to [`StoreError::NotFound`]
    pub fn io(location: &str, context: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::not_found(location);
        }
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
