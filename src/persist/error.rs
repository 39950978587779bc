use std::fmt;

use crate::ids::ModelId;
use crate::registry::RegistryError;

/// Error type for saving and loading model graphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Filesystem failure in per-file mode.
    Io { path: String, message: String },
    /// JSON encoding or decoding failure outside a single model's fields.
    Json(String),
    /// Compact (bitcode/base64) encoding failure.
    Encoding(String),
    /// No factory registered for the stored type tag.
    UnknownType { id: ModelId, type_tag: String },
    /// A model's stored fields could not be turned back into the model.
    Malformed { id: ModelId, message: String },
    /// The id is already live in the registry, or appears twice in the source.
    DuplicateId(ModelId),
    /// The id cannot be used as a file name.
    InvalidFileName(ModelId),
    /// Installing loaded models into the registry failed.
    Registry(RegistryError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io { path, message } => write!(f, "io error at {}: {}", path, message),
            PersistError::Json(message) => write!(f, "json error: {}", message),
            PersistError::Encoding(message) => write!(f, "encoding error: {}", message),
            PersistError::UnknownType { id, type_tag } => {
                write!(f, "unknown model type {:?} for model {}", type_tag, id)
            }
            PersistError::Malformed { id, message } => {
                write!(f, "malformed data for model {}: {}", id, message)
            }
            PersistError::DuplicateId(id) => write!(f, "duplicate model id {}", id),
            PersistError::InvalidFileName(id) => {
                write!(f, "model id {:?} is not a valid file name", id.as_str())
            }
            PersistError::Registry(err) => write!(f, "registry error: {}", err),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Json(err.to_string())
    }
}

impl From<bitcode::Error> for PersistError {
    fn from(err: bitcode::Error) -> Self {
        PersistError::Encoding(err.to_string())
    }
}

impl From<base64::DecodeError> for PersistError {
    fn from(err: base64::DecodeError) -> Self {
        PersistError::Encoding(err.to_string())
    }
}

impl From<RegistryError> for PersistError {
    fn from(err: RegistryError) -> Self {
        PersistError::Registry(err)
    }
}
