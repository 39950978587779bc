use std::fmt;

use crate::ids::ModelId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live model already uses this id.
    DuplicateId(ModelId),
    /// The model has already been deleted.
    Deleted(ModelId),
    /// The model is registered in another registry.
    ForeignRegistry(ModelId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "model id {} is already registered", id),
            RegistryError::Deleted(id) => write!(f, "model {} has been deleted", id),
            RegistryError::ForeignRegistry(id) => {
                write!(f, "model {} is registered in another registry", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
