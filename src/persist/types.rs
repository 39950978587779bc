use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use tracing::warn;

use super::{Envelope, PersistError};
use crate::model::{AnyModel, Model, ModelExt};

type Factory = fn(&Envelope) -> Result<Rc<dyn AnyModel>, PersistError>;

/// Maps persisted type tags back to constructible model types.
///
/// Populate it once at startup with every model type that can appear in a save.
#[derive(Clone, Default)]
pub struct TypeTable {
    factories: HashMap<&'static str, Factory>,
}

impl fmt::Debug for TypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.factories.keys().collect();
        tags.sort();
        f.debug_struct("TypeTable").field("tags", &tags).finish()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering a second type under the same tag replaces the first.
    pub fn register<M: Model>(&mut self) -> &mut Self {
        if self
            .factories
            .insert(M::TYPE_TAG, instantiate_as::<M>)
            .is_some()
        {
            warn!(tag = M::TYPE_TAG, "type tag registered twice; later type wins");
        }
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<M: Model>(mut self) -> Self {
        self.register::<M>();
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the model described by `envelope`. Reference fields come back
    /// unresolved.
    pub fn instantiate(&self, envelope: &Envelope) -> Result<Rc<dyn AnyModel>, PersistError> {
        let factory = self
            .factories
            .get(envelope.type_tag.as_str())
            .ok_or_else(|| PersistError::UnknownType {
                id: envelope.id.clone(),
                type_tag: envelope.type_tag.clone(),
            })?;
        factory(envelope)
    }
}

fn instantiate_as<M: Model>(envelope: &Envelope) -> Result<Rc<dyn AnyModel>, PersistError> {
    let model: M = M::deserialize(&envelope.fields).map_err(|e| PersistError::Malformed {
        id: envelope.id.clone(),
        message: e.to_string(),
    })?;

    if model.id() != &envelope.id {
        return Err(PersistError::Malformed {
            id: envelope.id.clone(),
            message: format!("fields carry id {}", model.id()),
        });
    }

    Ok(Rc::new(model))
}
