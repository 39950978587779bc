//! Registry - the process-wide index from model id to live model.
//!
//! The registry keeps every registered model alive until it is deleted and
//! answers id lookups during reference resolution. Handles are cheap to clone
//! and share the same underlying map.

mod error;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::ids::ModelId;
use crate::model::{downcast_model, AnyModel, Model, ModelCore, ModelExt};

pub use error::RegistryError;

/// What happens to a model whose reference count drops to zero because a
/// reference released it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Keep the model registered; something else must delete it explicitly.
    #[default]
    Retain,
    /// Delete the model as soon as its last reference lets go.
    DeleteOnZero,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    pub orphan_policy: OrphanPolicy,
}

pub(crate) struct RegistryState {
    models: RefCell<IndexMap<ModelId, Rc<dyn AnyModel>>>,
    config: RegistryConfig,
}

/// Insertion-ordered map of live models.
///
/// Clone-friendly (cloning shares the same underlying map).
#[derive(Clone)]
pub struct Registry {
    state: Rc<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .field("config", &self.state.config)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Registry {
            state: Rc::new(RegistryState {
                models: RefCell::new(IndexMap::new()),
                config,
            }),
        }
    }

    pub fn with_orphan_policy(orphan_policy: OrphanPolicy) -> Self {
        Self::with_config(RegistryConfig { orphan_policy })
    }

    pub(crate) fn from_state(state: Rc<RegistryState>) -> Self {
        Registry { state }
    }

    pub fn config(&self) -> RegistryConfig {
        self.state.config
    }

    /// Whether both handles share the same map.
    pub fn same_as(&self, other: &Registry) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// An id not used by any registered model.
    pub fn generate_id(&self) -> ModelId {
        loop {
            let id = ModelId::generate();
            if !self.contains(&id) {
                return id;
            }
            warn!(id = %id, "generated model id collided; retrying");
        }
    }

    pub fn new_core(&self) -> ModelCore {
        ModelCore::with_id(self.generate_id())
    }

    /// Wraps and registers a freshly constructed model.
    pub fn insert<M: Model>(&self, model: M) -> Result<Rc<M>, RegistryError> {
        let model = Rc::new(model);
        self.register(model.clone())?;
        Ok(model)
    }

    pub fn register(&self, model: Rc<dyn AnyModel>) -> Result<(), RegistryError> {
        let id = model.id().clone();
        if model.is_deleted() {
            warn!(id = %id, "refusing to register a deleted model");
            return Err(RegistryError::Deleted(id));
        }
        if let Some(owner) = model.model_core().registry() {
            if !owner.same_as(self) {
                warn!(id = %id, tag = model.type_tag(), "model belongs to another registry");
                return Err(RegistryError::ForeignRegistry(id));
            }
        }

        {
            let mut models = self.state.models.borrow_mut();
            if models.contains_key(&id) {
                drop(models);
                warn!(id = %id, tag = model.type_tag(), "model id already registered");
                return Err(RegistryError::DuplicateId(id));
            }
            models.insert(id.clone(), model.clone());
        }

        model.model_core().attach_registry(&self.state);
        debug!(id = %id, tag = model.type_tag(), "model registered");
        Ok(())
    }

    /// Removes the entry without deleting the model. No-op if absent.
    pub fn unregister(&self, id: &ModelId) -> Option<Rc<dyn AnyModel>> {
        let removed = self.state.models.borrow_mut().shift_remove(id);
        if let Some(model) = &removed {
            model.model_core().detach_registry();
        }
        removed
    }

    pub fn get(&self, id: &ModelId) -> Option<Rc<dyn AnyModel>> {
        self.state.models.borrow().get(id).cloned()
    }

    /// Typed lookup. `None` when absent or of another type.
    pub fn find<T: Model>(&self, id: &ModelId) -> Option<Rc<T>> {
        self.get(id).and_then(downcast_model::<T>)
    }

    /// Every registered `T`, in registration order.
    pub fn find_all<T: Model>(&self) -> Vec<Rc<T>> {
        self.models()
            .into_iter()
            .filter_map(downcast_model::<T>)
            .collect()
    }

    pub fn find_first<T: Model>(&self) -> Option<Rc<T>> {
        self.models().into_iter().find_map(downcast_model::<T>)
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.state.models.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.models.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.models.borrow().is_empty()
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.state.models.borrow().keys().cloned().collect()
    }

    /// Every registered model, in registration order.
    pub fn models(&self) -> Vec<Rc<dyn AnyModel>> {
        self.state.models.borrow().values().cloned().collect()
    }

    /// Deletes every registered model through its own delete path, so every
    /// listener hears about it, and leaves the registry empty.
    pub fn delete_all(&self) {
        loop {
            let snapshot = self.models();
            if snapshot.is_empty() {
                break;
            }
            debug!(count = snapshot.len(), "deleting all models");
            for model in snapshot {
                model.delete();
            }
        }
    }

    /// Called when a reference release takes a model's count to zero.
    pub(crate) fn release_orphan(&self, model: Rc<dyn AnyModel>) {
        match self.state.config.orphan_policy {
            OrphanPolicy::Retain => {}
            OrphanPolicy::DeleteOnZero => {
                debug!(id = %model.id(), "deleting orphaned model");
                model.delete();
            }
        }
    }
}
