use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::ids::ModelId;
use crate::observer::{ListenerId, Listeners};
use crate::registry::{Registry, RegistryState};

/// Bookkeeping shared by every model: identity, reference count, listeners and
/// the registry the model lives in.
///
/// Persists as nothing more than the model id.
pub struct ModelCore {
    id: ModelId,
    ref_count: Cell<usize>,
    deleted: Cell<bool>,
    on_delete: Listeners,
    on_change: Listeners,
    registry: RefCell<Weak<RegistryState>>,
}

impl Default for ModelCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCore {
    /// A core with a freshly generated id.
    ///
    /// Uniqueness is only guaranteed against the registry when the core comes
    /// from [`Registry::new_core`]; registration rejects collisions either way.
    pub fn new() -> Self {
        Self::with_id(ModelId::generate())
    }

    pub fn with_id(id: impl Into<ModelId>) -> Self {
        ModelCore {
            id: id.into(),
            ref_count: Cell::new(0),
            deleted: Cell::new(false),
            on_delete: Listeners::new(),
            on_change: Listeners::new(),
            registry: RefCell::new(Weak::new()),
        }
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    pub fn increase_ref_count(&self) {
        self.ref_count.set(self.ref_count.get() + 1);
    }

    /// Decrements and returns the new count. Never deletes the model; the
    /// registry's orphan policy decides that. Clamps at zero.
    pub fn decrease_ref_count(&self) -> usize {
        let current = self.ref_count.get();
        if current == 0 {
            warn!(id = %self.id, "reference count decremented below zero; clamping");
            return 0;
        }
        self.ref_count.set(current - 1);
        current - 1
    }

    /// Registers a callback fired once, synchronously, when the model is deleted.
    pub fn add_delete_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on_delete.add(listener)
    }

    pub fn remove_delete_listener(&self, id: ListenerId) -> bool {
        self.on_delete.remove(id)
    }

    pub fn delete_listener_count(&self) -> usize {
        self.on_delete.len()
    }

    pub fn add_change_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.on_change.add(listener)
    }

    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.on_change.remove(id)
    }

    /// Tells change listeners that this model's fields changed.
    pub fn notify_change(&self) {
        if self.is_deleted() {
            return;
        }
        self.on_change.fire();
    }

    /// The registry this model is registered in, if it still exists.
    pub fn registry(&self) -> Option<Registry> {
        self.registry.borrow().upgrade().map(Registry::from_state)
    }

    pub(crate) fn attach_registry(&self, state: &Rc<RegistryState>) {
        *self.registry.borrow_mut() = Rc::downgrade(state);
    }

    pub(crate) fn detach_registry(&self) {
        *self.registry.borrow_mut() = Weak::new();
    }

    /// Active -> Deleted. Fires and drops the delete listeners. Returns false
    /// when the model was already deleted.
    pub(crate) fn begin_delete(&self) -> bool {
        if self.deleted.replace(true) {
            return false;
        }
        self.on_delete.fire();
        self.on_delete.clear();
        self.on_change.clear();
        self.ref_count.set(0);
        true
    }
}

impl fmt::Debug for ModelCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCore")
            .field("id", &self.id)
            .field("ref_count", &self.ref_count.get())
            .field("deleted", &self.deleted.get())
            .field("delete_listeners", &self.on_delete.len())
            .field("change_listeners", &self.on_change.len())
            .finish()
    }
}

impl Serialize for ModelCore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModelCore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = ModelId::deserialize(deserializer)?;
        if id.is_empty() {
            return Err(serde::de::Error::custom("model id must not be empty"));
        }
        Ok(ModelCore::with_id(id))
    }
}
