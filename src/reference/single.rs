use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use super::{attach, detach, lookup, Attached, Reference, ResolveOutcome};
use crate::ids::ModelId;
use crate::model::{AnyModel, Model};
use crate::registry::Registry;

struct Slot<T> {
    target: Option<Attached<T>>,
    pending: Option<ModelId>,
    /// Set once the owning model is deleted; the slot stays empty from then on.
    released: bool,
}

/// A reference to at most one model of type `T`.
///
/// Holding a target counts as one reference on it. The slot empties itself
/// when the target is deleted.
pub struct SingleRef<T: Model> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T: Model> Default for SingleRef<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Model> SingleRef<T> {
    pub fn empty() -> Self {
        SingleRef {
            slot: Rc::new(RefCell::new(Slot {
                target: None,
                pending: None,
                released: false,
            })),
        }
    }

    pub fn new(target: &Rc<T>) -> Self {
        let reference = Self::empty();
        reference.set(Some(target));
        reference
    }

    pub fn get(&self) -> Option<Rc<T>> {
        self.slot
            .borrow()
            .target
            .as_ref()
            .map(|attached| attached.model.clone())
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().target.is_some()
    }

    /// Id of the current target.
    pub fn id(&self) -> Option<ModelId> {
        self.slot
            .borrow()
            .target
            .as_ref()
            .map(|attached| attached.model.core().id().clone())
    }

    /// Points the slot at `target`. Releases the previous target before
    /// counting the new one; assigning the current target again does nothing.
    /// A slot whose owner was deleted refuses new targets.
    pub fn set(&self, target: Option<&Rc<T>>) {
        if let Some(next) = target {
            if self.refuse_released(next) {
                return;
            }
        }
        {
            let slot = self.slot.borrow();
            let unchanged = match (&slot.target, target) {
                (Some(current), Some(next)) => Rc::ptr_eq(&current.model, next),
                (None, None) => slot.pending.is_none(),
                _ => false,
            };
            if unchanged {
                return;
            }
        }

        let previous = {
            let mut slot = self.slot.borrow_mut();
            slot.pending = None;
            slot.target.take()
        };
        if let Some(previous) = previous {
            detach(previous);
        }

        if let Some(next) = target {
            // Releasing the previous target can cascade into deleting the owner.
            if self.refuse_released(next) {
                return;
            }
            let weak = Rc::downgrade(&self.slot);
            let next_id = next.core().id().clone();
            let attached = attach(next, move || {
                let Some(slot) = weak.upgrade() else {
                    return;
                };
                // No decrement: the target is being torn down.
                let cleared = {
                    let mut slot = slot.borrow_mut();
                    let ours = slot
                        .target
                        .as_ref()
                        .is_some_and(|attached| attached.model.core().id() == &next_id);
                    if ours {
                        slot.target.take()
                    } else {
                        None
                    }
                };
                drop(cleared);
            });
            self.slot.borrow_mut().target = attached;
        }
    }

    /// Empties the slot, releasing the target.
    pub fn clear(&self) {
        self.set(None);
    }

    fn refuse_released(&self, next: &Rc<T>) -> bool {
        if !self.slot.borrow().released {
            return false;
        }
        warn!(
            target = %next.core().id(),
            tag = T::TYPE_TAG,
            "reference field of a deleted model cannot take a target"
        );
        true
    }
}

impl<T: Model> Reference for SingleRef<T> {
    fn targets(&self) -> Vec<Rc<dyn AnyModel>> {
        self.get()
            .map(|model| vec![model as Rc<dyn AnyModel>])
            .unwrap_or_default()
    }

    fn pending_ids(&self) -> Vec<ModelId> {
        self.slot.borrow().pending.iter().cloned().collect()
    }

    fn resolve(&self, registry: &Registry) -> ResolveOutcome {
        let pending = self.slot.borrow_mut().pending.take();
        let Some(id) = pending else {
            return ResolveOutcome::default();
        };

        match lookup::<T>(registry, "SingleRef", &id) {
            Some(target) => {
                self.set(Some(&target));
                if self.is_set() {
                    ResolveOutcome {
                        linked: 1,
                        missing: Vec::new(),
                    }
                } else {
                    ResolveOutcome {
                        linked: 0,
                        missing: vec![id],
                    }
                }
            }
            None => ResolveOutcome {
                linked: 0,
                missing: vec![id],
            },
        }
    }

    fn release(&self) {
        let previous = {
            let mut slot = self.slot.borrow_mut();
            slot.released = true;
            slot.pending = None;
            slot.target.take()
        };
        if let Some(previous) = previous {
            detach(previous);
        }
    }
}

impl<T: Model> Drop for SingleRef<T> {
    fn drop(&mut self) {
        let previous = match self.slot.try_borrow_mut() {
            Ok(mut slot) => slot.target.take(),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            detach(previous);
        }
    }
}

impl<T: Model> fmt::Debug for SingleRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("SingleRef")
            .field("type", &T::TYPE_TAG)
            .field(
                "target",
                &slot.target.as_ref().map(|a| a.model.core().id().clone()),
            )
            .field("pending", &slot.pending)
            .finish()
    }
}

impl<T: Model> Serialize for SingleRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let slot = self.slot.borrow();
        let id = match (&slot.target, &slot.pending) {
            (Some(attached), _) => attached.model.core().id().as_str(),
            (None, Some(pending)) => pending.as_str(),
            (None, None) => "",
        };
        serializer.serialize_str(id)
    }
}

impl<'de, T: Model> Deserialize<'de> for SingleRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        let reference = SingleRef::empty();
        reference.slot.borrow_mut().pending = raw.filter(|id| !id.is_empty()).map(ModelId::from);
        Ok(reference)
    }
}
