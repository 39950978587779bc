//! Reference fields - typed links between models that take part in
//! reference counting.

mod collection;
mod single;

use std::rc::Rc;

use tracing::warn;

use crate::ids::ModelId;
use crate::model::{AnyModel, Model};
use crate::observer::ListenerId;
use crate::registry::Registry;

pub use collection::RefCollection;
pub use single::SingleRef;

/// Object-safe view of a reference field, used for traversal, linking and
/// release without knowing the target type.
pub trait Reference {
    /// Live targets, in slot order.
    fn targets(&self) -> Vec<Rc<dyn AnyModel>>;

    /// Ids read during deserialization and not resolved yet.
    fn pending_ids(&self) -> Vec<ModelId>;

    /// Turns pending ids into live references.
    fn resolve(&self, registry: &Registry) -> ResolveOutcome;

    /// Empties the field for good: every target is released and later
    /// assignments are refused. Runs when the owning model is deleted.
    fn release(&self);
}

/// Result of resolving one reference field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub linked: usize,
    pub missing: Vec<ModelId>,
}

impl ResolveOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    fn merge(&mut self, other: ResolveOutcome) {
        self.linked += other.linked;
        self.missing.extend(other.missing);
    }
}

/// A target held by a slot together with the delete listener it registered.
struct Attached<T> {
    model: Rc<T>,
    listener: ListenerId,
}

/// Counts the slot and subscribes to the target's deletion. Deleted models
/// can't be referenced.
fn attach<T, F>(target: &Rc<T>, on_delete: F) -> Option<Attached<T>>
where
    T: Model,
    F: Fn() + 'static,
{
    let core = target.core();
    if core.is_deleted() {
        warn!(id = %core.id(), tag = T::TYPE_TAG, "cannot reference a deleted model");
        return None;
    }
    core.increase_ref_count();
    let listener = core.add_delete_listener(on_delete);
    Some(Attached {
        model: target.clone(),
        listener,
    })
}

/// Undoes [`attach`]. The registry's orphan policy runs when the count reaches zero.
fn detach<T: Model>(attached: Attached<T>) {
    let core = attached.model.core();
    if core.is_deleted() {
        return;
    }
    core.remove_delete_listener(attached.listener);
    if core.decrease_ref_count() == 0 {
        if let Some(registry) = core.registry() {
            registry.release_orphan(attached.model.clone());
        }
    }
}

/// Looks `id` up and checks it has the expected type.
fn lookup<T: Model>(registry: &Registry, owner_tag: &'static str, id: &ModelId) -> Option<Rc<T>> {
    match registry.get(id) {
        Some(model) => {
            let found = model.type_tag();
            let typed = crate::model::downcast_model::<T>(model);
            if typed.is_none() {
                warn!(
                    id = %id,
                    expected = T::TYPE_TAG,
                    found,
                    field_type = owner_tag,
                    "referenced model has the wrong type; leaving empty"
                );
            }
            typed
        }
        None => {
            warn!(
                id = %id,
                expected = T::TYPE_TAG,
                field_type = owner_tag,
                "referenced model not found; leaving empty"
            );
            None
        }
    }
}
