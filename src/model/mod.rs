//! Models - reference-counted, globally identified entities.
//!
//! A model embeds a [`ModelCore`] and links to other models through
//! [`SingleRef`](crate::SingleRef) and [`RefCollection`](crate::RefCollection)
//! fields. Those fields keep the targets' reference counts current and empty
//! themselves when a target is deleted.
//!
//! ## Example
//!
//! ```ignore
//! use model_graph::{Model, ModelCore, ModelExt, Registry, SingleRef};
//!
//! #[derive(Model, Serialize, Deserialize)]
//! struct Pilot {
//!     core: ModelCore,
//!     name: RefCell<String>,
//! }
//!
//! #[derive(Model, Serialize, Deserialize)]
//! #[model(tag = "Mech")]
//! struct Mech {
//!     core: ModelCore,
//!     pilot: SingleRef<Pilot>,
//! }
//!
//! let registry = Registry::new();
//! let pilot = registry.insert(Pilot { core: registry.new_core(), name: "Rook".to_string().into() })?;
//! let mech = registry.insert(Mech { core: registry.new_core(), pilot: SingleRef::new(&pilot) })?;
//! assert_eq!(pilot.ref_count(), 1);
//!
//! pilot.delete();
//! assert!(mech.pilot.get().is_none());
//! ```

mod core;

use std::any::Any;
use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::graph;
use crate::ids::ModelId;
use crate::reference::Reference;

pub use self::core::ModelCore;

/// Trait implemented by every concrete model type, usually via `#[derive(Model)]`.
pub trait Model: Serialize + DeserializeOwned + 'static {
    /// Stable tag persisted alongside the model so loading can pick the right
    /// type again.
    const TYPE_TAG: &'static str;

    fn core(&self) -> &ModelCore;

    /// The reference fields followed by traversal and `save_from`, in
    /// declaration order.
    fn references(&self) -> Vec<&dyn Reference> {
        Vec::new()
    }

    /// Every reference field the model owns, including ones left out of
    /// [`references`](Self::references). These are linked on load and
    /// released on delete.
    fn owned_references(&self) -> Vec<&dyn Reference> {
        self.references()
    }
}

/// Object-safe view of a [`Model`]. Implemented for every model type.
pub trait AnyModel: Any {
    fn model_core(&self) -> &ModelCore;

    fn type_tag(&self) -> &'static str;

    fn reference_fields(&self) -> Vec<&dyn Reference>;

    fn owned_reference_fields(&self) -> Vec<&dyn Reference>;

    /// Scalar fields inline, reference fields as target ids.
    fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<M: Model> AnyModel for M {
    fn model_core(&self) -> &ModelCore {
        self.core()
    }

    fn type_tag(&self) -> &'static str {
        M::TYPE_TAG
    }

    fn reference_fields(&self) -> Vec<&dyn Reference> {
        self.references()
    }

    fn owned_reference_fields(&self) -> Vec<&dyn Reference> {
        self.owned_references()
    }

    fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Recovers the concrete type of an erased model.
pub fn downcast_model<T: Model>(model: Rc<dyn AnyModel>) -> Option<Rc<T>> {
    model.into_any_rc().downcast::<T>().ok()
}

/// Lifecycle operations available on every model, concrete or erased.
pub trait ModelExt {
    fn id(&self) -> &ModelId;

    fn ref_count(&self) -> usize;

    fn is_deleted(&self) -> bool;

    fn notify_change(&self);

    /// Deletes the model. Only the first call does anything.
    fn delete(&self);

    /// Every model reachable through this model's reference fields,
    /// deduplicated. Includes this model only when a cycle leads back to it.
    fn references_transitive(&self) -> Vec<Rc<dyn AnyModel>>;
}

impl<M: AnyModel + ?Sized> ModelExt for M {
    fn id(&self) -> &ModelId {
        self.model_core().id()
    }

    fn ref_count(&self) -> usize {
        self.model_core().ref_count()
    }

    fn is_deleted(&self) -> bool {
        self.model_core().is_deleted()
    }

    fn notify_change(&self) {
        self.model_core().notify_change()
    }

    fn delete(&self) {
        delete(self)
    }

    fn references_transitive(&self) -> Vec<Rc<dyn AnyModel>> {
        graph::references_of(self)
    }
}

/// Delete listeners first, then the registry entry, then the model's own
/// outgoing references.
fn delete<M: AnyModel + ?Sized>(model: &M) {
    let core = model.model_core();
    if !core.begin_delete() {
        return;
    }
    debug!(id = %core.id(), tag = model.type_tag(), "model deleted");

    // Held until the outgoing references are released.
    let registry_entry = core
        .registry()
        .and_then(|registry| registry.unregister(core.id()));

    for reference in model.owned_reference_fields() {
        reference.release();
    }

    drop(registry_entry);
}
