//! Reference-counted model graph with id-based persistence.
//!
//! Models live in a [`Registry`], link to each other through [`SingleRef`]
//! and [`RefCollection`] fields, and save to / load from [`Bundle`]s through a
//! [`Gateway`].

extern crate self as model_graph;

pub mod graph;
mod ids;
mod model;
mod observer;
pub mod persist;
mod reference;
mod registry;

pub use ids::ModelId;
pub use model::{downcast_model, AnyModel, Model, ModelCore, ModelExt};
pub use observer::ListenerId;
pub use persist::{
    Bundle, Envelope, Gateway, LoadCallbacks, LoadObserver, LoadOperation, LoadReport, LoadSource,
    LoadState, PersistError, TypeTable, UnresolvedReference,
};
pub use reference::{RefCollection, Reference, ResolveOutcome, SingleRef};
pub use registry::{OrphanPolicy, Registry, RegistryConfig, RegistryError};

// Derive for `Model`; shares the trait's name like serde's derives do.
pub use model_graph_macros::Model;
