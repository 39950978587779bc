//! Saving and loading model graphs.
//!
//! A save turns each model into an [`Envelope`]: its type tag, its id, and
//! its fields with references reduced to target ids. A [`Bundle`] of
//! envelopes can be written as one JSON document, as compact bytes, or as one
//! file per model.
//!
//! Loading is a [`LoadOperation`] that a host steps cooperatively: models are
//! built with pending references, installed into the registry together, and
//! only then linked, so references between loaded models resolve regardless
//! of order. Ids that cannot be found are reported and left empty.

mod envelope;
mod error;
mod gateway;
mod load;
mod types;

pub use envelope::{Bundle, Envelope};
pub use error::PersistError;
pub use gateway::Gateway;
pub use load::{
    LoadCallbacks, LoadObserver, LoadOperation, LoadReport, LoadSource, LoadState,
    UnresolvedReference,
};
pub use types::TypeTable;
