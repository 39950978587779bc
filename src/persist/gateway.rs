use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use super::{Bundle, Envelope, LoadObserver, LoadOperation, LoadSource, PersistError, TypeTable};
use crate::graph;
use crate::model::AnyModel;
use crate::registry::Registry;

/// Saves models out of a registry and loads them back into it.
#[derive(Clone, Debug)]
pub struct Gateway {
    registry: Registry,
    types: Rc<TypeTable>,
    pretty_files: bool,
}

impl Gateway {
    pub fn new(registry: Registry, types: TypeTable) -> Self {
        Gateway {
            registry,
            types: Rc::new(types),
            pretty_files: false,
        }
    }

    /// Indent per-model files written by the `*_to_dir` methods.
    pub fn with_pretty_files(mut self, pretty: bool) -> Self {
        self.pretty_files = pretty;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Every registered model, in registration order.
    pub fn save_all(&self) -> Result<Bundle, PersistError> {
        encode(&self.registry.models())
    }

    /// `roots` and everything reachable from them. Models outside that set
    /// are not written, so references to them load back empty.
    pub fn save_from(&self, roots: &[Rc<dyn AnyModel>]) -> Result<Bundle, PersistError> {
        encode(&graph::collect(roots))
    }

    pub fn save_all_to_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, PersistError> {
        self.save_all()?.write_dir(dir, self.pretty_files)
    }

    pub fn save_from_to_dir(
        &self,
        roots: &[Rc<dyn AnyModel>],
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, PersistError> {
        self.save_from(roots)?.write_dir(dir, self.pretty_files)
    }

    /// Starts loading `source` into the registry. Nothing happens until the
    /// returned operation is stepped or run.
    pub fn load<'a>(
        &self,
        source: impl Into<LoadSource>,
        observer: impl LoadObserver + 'a,
    ) -> LoadOperation<'a> {
        LoadOperation::new(
            self.registry.clone(),
            self.types.clone(),
            source.into(),
            Box::new(observer),
        )
    }
}

fn encode(models: &[Rc<dyn AnyModel>]) -> Result<Bundle, PersistError> {
    let bundle = models
        .iter()
        .map(|model| Envelope::from_model(&**model))
        .collect::<Result<Bundle, PersistError>>()?;
    debug!(count = bundle.len(), "models saved");
    Ok(bundle)
}
