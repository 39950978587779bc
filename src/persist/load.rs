use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use super::{Bundle, Envelope, PersistError, TypeTable};
use crate::ids::ModelId;
use crate::model::{AnyModel, ModelExt};
use crate::registry::Registry;

/// Where a load reads its envelopes from.
#[derive(Clone, Debug)]
pub enum LoadSource {
    Bundle(Bundle),
    /// A directory of per-model `*.json` files.
    Directory(PathBuf),
}

impl From<Bundle> for LoadSource {
    fn from(bundle: Bundle) -> Self {
        LoadSource::Bundle(bundle)
    }
}

impl From<PathBuf> for LoadSource {
    fn from(path: PathBuf) -> Self {
        LoadSource::Directory(path)
    }
}

impl From<&Path> for LoadSource {
    fn from(path: &Path) -> Self {
        LoadSource::Directory(path.to_path_buf())
    }
}

/// A reference whose target id could not be linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub owner: ModelId,
    pub target: ModelId,
}

/// Summary of a finished load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Loaded model ids, in source order.
    pub models: Vec<ModelId>,
    pub linked: usize,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Hooks a host uses to follow a load, e.g. to animate a progress bar.
pub trait LoadObserver {
    fn on_start(&mut self) {}

    /// Fraction of work done, 0.0 to 1.0.
    fn on_progress(&mut self, _fraction: f32) {}

    fn on_done(&mut self, _report: &LoadReport) {}

    fn on_error(&mut self, _message: &str) {}
}

impl LoadObserver for () {}

/// Closure-backed [`LoadObserver`].
#[derive(Default)]
pub struct LoadCallbacks<'a> {
    start: Option<Box<dyn FnMut() + 'a>>,
    progress: Option<Box<dyn FnMut(f32) + 'a>>,
    done: Option<Box<dyn FnMut(&LoadReport) + 'a>>,
    error: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> LoadCallbacks<'a> {
    pub fn new() -> Self {
        LoadCallbacks {
            start: None,
            progress: None,
            done: None,
            error: None,
        }
    }

    pub fn with_start(mut self, f: impl FnMut() + 'a) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    pub fn with_progress(mut self, f: impl FnMut(f32) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn with_done(mut self, f: impl FnMut(&LoadReport) + 'a) -> Self {
        self.done = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl LoadObserver for LoadCallbacks<'_> {
    fn on_start(&mut self) {
        if let Some(f) = self.start.as_mut() {
            f();
        }
    }

    fn on_progress(&mut self, fraction: f32) {
        if let Some(f) = self.progress.as_mut() {
            f(fraction);
        }
    }

    fn on_done(&mut self, report: &LoadReport) {
        if let Some(f) = self.done.as_mut() {
            f(report);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(f) = self.error.as_mut() {
            f(message);
        }
    }
}

/// What a call to [`LoadOperation::step`] left behind.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    /// More steps to go; carries the progress fraction.
    Running(f32),
    Done(LoadReport),
    Failed(PersistError),
    Cancelled,
}

impl LoadState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, LoadState::Running(_))
    }
}

enum Phase {
    Start,
    Instantiate,
    Install,
    Link,
    Complete,
    Finished(LoadState),
}

/// A load in progress. Each [`step`](Self::step) does one unit of work, so a
/// host loop can render between steps.
///
/// Steps: read the source; build one model per step with its references
/// still pending; install every built model into the registry at once; link
/// one model's references per step; report completion. Until the install
/// step nothing touches the registry, so a failure leaves it as it was.
pub struct LoadOperation<'a> {
    registry: Registry,
    types: Rc<TypeTable>,
    observer: Box<dyn LoadObserver + 'a>,
    source: Option<LoadSource>,
    phase: Phase,
    envelopes: Vec<Envelope>,
    staged: Vec<Rc<dyn AnyModel>>,
    installed: Vec<Rc<dyn AnyModel>>,
    cursor: usize,
    report: LoadReport,
}

impl<'a> LoadOperation<'a> {
    pub(crate) fn new(
        registry: Registry,
        types: Rc<TypeTable>,
        source: LoadSource,
        observer: Box<dyn LoadObserver + 'a>,
    ) -> Self {
        LoadOperation {
            registry,
            types,
            observer,
            source: Some(source),
            phase: Phase::Start,
            envelopes: Vec::new(),
            staged: Vec::new(),
            installed: Vec::new(),
            cursor: 0,
            report: LoadReport::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    /// Fraction of work done so far.
    pub fn progress(&self) -> f32 {
        let total = self.envelopes.len() * 2;
        let done = match self.phase {
            Phase::Start => 0,
            Phase::Instantiate | Phase::Install => self.staged.len(),
            Phase::Link => self.envelopes.len() + self.cursor,
            Phase::Complete | Phase::Finished(_) => total,
        };
        if total == 0 {
            match self.phase {
                Phase::Start => 0.0,
                _ => 1.0,
            }
        } else {
            done as f32 / total as f32
        }
    }

    pub fn step(&mut self) -> LoadState {
        match std::mem::replace(&mut self.phase, Phase::Complete) {
            Phase::Start => self.start(),
            Phase::Instantiate => self.instantiate_next(),
            Phase::Install => self.install(),
            Phase::Link => self.link_next(),
            Phase::Complete => self.complete(),
            Phase::Finished(state) => {
                self.phase = Phase::Finished(state.clone());
                state
            }
        }
    }

    /// Steps until the load finishes.
    pub fn run(mut self) -> LoadState {
        loop {
            let state = self.step();
            if state.is_finished() {
                return state;
            }
        }
    }

    /// Abandons the load. Models built so far are dropped; models already
    /// installed are deleted. No observer callback fires afterwards. Returns
    /// false when the load had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        debug!(
            staged = self.staged.len(),
            installed = self.installed.len(),
            "load cancelled"
        );
        self.staged.clear();
        for model in std::mem::take(&mut self.installed) {
            model.delete();
        }
        self.phase = Phase::Finished(LoadState::Cancelled);
        true
    }

    fn start(&mut self) -> LoadState {
        self.observer.on_start();

        let bundle = match self.source.take() {
            Some(LoadSource::Bundle(bundle)) => bundle,
            Some(LoadSource::Directory(dir)) => match Bundle::read_dir(&dir) {
                Ok(bundle) => bundle,
                Err(err) => return self.fail(err),
            },
            None => Bundle::default(),
        };

        debug!(count = bundle.len(), "load started");
        self.envelopes = bundle.envelopes;
        self.phase = Phase::Instantiate;
        self.running()
    }

    fn instantiate_next(&mut self) -> LoadState {
        let Some(envelope) = self.envelopes.get(self.staged.len()) else {
            self.phase = Phase::Install;
            return self.install();
        };

        if self.staged.iter().any(|model| model.id() == &envelope.id) {
            let err = PersistError::DuplicateId(envelope.id.clone());
            return self.fail(err);
        }

        match self.types.instantiate(envelope) {
            Ok(model) => self.staged.push(model),
            Err(err) => return self.fail(err),
        }

        self.phase = if self.staged.len() == self.envelopes.len() {
            Phase::Install
        } else {
            Phase::Instantiate
        };
        self.running()
    }

    fn install(&mut self) -> LoadState {
        let live: HashSet<ModelId> = self.registry.ids().into_iter().collect();
        if let Some(clash) = self.staged.iter().find(|model| live.contains(model.id())) {
            let err = PersistError::DuplicateId(clash.id().clone());
            return self.fail(err);
        }

        for model in std::mem::take(&mut self.staged) {
            if let Err(err) = self.registry.register(model.clone()) {
                for installed in std::mem::take(&mut self.installed) {
                    self.registry.unregister(installed.id());
                }
                return self.fail(err.into());
            }
            self.report.models.push(model.id().clone());
            self.installed.push(model);
        }

        debug!(count = self.installed.len(), "loaded models installed");
        self.cursor = 0;
        self.phase = if self.installed.is_empty() {
            Phase::Complete
        } else {
            Phase::Link
        };
        self.running()
    }

    fn link_next(&mut self) -> LoadState {
        let Some(model) = self.installed.get(self.cursor).cloned() else {
            return self.complete();
        };

        for reference in model.owned_reference_fields() {
            let outcome = reference.resolve(&self.registry);
            self.report.linked += outcome.linked;
            for target in outcome.missing {
                warn!(owner = %model.id(), target = %target, "reference left unresolved");
                self.report.unresolved.push(UnresolvedReference {
                    owner: model.id().clone(),
                    target,
                });
            }
        }

        self.cursor += 1;
        self.phase = if self.cursor == self.installed.len() {
            Phase::Complete
        } else {
            Phase::Link
        };
        self.running()
    }

    fn complete(&mut self) -> LoadState {
        self.installed.clear();
        let report = std::mem::take(&mut self.report);
        debug!(
            models = report.models.len(),
            linked = report.linked,
            unresolved = report.unresolved.len(),
            "load finished"
        );
        self.observer.on_done(&report);
        let state = LoadState::Done(report);
        self.phase = Phase::Finished(state.clone());
        state
    }

    fn running(&mut self) -> LoadState {
        let fraction = self.progress();
        self.observer.on_progress(fraction);
        LoadState::Running(fraction)
    }

    fn fail(&mut self, err: PersistError) -> LoadState {
        warn!(error = %err, "load aborted");
        self.staged.clear();
        self.observer.on_error(&err.to_string());
        let state = LoadState::Failed(err);
        self.phase = Phase::Finished(state.clone());
        state
    }
}
