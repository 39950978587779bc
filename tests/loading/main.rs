mod scene;

use std::cell::{Cell, RefCell};

use model_graph::{
    Bundle, Gateway, LoadCallbacks, LoadState, ModelCore, ModelExt, ModelId, PersistError,
    Registry, SingleRef,
};
use scene::{level, types, Level, Tile};

fn saved_level(size: usize) -> Bundle {
    let registry = Registry::new();
    level(&registry, size);
    Gateway::new(registry, types()).save_all().unwrap()
}

#[test]
fn stepping_reports_even_progress() {
    let bundle = saved_level(3);
    let registry = Registry::new();
    let mut op = Gateway::new(registry.clone(), types()).load(bundle, ());

    let mut fractions = Vec::new();
    let report = loop {
        match op.step() {
            LoadState::Running(fraction) => fractions.push(fraction),
            LoadState::Done(report) => break report,
            other => panic!("unexpected state: {:?}", other),
        }
    };

    // start, 4 builds, install, 4 links
    assert_eq!(fractions.len(), 10);
    assert_eq!(fractions[0], 0.0);
    assert_eq!(fractions[4], 0.5);
    assert_eq!(fractions[5], 0.5);
    assert_eq!(fractions[9], 1.0);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!(op.is_finished());
    assert_eq!(op.progress(), 1.0);

    assert_eq!(report.models.len(), 4);
    assert_eq!(report.linked, 5);
    assert_eq!(op.step(), LoadState::Done(report));
}

#[test]
fn registry_is_untouched_until_install() {
    let bundle = saved_level(2);
    let registry = Registry::new();
    let mut op = Gateway::new(registry.clone(), types()).load(bundle, ());

    for _ in 0..4 {
        op.step();
        assert!(registry.is_empty());
    }
    op.step();
    assert_eq!(registry.len(), 3);

    let level = registry.find::<Level>(&ModelId::from("level")).unwrap();
    assert!(level.tiles.is_empty());
    assert!(matches!(op.run(), LoadState::Done(_)));
    assert_eq!(level.tiles.len(), 2);
}

#[test]
fn empty_bundle_finishes_at_full_progress() {
    let done = Cell::new(false);
    let last = Cell::new(-1.0);
    let observer = LoadCallbacks::new()
        .with_progress(|p| last.set(p))
        .with_done(|report| done.set(report.models.is_empty()));

    let state = Gateway::new(Registry::new(), types())
        .load(Bundle::default(), observer)
        .run();

    assert!(matches!(state, LoadState::Done(_)));
    assert!(done.get());
    assert_eq!(last.get(), 1.0);
}

#[test]
fn duplicate_ids_in_bundle_abort_the_load() {
    let mut bundle = saved_level(2);
    let copy = bundle.envelopes[1].clone();
    bundle.envelopes.push(copy);

    let registry = Registry::new();
    let errors = RefCell::new(Vec::new());
    let done = Cell::new(false);
    let observer = LoadCallbacks::new()
        .with_error(|msg| errors.borrow_mut().push(msg.to_string()))
        .with_done(|_| done.set(true));
    let state = Gateway::new(registry.clone(), types()).load(bundle, observer).run();

    assert_eq!(
        state,
        LoadState::Failed(PersistError::DuplicateId(ModelId::from("tile-0")))
    );
    assert_eq!(errors.borrow().len(), 1);
    assert!(!done.get());
    assert!(registry.is_empty());
}

#[test]
fn malformed_fields_abort_the_load() {
    let mut bundle = saved_level(2);
    bundle.envelopes[2].fields["height"] = "tall".into();

    let registry = Registry::new();
    let state = Gateway::new(registry.clone(), types()).load(bundle, ()).run();

    assert!(matches!(
        state,
        LoadState::Failed(PersistError::Malformed { ref id, .. }) if id.as_str() == "tile-1"
    ));
    assert!(registry.is_empty());
}

#[test]
fn missing_directory_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let state = Gateway::new(Registry::new(), types())
        .load(dir.path().join("nowhere"), ())
        .run();
    assert!(matches!(state, LoadState::Failed(PersistError::Io { .. })));
}

#[test]
fn cancel_before_install_leaves_registry_empty() {
    let registry = Registry::new();
    let mut op = Gateway::new(registry.clone(), types()).load(saved_level(3), ());
    op.step();
    op.step();

    assert!(op.cancel());
    assert!(op.is_finished());
    assert_eq!(op.step(), LoadState::Cancelled);
    assert!(registry.is_empty());
}

#[test]
fn cancel_mid_link_deletes_installed_models() {
    let registry = Registry::new();
    let survivor = registry
        .insert(Tile {
            core: ModelCore::with_id("survivor"),
            height: Cell::new(0),
            north: SingleRef::empty(),
        })
        .unwrap();

    let progress_calls = Cell::new(0);
    let observer = LoadCallbacks::new().with_progress(|_| progress_calls.set(progress_calls.get() + 1));
    let mut op = Gateway::new(registry.clone(), types()).load(saved_level(3), observer);
    // start, 4 builds, install, 2 links
    for _ in 0..8 {
        assert!(matches!(op.step(), LoadState::Running(_)));
    }
    let tile = registry.find::<Tile>(&ModelId::from("tile-0")).unwrap();
    assert!(tile.ref_count() > 0);

    op.cancel();
    let calls = progress_calls.get();
    op.step();
    drop(op);

    assert_eq!(progress_calls.get(), calls);
    assert!(tile.is_deleted());
    assert_eq!(registry.ids(), vec![ModelId::from("survivor")]);
    assert!(!survivor.is_deleted());
}
