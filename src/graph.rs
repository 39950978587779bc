//! Reachability over reference fields.
//!
//! Both walks are breadth-first and keep an explicit set of visited ids, so
//! reference cycles terminate.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::ids::ModelId;
use crate::model::{AnyModel, ModelExt};

/// Every model reachable from `root` through reference fields, deduplicated,
/// in discovery order. `root` itself only appears when a cycle leads back to it.
pub fn references_of<M: AnyModel + ?Sized>(root: &M) -> Vec<Rc<dyn AnyModel>> {
    let mut queue: VecDeque<Rc<dyn AnyModel>> = root
        .reference_fields()
        .into_iter()
        .flat_map(|reference| reference.targets())
        .collect();
    walk(&mut queue, HashSet::new())
}

/// `roots` followed by everything reachable from them, deduplicated.
/// Deleted roots are skipped.
pub fn collect(roots: &[Rc<dyn AnyModel>]) -> Vec<Rc<dyn AnyModel>> {
    let mut queue: VecDeque<Rc<dyn AnyModel>> = roots
        .iter()
        .filter(|root| !root.is_deleted())
        .cloned()
        .collect();
    walk(&mut queue, HashSet::new())
}

fn walk(
    queue: &mut VecDeque<Rc<dyn AnyModel>>,
    mut seen: HashSet<ModelId>,
) -> Vec<Rc<dyn AnyModel>> {
    let mut reached = Vec::new();
    while let Some(model) = queue.pop_front() {
        if !seen.insert(model.id().clone()) {
            continue;
        }
        for reference in model.reference_fields() {
            queue.extend(reference.targets());
        }
        reached.push(model);
    }
    reached
}
