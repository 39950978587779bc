//! Shared fixtures: a small hangar of mechs, pilots and weapons.

#![allow(dead_code)]

mod hangar;

pub use hangar::{hangar, mech, pilot, types, weapon, Hangar, Mech, Pilot, Weapon};

use model_graph::{AnyModel, ModelExt};
use std::rc::Rc;

/// Ids of `models`, in order.
pub fn ids_of(models: &[Rc<dyn AnyModel>]) -> Vec<String> {
    models.iter().map(|m| m.id().to_string()).collect()
}
