use std::cell::{Cell, RefCell};
use std::rc::Rc;

use model_graph::{Model, ModelCore, RefCollection, Registry, SingleRef, TypeTable};
use serde::{Deserialize, Serialize};

#[derive(Model, Serialize, Deserialize)]
pub struct Pilot {
    pub core: ModelCore,
    pub callsign: RefCell<String>,
    pub wingman: SingleRef<Pilot>,
}

#[derive(Model, Serialize, Deserialize)]
pub struct Weapon {
    pub core: ModelCore,
    pub name: String,
    pub damage: Cell<u32>,
}

#[derive(Model, Serialize, Deserialize)]
pub struct Mech {
    pub core: ModelCore,
    pub chassis: String,
    pub armor: Cell<u32>,
    pub pilot: SingleRef<Pilot>,
    pub weapons: RefCollection<Weapon>,
}

#[derive(Model, Serialize, Deserialize)]
#[model(tag = "hangar.Hangar")]
pub struct Hangar {
    pub core: ModelCore,
    pub name: String,
    pub mechs: RefCollection<Mech>,
}

pub fn types() -> TypeTable {
    TypeTable::new()
        .with::<Pilot>()
        .with::<Weapon>()
        .with::<Mech>()
        .with::<Hangar>()
}

pub fn pilot(registry: &Registry, id: &str, callsign: &str) -> Rc<Pilot> {
    registry
        .insert(Pilot {
            core: ModelCore::with_id(id),
            callsign: RefCell::new(callsign.to_string()),
            wingman: SingleRef::empty(),
        })
        .unwrap()
}

pub fn weapon(registry: &Registry, id: &str, name: &str, damage: u32) -> Rc<Weapon> {
    registry
        .insert(Weapon {
            core: ModelCore::with_id(id),
            name: name.to_string(),
            damage: Cell::new(damage),
        })
        .unwrap()
}

pub fn mech(registry: &Registry, id: &str, chassis: &str) -> Rc<Mech> {
    registry
        .insert(Mech {
            core: ModelCore::with_id(id),
            chassis: chassis.to_string(),
            armor: Cell::new(100),
            pilot: SingleRef::empty(),
            weapons: RefCollection::new(),
        })
        .unwrap()
}

pub fn hangar(registry: &Registry, id: &str, name: &str) -> Rc<Hangar> {
    registry
        .insert(Hangar {
            core: ModelCore::with_id(id),
            name: name.to_string(),
            mechs: RefCollection::new(),
        })
        .unwrap()
}
