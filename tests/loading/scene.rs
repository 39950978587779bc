use std::cell::Cell;
use std::rc::Rc;

use model_graph::{Model, ModelCore, RefCollection, Registry, SingleRef, TypeTable};
use serde::{Deserialize, Serialize};

#[derive(Model, Serialize, Deserialize)]
pub struct Tile {
    pub core: ModelCore,
    pub height: Cell<i32>,
    pub north: SingleRef<Tile>,
}

#[derive(Model, Serialize, Deserialize)]
pub struct Level {
    pub core: ModelCore,
    pub tiles: RefCollection<Tile>,
}

pub fn types() -> TypeTable {
    TypeTable::new().with::<Tile>().with::<Level>()
}

/// A level of `size` tiles, each pointing north at the previous one.
pub fn level(registry: &Registry, size: usize) -> Rc<Level> {
    let level = registry
        .insert(Level {
            core: ModelCore::with_id("level"),
            tiles: RefCollection::new(),
        })
        .unwrap();

    let mut previous: Option<Rc<Tile>> = None;
    for n in 0..size {
        let tile = registry
            .insert(Tile {
                core: ModelCore::with_id(format!("tile-{}", n)),
                height: Cell::new(n as i32),
                north: SingleRef::empty(),
            })
            .unwrap();
        tile.north.set(previous.as_ref());
        level.tiles.add(&tile);
        previous = Some(tile);
    }
    level
}
