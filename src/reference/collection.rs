use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use super::{attach, detach, lookup, Attached, Reference, ResolveOutcome};
use crate::ids::ModelId;
use crate::model::{AnyModel, Model};
use crate::registry::Registry;

struct Entry<T> {
    attached: Attached<T>,
    token: u64,
}

struct Members<T> {
    entries: Vec<Entry<T>>,
    pending: Vec<ModelId>,
    next_token: u64,
    /// Set once the owning model is deleted; no entries are accepted after.
    released: bool,
}

impl<T> Members<T> {
    fn take_token(&mut self, token: u64) -> Option<Entry<T>> {
        let position = self.entries.iter().position(|entry| entry.token == token)?;
        Some(self.entries.remove(position))
    }
}

/// An ordered list of references to models of type `T`.
///
/// Each entry counts as one reference on its model, duplicates included.
/// Entries disappear on their own when their model is deleted.
pub struct RefCollection<T: Model> {
    members: Rc<RefCell<Members<T>>>,
}

impl<T: Model> Default for RefCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> RefCollection<T> {
    pub fn new() -> Self {
        RefCollection {
            members: Rc::new(RefCell::new(Members {
                entries: Vec::new(),
                pending: Vec::new(),
                next_token: 1,
                released: false,
            })),
        }
    }

    /// Appends `model`. Returns false when the model or this collection's
    /// owner is deleted.
    pub fn add(&self, model: &Rc<T>) -> bool {
        let len = self.len();
        self.insert(len, model)
    }

    /// Inserts `model` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, model: &Rc<T>) -> bool {
        let len = self.len();
        assert!(
            index <= len,
            "insertion index (is {index}) should be <= len (is {len})"
        );
        if self.members.borrow().released {
            warn!(
                member = %model.core().id(),
                tag = T::TYPE_TAG,
                "collection of a deleted model cannot take members"
            );
            return false;
        }

        let token = {
            let mut members = self.members.borrow_mut();
            let token = members.next_token;
            members.next_token += 1;
            token
        };

        let weak = Rc::downgrade(&self.members);
        let attached = attach(model, move || {
            let Some(members) = weak.upgrade() else {
                return;
            };
            // No decrement: the member is being torn down.
            let removed = members.borrow_mut().take_token(token);
            drop(removed);
        });

        match attached {
            Some(attached) => {
                self.members
                    .borrow_mut()
                    .entries
                    .insert(index, Entry { attached, token });
                true
            }
            None => false,
        }
    }

    /// Removes the first entry for `model`.
    pub fn remove(&self, model: &Rc<T>) -> bool {
        match self.index_of(model) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    pub fn remove_at(&self, index: usize) -> Option<Rc<T>> {
        let entry = {
            let mut members = self.members.borrow_mut();
            if index >= members.entries.len() {
                return None;
            }
            members.entries.remove(index)
        };
        let model = entry.attached.model.clone();
        detach(entry.attached);
        Some(model)
    }

    /// Removes every entry, releasing each model.
    pub fn clear(&self) {
        let entries = {
            let mut members = self.members.borrow_mut();
            members.pending.clear();
            std::mem::take(&mut members.entries)
        };
        for entry in entries {
            detach(entry.attached);
        }
    }

    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        self.members
            .borrow()
            .entries
            .get(index)
            .map(|entry| entry.attached.model.clone())
    }

    pub fn len(&self) -> usize {
        self.members.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().entries.is_empty()
    }

    pub fn first(&self) -> Option<Rc<T>> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Rc<T>> {
        self.members
            .borrow()
            .entries
            .last()
            .map(|entry| entry.attached.model.clone())
    }

    pub fn contains(&self, model: &Rc<T>) -> bool {
        self.index_of(model).is_some()
    }

    pub fn index_of(&self, model: &Rc<T>) -> Option<usize> {
        self.members
            .borrow()
            .entries
            .iter()
            .position(|entry| Rc::ptr_eq(&entry.attached.model, model))
    }

    /// First member matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<Rc<T>>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().find(|model| predicate(&**model))
    }

    /// Iterates over the members present when called. Membership changes made
    /// while iterating do not affect the iterator.
    pub fn iter(&self) -> std::vec::IntoIter<Rc<T>> {
        self.to_vec().into_iter()
    }

    pub fn to_vec(&self) -> Vec<Rc<T>> {
        self.members
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.attached.model.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.members
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.attached.model.core().id().clone())
            .collect()
    }
}

impl<'a, T: Model> IntoIterator for &'a RefCollection<T> {
    type Item = Rc<T>;
    type IntoIter = std::vec::IntoIter<Rc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Model> Reference for RefCollection<T> {
    fn targets(&self) -> Vec<Rc<dyn AnyModel>> {
        self.iter()
            .map(|model| model as Rc<dyn AnyModel>)
            .collect()
    }

    fn pending_ids(&self) -> Vec<ModelId> {
        self.members.borrow().pending.clone()
    }

    fn resolve(&self, registry: &Registry) -> ResolveOutcome {
        let pending = std::mem::take(&mut self.members.borrow_mut().pending);
        let mut outcome = ResolveOutcome::default();

        for id in pending {
            let linked = match lookup::<T>(registry, "RefCollection", &id) {
                Some(model) => self.add(&model),
                None => false,
            };
            outcome.merge(if linked {
                ResolveOutcome {
                    linked: 1,
                    missing: Vec::new(),
                }
            } else {
                ResolveOutcome {
                    linked: 0,
                    missing: vec![id],
                }
            });
        }

        outcome
    }

    fn release(&self) {
        self.members.borrow_mut().released = true;
        self.clear();
    }
}

impl<T: Model> Drop for RefCollection<T> {
    fn drop(&mut self) {
        let entries = match self.members.try_borrow_mut() {
            Ok(mut members) => std::mem::take(&mut members.entries),
            Err(_) => Vec::new(),
        };
        for entry in entries {
            detach(entry.attached);
        }
    }
}

impl<T: Model> fmt::Debug for RefCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCollection")
            .field("type", &T::TYPE_TAG)
            .field("members", &self.ids())
            .field("pending", &self.members.borrow().pending)
            .finish()
    }
}

impl<T: Model> Serialize for RefCollection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let members = self.members.borrow();
        let mut seq =
            serializer.serialize_seq(Some(members.entries.len() + members.pending.len()))?;
        for entry in &members.entries {
            seq.serialize_element(entry.attached.model.core().id())?;
        }
        for id in &members.pending {
            seq.serialize_element(id)?;
        }
        seq.end()
    }
}

impl<'de, T: Model> Deserialize<'de> for RefCollection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        let collection = RefCollection::new();
        collection.members.borrow_mut().pending = raw
            .into_iter()
            .filter(|id| !id.is_empty())
            .map(ModelId::from)
            .collect();
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::model::{ModelCore, ModelExt};

    #[derive(crate::Model, Serialize, Deserialize)]
    struct Drone {
        core: ModelCore,
        fuel: Cell<u32>,
    }

    #[derive(crate::Model, Serialize, Deserialize)]
    struct Hangar {
        core: ModelCore,
        drones: RefCollection<Drone>,
    }

    fn drone(registry: &Registry, id: &str) -> Rc<Drone> {
        registry
            .insert(Drone {
                core: ModelCore::with_id(id),
                fuel: Cell::new(10),
            })
            .unwrap()
    }

    fn hangar(registry: &Registry) -> Rc<Hangar> {
        registry
            .insert(Hangar {
                core: ModelCore::with_id("h"),
                drones: RefCollection::new(),
            })
            .unwrap()
    }

    fn ids(collection: &RefCollection<Drone>) -> Vec<String> {
        collection.ids().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn add_keeps_order_and_counts() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");

        assert!(h.drones.add(&a));
        assert!(h.drones.add(&b));
        assert!(h.drones.add(&a));

        assert_eq!(ids(&h.drones), vec!["a", "b", "a"]);
        assert_eq!(a.ref_count(), 2);
        assert_eq!(b.ref_count(), 1);
        assert_eq!(h.drones.len(), 3);
        assert!(Rc::ptr_eq(&h.drones.last().unwrap(), &a));
    }

    #[test]
    fn insert_places_entry() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");

        h.drones.add(&a);
        h.drones.insert(0, &b);
        assert_eq!(ids(&h.drones), vec!["b", "a"]);
        assert!(Rc::ptr_eq(&h.drones.first().unwrap(), &b));
    }

    #[test]
    #[should_panic(expected = "insertion index")]
    fn insert_past_end_panics() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        h.drones.insert(1, &a);
    }

    #[test]
    fn remove_releases_one_entry() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");

        h.drones.add(&a);
        h.drones.add(&a);
        assert!(h.drones.remove(&a));
        assert_eq!(a.ref_count(), 1);
        assert_eq!(a.core().delete_listener_count(), 1);
        assert!(h.drones.contains(&a));
    }

    #[test]
    fn remove_missing_is_false() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        assert!(!h.drones.remove(&a));
        assert!(h.drones.remove_at(3).is_none());
    }

    #[test]
    fn remove_at_returns_model() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        h.drones.add(&a);
        h.drones.add(&b);

        let removed = h.drones.remove_at(0).unwrap();
        assert!(Rc::ptr_eq(&removed, &a));
        assert_eq!(a.ref_count(), 0);
        assert_eq!(ids(&h.drones), vec!["b"]);
    }

    #[test]
    fn clear_releases_everything() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        h.drones.add(&a);
        h.drones.add(&b);

        h.drones.clear();
        assert!(h.drones.is_empty());
        assert_eq!(a.ref_count(), 0);
        assert_eq!(b.ref_count(), 0);
    }

    #[test]
    fn member_delete_removes_all_its_entries() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        h.drones.add(&a);
        h.drones.add(&b);
        h.drones.add(&a);

        a.delete();
        assert_eq!(ids(&h.drones), vec!["b"]);
        assert_eq!(b.ref_count(), 1);
    }

    #[test]
    fn deleted_owner_refuses_members() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        h.drones.add(&a);

        h.delete();
        assert_eq!(a.ref_count(), 0);
        assert!(!h.drones.add(&a));
        assert!(!h.drones.insert(0, &a));
        assert!(h.drones.is_empty());
        assert_eq!(a.ref_count(), 0);
        assert_eq!(a.core().delete_listener_count(), 0);
    }

    #[test]
    fn iteration_is_a_snapshot() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        h.drones.add(&a);
        h.drones.add(&b);

        let mut seen = Vec::new();
        for d in &h.drones {
            seen.push(d.core().id().to_string());
            h.drones.remove(&d);
        }
        assert_eq!(seen, vec!["a", "b"]);
        assert!(h.drones.is_empty());

        h.drones.add(&a);
        assert_eq!(h.drones.iter().count(), 1);
        assert_eq!(h.drones.iter().count(), 1);
    }

    #[test]
    fn find_by_predicate() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        b.fuel.set(99);
        h.drones.add(&a);
        h.drones.add(&b);

        let full = h.drones.find(|d| d.fuel.get() > 50).unwrap();
        assert!(Rc::ptr_eq(&full, &b));
        assert!(h.drones.find(|d| d.fuel.get() > 100).is_none());
    }

    #[test]
    fn serializes_ordered_ids() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");
        h.drones.add(&b);
        h.drones.add(&a);

        let fields = serde_json::to_value(&*h).unwrap();
        assert_eq!(fields["drones"], serde_json::json!(["b", "a"]));
    }

    #[test]
    fn resolve_skips_missing_ids() {
        let registry = Registry::new();
        let a = drone(&registry, "a");
        let b = drone(&registry, "b");

        let collection: RefCollection<Drone> =
            serde_json::from_str(r#"["b", "ghost", "a"]"#).unwrap();
        assert!(collection.is_empty());
        assert_eq!(collection.pending_ids().len(), 3);

        let outcome = collection.resolve(&registry);
        assert_eq!(outcome.linked, 2);
        assert_eq!(outcome.missing, vec![ModelId::from("ghost")]);
        assert_eq!(ids(&collection), vec!["b", "a"]);
        assert_eq!(a.ref_count(), 1);
        assert_eq!(b.ref_count(), 1);
        assert!(collection.pending_ids().is_empty());
    }

    #[test]
    fn dropping_the_collection_releases_members() {
        let registry = Registry::new();
        let a = drone(&registry, "a");
        {
            let collection = RefCollection::new();
            collection.add(&a);
            collection.add(&a);
            assert_eq!(a.ref_count(), 2);
        }
        assert_eq!(a.ref_count(), 0);
    }

    #[test]
    fn deleted_model_is_not_added() {
        let registry = Registry::new();
        let h = hangar(&registry);
        let a = drone(&registry, "a");
        a.delete();

        assert!(!h.drones.add(&a));
        assert!(h.drones.is_empty());
    }
}
