use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned when subscribing; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Rc<dyn Fn()>;

/// Ordered list of zero-argument callbacks.
///
/// Firing works on a snapshot, so callbacks may subscribe or unsubscribe while
/// the list is being fired. A callback removed mid-fire is not invoked.
pub(crate) struct Listeners {
    next: Cell<u64>,
    entries: RefCell<Vec<(ListenerId, Callback)>>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

impl Listeners {
    pub fn new() -> Self {
        Listeners {
            next: Cell::new(1),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        let id = ListenerId(self.next.get());
        self.next.set(id.0 + 1);
        self.entries.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.borrow().iter().any(|(entry, _)| *entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn clear(&self) {
        // Dropped outside the borrow; callbacks may own models.
        let drained = std::mem::take(&mut *self.entries.borrow_mut());
        drop(drained);
    }

    pub fn fire(&self) {
        let snapshot: Vec<(ListenerId, Callback)> = self.entries.borrow().clone();
        for (id, callback) in snapshot {
            if self.contains(id) {
                callback();
            }
        }
    }
}
