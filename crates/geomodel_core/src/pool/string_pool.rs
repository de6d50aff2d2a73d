//! Reference-counted, deduplicating text storage.
//!
//! # Responsibility
//! - Intern immutable text values so equal values share exactly one entry.
//! - Evict an entry in the same operation that drops its last handle.
//!
//! # Invariants
//! - An entry is present in the pool iff at least one `PoolHandle` references it.
//! - Entries are unique by text value within one pool.
//! - Handles compare equal iff they reference the same entry; empty handles
//!   compare equal to each other and to nothing else.
//! - Handles may outlive their pool; eviction then becomes a no-op.

use log::trace;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

type Storage<T> = RefCell<BTreeMap<Rc<str>, Weak<PoolEntry<T>>>>;

/// One live entry. The reference count is the strong count of its `Rc`.
pub(crate) struct PoolEntry<T> {
    text: Rc<str>,
    payload: T,
    storage: Weak<Storage<T>>,
    label: &'static str,
}

impl<T> Drop for PoolEntry<T> {
    fn drop(&mut self) {
        // The pool only holds weak links, so reaching here means the last
        // handle is gone and the entry must leave storage right now.
        let Some(storage) = self.storage.upgrade() else {
            return;
        };
        let remaining = {
            let mut entries = storage.borrow_mut();
            entries.remove(&*self.text);
            entries.len()
        };
        trace!(
            "event=pool_entry_evicted module=pool status=ok pool={} size={}",
            self.label,
            remaining
        );
    }
}

/// Deduplicating set of immutable text values.
///
/// `T` is a per-entry payload created with `T::default()` when an entry is
/// first inserted. Plain string pools use `()`; the identifier pool stores
/// its back-reference list there.
pub struct StringPool<T = ()> {
    storage: Rc<Storage<T>>,
    label: &'static str,
}

impl<T: Default> StringPool<T> {
    /// Creates an empty pool. `label` only appears in diagnostics.
    pub fn new(label: &'static str) -> Self {
        Self {
            storage: Rc::new(RefCell::new(BTreeMap::new())),
            label,
        }
    }

    /// Returns a handle to the entry for `text`, creating the entry if needed.
    pub fn insert(&self, text: &str) -> PoolHandle<T> {
        let mut entries = self.storage.borrow_mut();
        if let Some(entry) = entries.get(text).and_then(Weak::upgrade) {
            return PoolHandle { entry: Some(entry) };
        }

        let key: Rc<str> = Rc::from(text);
        let entry = Rc::new(PoolEntry {
            text: Rc::clone(&key),
            payload: T::default(),
            storage: Rc::downgrade(&self.storage),
            label: self.label,
        });
        entries.insert(key, Rc::downgrade(&entry));
        trace!(
            "event=pool_entry_created module=pool status=ok pool={} size={}",
            self.label,
            entries.len()
        );
        PoolHandle { entry: Some(entry) }
    }
}

impl<T> StringPool<T> {
    /// Membership test against live entries. Never touches reference counts.
    pub fn contains(&self, text: &str) -> bool {
        self.storage.borrow().contains_key(text)
    }

    /// Returns a new handle to an existing entry without creating one.
    pub fn find(&self, text: &str) -> Option<PoolHandle<T>> {
        self.storage
            .borrow()
            .get(text)
            .and_then(Weak::upgrade)
            .map(|entry| PoolHandle { entry: Some(entry) })
    }

    /// Number of distinct live entries.
    pub fn size(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.borrow().is_empty()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns whether `handle` points at an entry of this pool.
    pub fn owns(&self, handle: &PoolHandle<T>) -> bool {
        handle
            .entry
            .as_ref()
            .is_some_and(|entry| Weak::ptr_eq(&entry.storage, &Rc::downgrade(&self.storage)))
    }
}

impl<T> Debug for StringPool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringPool")
            .field("label", &self.label)
            .field("size", &self.size())
            .finish()
    }
}

/// Counted reference to a pool entry.
///
/// Cloning increments the entry's count and dropping decrements it; the
/// drop that reaches zero erases the entry from its pool.
pub struct PoolHandle<T = ()> {
    entry: Option<Rc<PoolEntry<T>>>,
}

impl<T> PoolHandle<T> {
    /// A handle that references no entry.
    pub fn empty() -> Self {
        Self { entry: None }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// The interned text, or `None` for an empty handle.
    pub fn text(&self) -> Option<&str> {
        self.entry.as_deref().map(|entry| &*entry.text)
    }

    /// Number of live handles sharing this entry (zero for an empty handle).
    pub fn ref_count(&self) -> usize {
        self.entry.as_ref().map_or(0, Rc::strong_count)
    }

    pub(crate) fn payload(&self) -> Option<&T> {
        self.entry.as_deref().map(|entry| &entry.payload)
    }

    fn address(&self) -> usize {
        self.entry
            .as_ref()
            .map_or(0, |entry| Rc::as_ptr(entry) as *const () as usize)
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
        }
    }
}

impl<T> Default for PoolHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> PartialEq for PoolHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.entry, &other.entry) {
            (Some(left), Some(right)) => Rc::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Eq for PoolHandle<T> {}

impl<T> Hash for PoolHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl<T> PartialOrd for PoolHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by text first so sorted containers read naturally; the entry
/// address breaks ties between equal texts from different pools.
impl<T> Ord for PoolHandle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text()
            .cmp(&other.text())
            .then_with(|| self.address().cmp(&other.address()))
    }
}

impl<T> Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.text() {
            Some(text) => write!(f, "PoolHandle({text:?})"),
            None => write!(f, "PoolHandle(<empty>)"),
        }
    }
}
