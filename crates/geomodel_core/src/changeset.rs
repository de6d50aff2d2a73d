//! Scoped grouping of fine-grained edits into one described change.
//!
//! # Responsibility
//! - Attach a human-readable description to a run of mutations.
//! - Deduplicate "already touched in this change" bookkeeping per object.
//!
//! # Invariants
//! - A model has at most one active changeset. The first handle opened while
//!   none is active claims the slot; handles opened inside it stay inert.
//! - Only the handle that claimed the slot clears it, when it is dropped.
//! - The first superseded revision of each touched object is kept until the
//!   changeset is dropped; later edits of the same object record nothing.

use crate::model::Model;
use crate::revision::AnyRevision;
use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of an aggregate, assigned once at construction.
///
/// Serial numbers are never reused within a process, also not after the
/// aggregate is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleIdentity(u64);

impl HandleIdentity {
    /// Allocates the next unused identity.
    pub fn allocate() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared state of one changeset.
pub struct Changeset {
    description: String,
    touched: RefCell<HashSet<HandleIdentity>>,
    originals: RefCell<HashMap<HandleIdentity, Rc<dyn AnyRevision>>>,
}

impl Changeset {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            touched: RefCell::new(HashSet::new()),
            originals: RefCell::new(HashMap::new()),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Marks `identity` as touched. Returns `false` when it already was.
    pub fn add_handle(&self, identity: HandleIdentity) -> bool {
        self.touched.borrow_mut().insert(identity)
    }

    pub fn has_handle(&self, identity: HandleIdentity) -> bool {
        self.touched.borrow().contains(&identity)
    }

    pub fn touched_count(&self) -> usize {
        self.touched.borrow().len()
    }

    /// State of `identity` before this changeset first modified it.
    pub fn original_revision(&self, identity: HandleIdentity) -> Option<Rc<dyn AnyRevision>> {
        self.originals.borrow().get(&identity).cloned()
    }

    /// Keeps `revision` as the pre-change state unless one is already recorded.
    pub(crate) fn record_original(&self, identity: HandleIdentity, revision: Rc<dyn AnyRevision>) {
        self.originals
            .borrow_mut()
            .entry(identity)
            .or_insert(revision);
    }
}

impl Debug for Changeset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changeset")
            .field("description", &self.description)
            .field("touched", &self.touched_count())
            .finish()
    }
}

/// RAII guard opening a changeset on a model.
///
/// Dropping an active handle clears the model's current changeset; dropping
/// an inert (nested) one does nothing to the model.
pub struct ChangesetHandle<'m> {
    model: &'m Model,
    changeset: Rc<Changeset>,
    active: bool,
}

impl<'m> ChangesetHandle<'m> {
    pub fn new(model: &'m Model, description: impl Into<String>) -> Self {
        let changeset = Rc::new(Changeset::new(description));
        let active = model.register_changeset_handle(&changeset);
        debug!(
            "event=changeset_open module=changeset status=ok active={} description_len={}",
            active,
            changeset.description().len()
        );
        Self {
            model,
            changeset,
            active,
        }
    }

    /// Whether this handle claimed the model's changeset slot.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn description(&self) -> &str {
        self.changeset.description()
    }

    pub fn add_handle(&self, identity: HandleIdentity) -> bool {
        self.changeset.add_handle(identity)
    }

    pub fn has_handle(&self, identity: HandleIdentity) -> bool {
        self.changeset.has_handle(identity)
    }

    pub fn changeset(&self) -> &Rc<Changeset> {
        &self.changeset
    }
}

impl Drop for ChangesetHandle<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let cleared = self.model.unregister_changeset_handle(&self.changeset);
        debug_assert!(cleared, "active changeset handle lost its slot");
        debug!(
            "event=changeset_close module=changeset status=ok touched={}",
            self.changeset.touched_count()
        );
    }
}

impl Debug for ChangesetHandle<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesetHandle")
            .field("changeset", &self.changeset)
            .field("active", &self.active)
            .finish()
    }
}
