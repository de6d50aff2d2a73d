//! Model root: object graph owner, changeset slot and notification batching.
//!
//! # Responsibility
//! - Own the root feature store and the name/identifier pools it draws from.
//! - Track the single active changeset.
//! - Coalesce change notifications until the outermost guarded scope exits.
//!
//! # Invariants
//! - The notification guard depth never goes below zero.
//! - Observers are called at most once per outermost guarded scope, and only
//!   when something changed inside it.
//! - While observers run the depth is held at a non-zero sentinel, so edits
//!   made by observers are deferred to the next flush instead of re-entering it.
//! - Mutations outside any guard flush immediately (implicit single-edit scope).

use crate::changeset::{Changeset, ChangesetHandle, HandleIdentity};
use crate::feature::Feature;
use crate::feature_collection::FeatureCollection;
use crate::feature_store::FeatureStore;
use crate::pool::{
    FeatureId, IdentifierError, IdentifierPool, NamePools, QualifiedNameError,
};
use crate::revision::AnyRevision;
use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors from structural edits of the object graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The feature already sits in a collection.
    FeatureAlreadyInCollection(FeatureId),
    /// The collection already sits in a feature store.
    CollectionAlreadyInStore,
    /// Slot index past the end of a container.
    SlotOutOfRange { index: usize, len: usize },
    /// Property index past the end of a feature's property list.
    PropertyOutOfRange { index: usize, len: usize },
    Name(QualifiedNameError),
    Identifier(IdentifierError),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeatureAlreadyInCollection(id) => {
                write!(f, "feature already belongs to a collection: {id}")
            }
            Self::CollectionAlreadyInStore => {
                write!(f, "feature collection already belongs to a feature store")
            }
            Self::SlotOutOfRange { index, len } => {
                write!(f, "slot index {index} out of range for {len} slots")
            }
            Self::PropertyOutOfRange { index, len } => {
                write!(f, "property index {index} out of range for {len} properties")
            }
            Self::Name(err) => write!(f, "{err}"),
            Self::Identifier(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            Self::Identifier(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QualifiedNameError> for ModelError {
    fn from(value: QualifiedNameError) -> Self {
        Self::Name(value)
    }
}

impl From<IdentifierError> for ModelError {
    fn from(value: IdentifierError) -> Self {
        Self::Identifier(value)
    }
}

/// The pools one model draws names and identifiers from.
#[derive(Debug, Default)]
pub struct ModelPools {
    pub names: NamePools,
    pub identifiers: IdentifierPool,
}

impl ModelPools {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Subscription token returned by [`Model::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverCallback = Rc<RefCell<dyn FnMut(&Model)>>;

struct Observer {
    id: ObserverId,
    callback: ObserverCallback,
}

/// Process-session owner of the object graph.
///
/// Single-threaded: all state uses `Cell`/`RefCell`, and the model is shared
/// through `Rc`.
pub struct Model {
    pools: ModelPools,
    root: Rc<FeatureStore>,
    current_changeset: RefCell<Option<Rc<Changeset>>>,
    guard_depth: Cell<usize>,
    pending: Cell<bool>,
    pending_modifications: Cell<usize>,
    flush_count: Cell<u64>,
    observers: RefCell<Vec<Observer>>,
    next_observer_id: Cell<u64>,
}

impl Model {
    pub fn new(pools: ModelPools) -> Rc<Self> {
        Rc::new_cyclic(|model| Self {
            pools,
            root: FeatureStore::new(model.clone()),
            current_changeset: RefCell::new(None),
            guard_depth: Cell::new(0),
            pending: Cell::new(false),
            pending_modifications: Cell::new(0),
            flush_count: Cell::new(0),
            observers: RefCell::new(Vec::new()),
            next_observer_id: Cell::new(0),
        })
    }

    pub fn pools(&self) -> &ModelPools {
        &self.pools
    }

    pub fn names(&self) -> &NamePools {
        &self.pools.names
    }

    pub fn identifiers(&self) -> &IdentifierPool {
        &self.pools.identifiers
    }

    /// Root aggregate.
    pub fn root(&self) -> &Rc<FeatureStore> {
        &self.root
    }

    // --- changesets ---

    /// Opens a scoped changeset. Inert if another one is already active.
    pub fn changeset(&self, description: impl Into<String>) -> ChangesetHandle<'_> {
        ChangesetHandle::new(self, description)
    }

    /// Claims the changeset slot for `changeset` if it is free.
    pub fn register_changeset_handle(&self, changeset: &Rc<Changeset>) -> bool {
        let mut current = self.current_changeset.borrow_mut();
        if current.is_some() {
            return false;
        }
        *current = Some(Rc::clone(changeset));
        true
    }

    /// Clears the slot, but only if `changeset` is the one holding it.
    pub fn unregister_changeset_handle(&self, changeset: &Rc<Changeset>) -> bool {
        let mut current = self.current_changeset.borrow_mut();
        match current.as_ref() {
            Some(active) if Rc::ptr_eq(active, changeset) => {
                *current = None;
                true
            }
            _ => {
                debug!("event=changeset_unregister module=model status=noop");
                false
            }
        }
    }

    pub fn current_changeset_handle(&self) -> Option<Rc<Changeset>> {
        self.current_changeset.borrow().clone()
    }

    // --- notification guard ---

    /// Opens a scoped notification guard.
    pub fn notification_guard(&self) -> NotificationGuard<'_> {
        NotificationGuard::new(self)
    }

    pub fn increment_notification_guard(&self) {
        self.guard_depth.set(self.guard_depth.get() + 1);
    }

    /// Leaves one guarded scope; leaving the outermost one flushes.
    ///
    /// # Panics
    /// Panics when called without a matching increment.
    pub fn decrement_notification_guard(&self) {
        let depth = self.guard_depth.get();
        assert!(depth > 0, "notification guard decremented below zero");
        if depth > 1 {
            self.guard_depth.set(depth - 1);
            return;
        }

        // Depth stays at 1 while observers run and drops to 0 afterwards,
        // also when an observer panics.
        let _release = DepthRelease(&self.guard_depth);
        self.flush_pending_notifications();
    }

    pub fn has_notification_guard(&self) -> bool {
        self.guard_depth.get() > 0
    }

    pub fn notification_guard_depth(&self) -> usize {
        self.guard_depth.get()
    }

    /// Whether a change is waiting for the next flush.
    pub fn pending_notification(&self) -> bool {
        self.pending.get()
    }

    /// Number of flushes that reached observers so far.
    pub fn flush_count(&self) -> u64 {
        self.flush_count.get()
    }

    // --- observers ---

    /// Registers a callback for the "something changed" flush event.
    ///
    /// Callbacks get the model by reference; capturing an `Rc<Model>` in one
    /// would keep the model alive forever.
    pub fn subscribe(&self, callback: impl FnMut(&Model) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer_id.get());
        self.next_observer_id.set(id.0 + 1);
        let callback: ObserverCallback = Rc::new(RefCell::new(callback));
        self.observers.borrow_mut().push(Observer { id, callback });
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|observer| observer.id != id);
        let removed = observers.len() != before;
        if !removed {
            warn!("event=observer_unsubscribe module=model status=noop");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    // --- mutation entry points ---

    /// Records that the aggregate at `identity` was replaced by a new revision.
    ///
    /// Runs inside a notification guard, so without an outer guard this
    /// flushes before returning.
    pub(crate) fn handle_modification(
        &self,
        identity: HandleIdentity,
        superseded: Rc<dyn AnyRevision>,
    ) {
        let _guard = self.notification_guard();
        if let Some(changeset) = self.current_changeset_handle() {
            if changeset.add_handle(identity) {
                changeset.record_original(identity, superseded);
            } else {
                trace!(
                    "event=modification_dedup module=model status=ok kind={}",
                    superseded.kind()
                );
            }
        }
        self.pending.set(true);
        self.pending_modifications
            .set(self.pending_modifications.get() + 1);
    }

    /// Appends a new, empty feature collection to the root store.
    pub fn create_feature_collection(
        &self,
        filename: Option<String>,
    ) -> ModelResult<Rc<FeatureCollection>> {
        let collection = FeatureCollection::new(filename);
        self.root.append(Rc::clone(&collection))?;
        Ok(collection)
    }

    /// Creates a feature with a freshly generated identifier in `collection`.
    pub fn create_feature(
        &self,
        feature_type: &str,
        collection: &Rc<FeatureCollection>,
    ) -> ModelResult<Rc<Feature>> {
        let feature_type = self.pools.names.feature_type(feature_type)?;
        let feature_id = self.pools.identifiers.create();
        let feature = Feature::new(feature_type, feature_id, &self.pools.identifiers);
        collection.append(Rc::clone(&feature))?;
        Ok(feature)
    }

    /// Creates a feature under an identifier read from an external source.
    pub fn create_feature_with_id(
        &self,
        feature_type: &str,
        feature_id: &str,
        collection: &Rc<FeatureCollection>,
    ) -> ModelResult<Rc<Feature>> {
        let feature_type = self.pools.names.feature_type(feature_type)?;
        let feature_id = self.pools.identifiers.insert(feature_id)?;
        let feature = Feature::new(feature_type, feature_id, &self.pools.identifiers);
        collection.append(Rc::clone(&feature))?;
        Ok(feature)
    }

    /// Live features registered under `identifier`. Never creates an entry.
    pub fn resolve(&self, identifier: &str) -> Vec<Rc<Feature>> {
        self.pools
            .identifiers
            .find(identifier)
            .map(|id| id.back_reference_targets::<Feature>())
            .unwrap_or_default()
    }

    fn flush_pending_notifications(&self) {
        if !self.pending.replace(false) {
            return;
        }
        let modifications = self.pending_modifications.replace(0);
        self.flush_count.set(self.flush_count.get() + 1);

        // Snapshot so observers may subscribe or unsubscribe while running.
        let snapshot: Vec<(ObserverId, ObserverCallback)> = self
            .observers
            .borrow()
            .iter()
            .map(|observer| (observer.id, Rc::clone(&observer.callback)))
            .collect();
        debug!(
            "event=notification_flush module=model status=ok modifications={} observers={}",
            modifications,
            snapshot.len()
        );
        for (id, callback) in snapshot {
            if !self.is_subscribed(id) {
                continue;
            }
            (&mut *callback.borrow_mut())(self);
        }
    }

    fn is_subscribed(&self, id: ObserverId) -> bool {
        self.observers
            .borrow()
            .iter()
            .any(|observer| observer.id == id)
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("pools", &self.pools)
            .field("root", &self.root)
            .field("current_changeset", &self.current_changeset.borrow())
            .field("guard_depth", &self.guard_depth.get())
            .field("pending", &self.pending.get())
            .field("flush_count", &self.flush_count.get())
            .finish()
    }
}

struct DepthRelease<'a>(&'a Cell<usize>);

impl Drop for DepthRelease<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// RAII notification guard: increments on creation, decrements on drop.
#[must_use = "dropping the guard immediately ends the guarded scope"]
pub struct NotificationGuard<'m> {
    model: &'m Model,
}

impl<'m> NotificationGuard<'m> {
    pub fn new(model: &'m Model) -> Self {
        model.increment_notification_guard();
        Self { model }
    }
}

impl Drop for NotificationGuard<'_> {
    fn drop(&mut self) {
        self.model.decrement_notification_guard();
    }
}

impl Debug for NotificationGuard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationGuard")
            .field("depth", &self.model.notification_guard_depth())
            .finish()
    }
}
