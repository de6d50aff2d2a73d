//! Root aggregate of a model: the loaded feature collections.
//!
//! # Invariants
//! - A collection sits in at most one store; its revision context is that store.
//! - Structural edits go through clone-then-replace of the store revision.

use crate::changeset::HandleIdentity;
use crate::feature::Feature;
use crate::feature_collection::FeatureCollection;
use crate::model::{Model, ModelError, ModelResult};
use crate::pool::FeatureId;
use crate::revision::{Revision, RevisionFields, Revisioned};
use crate::slots::Slots;
use log::{info, warn};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Fields of a feature store revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFields {
    pub collections: Slots<FeatureCollection>,
}

impl RevisionFields for StoreFields {
    type Context = Model;
    const KIND: &'static str = "feature_store";
}

pub struct FeatureStore {
    identity: HandleIdentity,
    revision: Revisioned<StoreFields>,
    self_ref: Weak<FeatureStore>,
}

impl FeatureStore {
    /// Creates an empty store whose revisions report `model` as context.
    pub fn new(model: Weak<Model>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            identity: HandleIdentity::allocate(),
            revision: Revisioned::new(Revision::new(StoreFields::default(), Some(model))),
            self_ref: self_ref.clone(),
        })
    }

    pub fn model(&self) -> Option<Rc<Model>> {
        self.revision.current().context()
    }

    pub fn revision(&self) -> Rc<Revision<StoreFields>> {
        self.revision.current()
    }

    pub fn identity(&self) -> HandleIdentity {
        self.identity
    }

    /// Adds `collection` and returns its slot index.
    pub fn append(&self, collection: Rc<FeatureCollection>) -> ModelResult<usize> {
        if collection.parent().is_some() {
            return Err(ModelError::CollectionAlreadyInStore);
        }
        let member = Rc::clone(&collection);
        let (superseded, index) = self
            .revision
            .modify(|revision| revision.fields_mut().collections.push(member));
        collection.reparent(Some(self.self_ref.clone()));
        info!(
            "event=collection_append module=feature_store status=ok slot={} features={}",
            index,
            collection.len()
        );
        self.notify_modified(superseded);
        Ok(index)
    }

    /// Empties slot `index`. An already-empty slot is a logged no-op.
    pub fn remove(&self, index: usize) -> ModelResult<Option<Rc<FeatureCollection>>> {
        let current = self.revision.current();
        let collections = &current.fields().collections;
        if index >= collections.slot_count() {
            return Err(ModelError::SlotOutOfRange {
                index,
                len: collections.slot_count(),
            });
        }
        if !collections.is_occupied(index) {
            warn!(
                "event=slot_remove module=feature_store status=noop slot={} reason=already_empty",
                index
            );
            return Ok(None);
        }

        let (superseded, removed) = self
            .revision
            .modify(|revision| revision.fields_mut().collections.take(index));
        if let Some(collection) = &removed {
            collection.reparent(None);
        }
        info!(
            "event=collection_remove module=feature_store status=ok slot={}",
            index
        );
        self.notify_modified(superseded);
        Ok(removed)
    }

    /// Removes `collection` by identity. Returns `false` if it is not here.
    pub fn remove_collection(&self, collection: &Rc<FeatureCollection>) -> bool {
        let position = self.revision.current().fields().collections.position(collection);
        match position {
            Some(index) => matches!(self.remove(index), Ok(Some(_))),
            None => {
                warn!("event=collection_remove module=feature_store status=noop reason=not_member");
                false
            }
        }
    }

    pub fn collections(&self) -> Vec<Rc<FeatureCollection>> {
        self.revision
            .current()
            .fields()
            .collections
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.revision.current().fields().collections.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First feature with `feature_id` in any collection of this store.
    pub fn find_feature(&self, feature_id: &FeatureId) -> Option<Rc<Feature>> {
        self.collections()
            .iter()
            .find_map(|collection| collection.find(feature_id))
    }

    fn notify_modified(&self, superseded: Rc<Revision<StoreFields>>) {
        if let Some(model) = self.model() {
            model.handle_modification(self.identity(), superseded);
        }
    }
}

impl Debug for FeatureStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("collections", &self.len())
            .finish()
    }
}
