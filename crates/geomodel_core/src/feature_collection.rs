//! Feature collections: slot lists of features loaded from one source.
//!
//! # Responsibility
//! - Own feature membership with index-stable slots.
//! - Re-parent features on append/remove so each feature knows its collection.
//!
//! # Invariants
//! - A feature sits in at most one collection; its revision context is that
//!   collection.
//! - Removing an already-empty slot is a logged no-op, not an error.
//! - Every structural edit replaces the collection revision; the previous one
//!   is handed to the model as the superseded state.

use crate::changeset::HandleIdentity;
use crate::feature::Feature;
use crate::feature_store::FeatureStore;
use crate::model::{Model, ModelError, ModelResult};
use crate::pool::FeatureId;
use crate::revision::{Revision, RevisionFields, Revisioned};
use crate::slots::Slots;
use log::{debug, warn};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Fields of a feature collection revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionFields {
    /// Source file name, when the collection was loaded from or saved to one.
    pub filename: Option<String>,
    pub features: Slots<Feature>,
}

impl RevisionFields for CollectionFields {
    type Context = FeatureStore;
    const KIND: &'static str = "feature_collection";
}

pub struct FeatureCollection {
    identity: HandleIdentity,
    revision: Revisioned<CollectionFields>,
    self_ref: Weak<FeatureCollection>,
}

impl FeatureCollection {
    /// Creates an empty collection that is not yet part of any store.
    pub fn new(filename: Option<String>) -> Rc<Self> {
        let fields = CollectionFields {
            filename,
            features: Slots::new(),
        };
        Rc::new_cyclic(|self_ref| Self {
            identity: HandleIdentity::allocate(),
            revision: Revisioned::new(Revision::new(fields, None)),
            self_ref: self_ref.clone(),
        })
    }

    pub fn filename(&self) -> Option<String> {
        self.revision.current().fields().filename.clone()
    }

    pub fn set_filename(&self, filename: Option<String>) {
        let (superseded, ()) = self
            .revision
            .modify(|revision| revision.fields_mut().filename = filename);
        self.notify_modified(superseded);
    }

    /// Store holding this collection, if any.
    pub fn parent(&self) -> Option<Rc<FeatureStore>> {
        self.revision.current().context()
    }

    pub fn model(&self) -> Option<Rc<Model>> {
        self.parent().and_then(|store| store.model())
    }

    pub fn revision(&self) -> Rc<Revision<CollectionFields>> {
        self.revision.current()
    }

    pub fn identity(&self) -> HandleIdentity {
        self.identity
    }

    /// Adds `feature` and returns its slot index.
    pub fn append(&self, feature: Rc<Feature>) -> ModelResult<usize> {
        if feature.parent().is_some() {
            return Err(ModelError::FeatureAlreadyInCollection(
                feature.feature_id().clone(),
            ));
        }
        let member = Rc::clone(&feature);
        let (superseded, index) = self
            .revision
            .modify(|revision| revision.fields_mut().features.push(member));
        feature.reparent(Some(self.self_ref.clone()));
        debug!(
            "event=feature_append module=feature_collection status=ok slot={}",
            index
        );
        self.notify_modified(superseded);
        Ok(index)
    }

    /// Empties slot `index`. An already-empty slot is a logged no-op.
    pub fn remove(&self, index: usize) -> ModelResult<Option<Rc<Feature>>> {
        let current = self.revision.current();
        let features = &current.fields().features;
        if index >= features.slot_count() {
            return Err(ModelError::SlotOutOfRange {
                index,
                len: features.slot_count(),
            });
        }
        if !features.is_occupied(index) {
            warn!(
                "event=slot_remove module=feature_collection status=noop slot={} reason=already_empty",
                index
            );
            return Ok(None);
        }

        let (superseded, removed) = self
            .revision
            .modify(|revision| revision.fields_mut().features.take(index));
        if let Some(feature) = &removed {
            feature.reparent(None);
        }
        debug!(
            "event=feature_remove module=feature_collection status=ok slot={}",
            index
        );
        self.notify_modified(superseded);
        Ok(removed)
    }

    /// Removes `feature` by identity. Returns `false` if it is not a member.
    pub fn remove_feature(&self, feature: &Rc<Feature>) -> bool {
        let position = self.revision.current().fields().features.position(feature);
        match position {
            Some(index) => matches!(self.remove(index), Ok(Some(_))),
            None => {
                warn!("event=feature_remove module=feature_collection status=noop reason=not_member");
                false
            }
        }
    }

    /// Member in slot `index`, if occupied.
    pub fn get(&self, index: usize) -> Option<Rc<Feature>> {
        self.revision.current().fields().features.get(index).cloned()
    }

    /// Live members in slot order.
    pub fn features(&self) -> Vec<Rc<Feature>> {
        self.revision
            .current()
            .fields()
            .features
            .iter()
            .cloned()
            .collect()
    }

    /// Member whose identifier equals `feature_id`.
    pub fn find(&self, feature_id: &FeatureId) -> Option<Rc<Feature>> {
        self.revision
            .current()
            .fields()
            .features
            .iter()
            .find(|feature| feature.feature_id() == feature_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.revision.current().fields().features.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot_count(&self) -> usize {
        self.revision.current().fields().features.slot_count()
    }

    pub(crate) fn reparent(&self, store: Option<Weak<FeatureStore>>) {
        self.revision.reparent(store);
    }

    fn notify_modified(&self, superseded: Rc<Revision<CollectionFields>>) {
        if let Some(model) = self.model() {
            model.handle_modification(self.identity(), superseded);
        }
    }
}

impl Debug for FeatureCollection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("filename", &self.filename())
            .field("features", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureCollection;
    use crate::feature::Feature;
    use crate::model::ModelError;
    use crate::pool::{IdentifierPool, NamePools};
    use std::rc::Rc;

    #[test]
    fn detached_collection_tracks_membership() {
        let names = NamePools::new();
        let ids = IdentifierPool::new();
        let collection = FeatureCollection::new(Some("coastlines.gpml".to_string()));
        let feature = Feature::new(
            names.feature_type("gpml:Coastline").expect("valid type"),
            ids.create(),
            &ids,
        );

        let slot = collection.append(Rc::clone(&feature)).expect("append");
        assert!(Rc::ptr_eq(&feature.parent().expect("parent"), &collection));
        assert_eq!(
            collection.append(Rc::clone(&feature)).unwrap_err(),
            ModelError::FeatureAlreadyInCollection(feature.feature_id().clone())
        );

        let removed = collection.remove(slot).expect("remove").expect("occupied");
        assert!(Rc::ptr_eq(&removed, &feature));
        assert!(feature.parent().is_none());
        assert!(collection.remove(slot).expect("empty slot").is_none());
        assert_eq!(
            collection.remove(9).unwrap_err(),
            ModelError::SlotOutOfRange { index: 9, len: 1 }
        );
    }
}
