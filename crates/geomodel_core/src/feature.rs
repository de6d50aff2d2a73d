//! Features: typed, identified aggregates of top-level properties.
//!
//! # Responsibility
//! - Hold a feature's identity (type tag + identifier) and its revisioned
//!   property list.
//! - Stay discoverable through its identifier for as long as it is alive.
//!
//! # Invariants
//! - `feature_type` and `feature_id` never change after construction.
//! - Every property in the current revision is bound to this feature.
//! - Editing one property clones that property's revision and the feature's
//!   own revision only; all other property revisions stay shared.

use crate::changeset::HandleIdentity;
use crate::feature_collection::FeatureCollection;
use crate::model::{Model, ModelError, ModelResult};
use crate::pool::{BackReference, FeatureId, FeatureType, IdentifierPool, PropertyName};
use crate::property::{PropertyFields, PropertyValue, TopLevelProperty};
use crate::revision::{Revision, RevisionFields, Revisioned};
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Fields of a feature revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFields {
    pub properties: Vec<TopLevelProperty>,
}

impl RevisionFields for FeatureFields {
    type Context = FeatureCollection;
    const KIND: &'static str = "feature";
}

pub struct Feature {
    feature_type: FeatureType,
    feature_id: FeatureId,
    identity: HandleIdentity,
    revision: Revisioned<FeatureFields>,
    self_ref: Weak<Feature>,
    back_reference: BackReference,
}

impl Feature {
    /// Creates a detached feature registered under `feature_id`.
    pub fn new(
        feature_type: FeatureType,
        feature_id: FeatureId,
        identifiers: &IdentifierPool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| {
            let back_reference = identifiers.register_back_reference(&feature_id, self_ref.clone());
            Self {
                feature_type,
                feature_id,
                identity: HandleIdentity::allocate(),
                revision: Revisioned::new(Revision::new(FeatureFields::default(), None)),
                self_ref: self_ref.clone(),
                back_reference,
            }
        })
    }

    pub fn feature_type(&self) -> &FeatureType {
        &self.feature_type
    }

    pub fn feature_id(&self) -> &FeatureId {
        &self.feature_id
    }

    pub fn back_reference(&self) -> &BackReference {
        &self.back_reference
    }

    pub fn revision(&self) -> Rc<Revision<FeatureFields>> {
        self.revision.current()
    }

    pub fn identity(&self) -> HandleIdentity {
        self.identity
    }

    /// Collection holding this feature, if any.
    pub fn parent(&self) -> Option<Rc<FeatureCollection>> {
        self.revision.current().context()
    }

    pub fn model(&self) -> Option<Rc<Model>> {
        self.parent().and_then(|collection| collection.model())
    }

    pub fn properties(&self) -> Vec<TopLevelProperty> {
        self.revision.current().fields().properties.clone()
    }

    pub fn property_count(&self) -> usize {
        self.revision.current().fields().properties.len()
    }

    pub fn properties_named(&self, name: &PropertyName) -> Vec<TopLevelProperty> {
        self.revision
            .current()
            .fields()
            .properties
            .iter()
            .filter(|property| property.name() == name)
            .cloned()
            .collect()
    }

    /// All values of every property called `name`, in property order.
    pub fn property_values(&self, name: &PropertyName) -> Vec<Rc<dyn PropertyValue>> {
        self.properties_named(name)
            .iter()
            .flat_map(|property| property.values().iter().cloned())
            .collect()
    }

    /// Appends `property`, binding a copy of it to this feature.
    pub fn add_property(&self, property: TopLevelProperty) {
        let bound = property.bound_to(self.self_ref.clone());
        self.modify(|revision| revision.fields_mut().properties.push(bound));
    }

    /// Replaces every property called `property.name()` by `property`.
    pub fn set_property(&self, property: TopLevelProperty) {
        let bound = property.bound_to(self.self_ref.clone());
        self.modify(|revision| {
            let properties = &mut revision.fields_mut().properties;
            properties.retain(|existing| existing.name() != bound.name());
            properties.push(bound);
        });
    }

    /// Removes every property called `name`. Returns how many were removed.
    pub fn remove_properties(&self, name: &PropertyName) -> usize {
        let present = self
            .revision
            .current()
            .fields()
            .properties
            .iter()
            .filter(|property| property.name() == name)
            .count();
        if present == 0 {
            debug!("event=property_remove module=feature status=noop reason=not_present");
            return 0;
        }
        self.modify(|revision| {
            revision
                .fields_mut()
                .properties
                .retain(|property| property.name() != name)
        });
        present
    }

    /// Clone-and-replace edit of the property at `index`.
    pub fn modify_property(
        &self,
        index: usize,
        edit: impl FnOnce(&mut Revision<PropertyFields>),
    ) -> ModelResult<()> {
        self.try_modify(|revision| {
            let properties = &mut revision.fields_mut().properties;
            let len = properties.len();
            let slot = properties
                .get_mut(index)
                .ok_or(ModelError::PropertyOutOfRange { index, len })?;
            *slot = slot.modified(edit);
            Ok(())
        })
    }

    /// Clone-then-replace edit of this feature's revision.
    ///
    /// `edit` must not edit this feature again; the inner change would be
    /// overwritten by the outer one. Debug builds panic instead.
    pub fn modify<R>(&self, edit: impl FnOnce(&mut Revision<FeatureFields>) -> R) -> R {
        let (superseded, output) = self.revision.modify(edit);
        self.notify_modified(superseded);
        output
    }

    /// Fallible edit; on error the feature is left exactly as it was.
    ///
    /// Same re-entrancy rule as [`Feature::modify`].
    pub fn try_modify<R, E>(
        &self,
        edit: impl FnOnce(&mut Revision<FeatureFields>) -> Result<R, E>,
    ) -> Result<R, E> {
        let (superseded, output) = self.revision.try_modify(edit)?;
        self.notify_modified(superseded);
        Ok(output)
    }

    pub(crate) fn reparent(&self, collection: Option<Weak<FeatureCollection>>) {
        self.revision.reparent(collection);
    }

    fn notify_modified(&self, superseded: Rc<Revision<FeatureFields>>) {
        match self.model() {
            Some(model) => model.handle_modification(self.identity(), superseded),
            None => trace!("event=feature_modify module=feature status=ok attached=false"),
        }
    }
}

impl Debug for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("feature_type", &self.feature_type)
            .field("feature_id", &self.feature_id)
            .field("properties", &self.property_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use crate::model::ModelError;
    use crate::pool::{IdentifierPool, NamePools};
    use crate::property::{PlateId, TopLevelProperty, XsString};
    use std::rc::Rc;

    fn feature(names: &NamePools, ids: &IdentifierPool) -> Rc<Feature> {
        Feature::new(
            names.feature_type("gpml:Isochron").expect("valid type"),
            ids.create(),
            ids,
        )
    }

    #[test]
    fn added_properties_are_bound_to_the_feature() {
        let names = NamePools::new();
        let ids = IdentifierPool::new();
        let feature = feature(&names, &ids);
        let name = names.property_name("gml:name").expect("valid name");

        feature.add_property(TopLevelProperty::single(name.clone(), XsString("ridge".into())));

        let stored = feature.properties_named(&name);
        assert_eq!(stored.len(), 1);
        assert!(Rc::ptr_eq(&stored[0].owner().expect("bound"), &feature));
    }

    #[test]
    fn set_property_replaces_same_named_properties() {
        let names = NamePools::new();
        let ids = IdentifierPool::new();
        let feature = feature(&names, &ids);
        let plate = names
            .property_name("gpml:reconstructionPlateId")
            .expect("valid name");

        feature.add_property(TopLevelProperty::single(plate.clone(), PlateId(1)));
        feature.add_property(TopLevelProperty::single(plate.clone(), PlateId(2)));
        feature.set_property(TopLevelProperty::single(plate.clone(), PlateId(3)));

        let values = feature.property_values(&plate);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_any().downcast_ref::<PlateId>(), Some(&PlateId(3)));
        assert_eq!(feature.remove_properties(&plate), 1);
        assert_eq!(feature.remove_properties(&plate), 0);
    }

    #[test]
    fn modify_property_out_of_range_changes_nothing() {
        let names = NamePools::new();
        let ids = IdentifierPool::new();
        let feature = feature(&names, &ids);
        let before = feature.revision();

        let err = feature.modify_property(3, |_| {}).unwrap_err();

        assert_eq!(err, ModelError::PropertyOutOfRange { index: 3, len: 0 });
        assert!(Rc::ptr_eq(&before, &feature.revision()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "re-entrant edit")]
    fn nested_edit_of_the_same_feature_panics() {
        let names = NamePools::new();
        let ids = IdentifierPool::new();
        let feature = feature(&names, &ids);
        let name = names.property_name("gml:name").expect("valid name");

        feature.modify(|_| {
            feature.add_property(TopLevelProperty::single(name, XsString("lost".into())));
        });
    }
}
