//! Top-level properties and the opaque values they carry.
//!
//! # Responsibility
//! - Store property values without interpreting them (geometry, time
//!   periods and other payloads are owned here but defined elsewhere).
//! - Provide the nested revision kind shared between feature revisions.
//!
//! # Invariants
//! - A `TopLevelProperty` is an immutable snapshot; "editing" one produces a
//!   new snapshot and leaves the old one intact for its other holders.
//! - Values compare by concrete type and `PartialEq`; different types never match.

use crate::feature::Feature;
use crate::pool::{FeatureId, PropertyName};
use crate::revision::{Revision, RevisionFields, XmlAttributes};
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Opaque payload stored in a property.
///
/// Implemented for every `Any + Debug + PartialEq` type, so callers define
/// their own value types without touching this crate.
pub trait PropertyValue: Any + Debug {
    fn as_any(&self) -> &dyn Any;

    fn value_eq(&self, other: &dyn PropertyValue) -> bool;

    fn type_name(&self) -> &'static str;
}

impl<T: Any + Debug + PartialEq> PropertyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_eq(&self, other: &dyn PropertyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// `xs:string`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsString(pub String);

/// `xs:boolean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XsBoolean(pub bool);

/// `xs:integer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XsInteger(pub i64);

/// `xs:double`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XsDouble(pub f64);

/// Tectonic plate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlateId(pub u64);

/// Delegate value that points at another feature by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureReference {
    pub target: FeatureId,
}

impl FeatureReference {
    pub fn new(target: FeatureId) -> Self {
        Self { target }
    }

    /// Live features currently registered under the target identifier.
    pub fn resolve(&self) -> Vec<Rc<Feature>> {
        self.target.back_reference_targets::<Feature>()
    }
}

/// Fields of one top-level property revision.
#[derive(Clone)]
pub struct PropertyFields {
    pub name: PropertyName,
    pub values: Vec<Rc<dyn PropertyValue>>,
}

impl PartialEq for PropertyFields {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| Rc::ptr_eq(left, right) || left.value_eq(right.as_ref()))
    }
}

impl Debug for PropertyFields {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyFields")
            .field("name", &self.name)
            .field("values", &self.values)
            .finish()
    }
}

impl RevisionFields for PropertyFields {
    type Context = Feature;
    const KIND: &'static str = "top_level_property";
}

/// A named property of a feature: an immutable, shareable revision.
#[derive(Clone)]
pub struct TopLevelProperty(Rc<Revision<PropertyFields>>);

impl TopLevelProperty {
    /// Creates an unattached property holding `values`.
    pub fn new(name: PropertyName, values: Vec<Rc<dyn PropertyValue>>) -> Self {
        Self(Rc::new(Revision::new(PropertyFields { name, values }, None)))
    }

    /// Creates an unattached property holding one value.
    pub fn single(name: PropertyName, value: impl PropertyValue) -> Self {
        Self::new(name, vec![Rc::new(value)])
    }

    pub fn with_attributes(name: PropertyName, values: Vec<Rc<dyn PropertyValue>>, attributes: XmlAttributes) -> Self {
        Self(Rc::new(
            Revision::new(PropertyFields { name, values }, None).with_attributes(attributes),
        ))
    }

    pub fn name(&self) -> &PropertyName {
        &self.0.fields().name
    }

    pub fn values(&self) -> &[Rc<dyn PropertyValue>] {
        &self.0.fields().values
    }

    /// First value downcast to `T`, if it has that type.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.values()
            .iter()
            .find_map(|value| value.as_any().downcast_ref::<T>())
    }

    pub fn attributes(&self) -> &XmlAttributes {
        self.0.attributes()
    }

    pub fn revision(&self) -> &Rc<Revision<PropertyFields>> {
        &self.0
    }

    /// The feature this property snapshot was bound to, if still alive.
    pub fn owner(&self) -> Option<Rc<Feature>> {
        self.0.context()
    }

    /// Returns whether both hold the very same revision.
    pub fn same_revision(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Clone-then-edit: returns a new snapshot, this one is unchanged.
    pub fn modified(&self, edit: impl FnOnce(&mut Revision<PropertyFields>)) -> Self {
        let mut next = self.0.clone_in_place();
        edit(&mut next);
        Self(Rc::new(next))
    }

    /// New snapshot with `values` replacing the current ones.
    pub fn with_values(&self, values: Vec<Rc<dyn PropertyValue>>) -> Self {
        self.modified(|revision| revision.fields_mut().values = values)
    }

    pub(crate) fn bound_to(&self, owner: Weak<Feature>) -> Self {
        Self(Rc::new(self.0.clone_revision(Some(owner))))
    }
}

impl PartialEq for TopLevelProperty {
    fn eq(&self, other: &Self) -> bool {
        self.same_revision(other) || self.0.equals(&other.0)
    }
}

impl Debug for TopLevelProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopLevelProperty")
            .field("name", self.name())
            .field("values", &self.values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{PlateId, PropertyValue, TopLevelProperty, XsDouble, XsString};
    use crate::pool::NamePools;
    use std::rc::Rc;

    #[test]
    fn values_compare_by_type_and_content() {
        let a: Rc<dyn PropertyValue> = Rc::new(PlateId(701));
        let b: Rc<dyn PropertyValue> = Rc::new(PlateId(701));
        let c: Rc<dyn PropertyValue> = Rc::new(XsDouble(701.0));

        assert!(a.value_eq(b.as_ref()));
        assert!(!a.value_eq(c.as_ref()));
    }

    #[test]
    fn modified_produces_new_snapshot() {
        let names = NamePools::new();
        let name = names.property_name("gml:name").expect("valid name");
        let original = TopLevelProperty::single(name, XsString("Africa".to_string()));
        let renamed = original.with_values(vec![Rc::new(XsString("Nubia".to_string()))]);

        assert!(!renamed.same_revision(&original));
        assert_ne!(renamed, original);
        assert_eq!(
            original.value_as::<XsString>(),
            Some(&XsString("Africa".to_string()))
        );
        assert_eq!(
            renamed.value_as::<XsString>(),
            Some(&XsString("Nubia".to_string()))
        );
    }

    #[test]
    fn structurally_equal_properties_are_equal() {
        let names = NamePools::new();
        let first = TopLevelProperty::single(
            names.property_name("gpml:reconstructionPlateId").expect("valid name"),
            PlateId(801),
        );
        let second = TopLevelProperty::single(
            names.property_name("gpml:reconstructionPlateId").expect("valid name"),
            PlateId(801),
        );
        assert_eq!(first, second);
        assert!(first.owner().is_none());
    }
}
