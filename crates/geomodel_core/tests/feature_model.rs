use geomodel_core::{
    FeatureCollection, FeatureReference, Model, ModelError, ModelPools, PlateId,
    QualifiedNameError, TopLevelProperty, XmlAttributes, XsBoolean, XsDouble, XsString,
};
use std::rc::Rc;

#[test]
fn graph_context_chain_reaches_the_model() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(Some("isochrons.gpml".to_string()))
        .expect("collection appended");
    let feature = model
        .create_feature("gpml:Isochron", &collection)
        .expect("feature created");
    let name = model.names().property_name("gml:name").expect("valid name");
    feature.add_property(TopLevelProperty::single(name.clone(), XsString("anomaly 34".into())));

    let property = &feature.properties_named(&name)[0];
    let owner = property.owner().expect("bound to feature");
    let parent = owner.parent().expect("in collection");
    let store = parent.parent().expect("in store");
    let reached = store.model().expect("store knows model");

    assert!(Rc::ptr_eq(&owner, &feature));
    assert!(Rc::ptr_eq(&parent, &collection));
    assert!(Rc::ptr_eq(&store, model.root()));
    assert!(Rc::ptr_eq(&reached, &model));
    assert_eq!(collection.filename().as_deref(), Some("isochrons.gpml"));
}

#[test]
fn feature_references_resolve_through_identifiers() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let ridge = model
        .create_feature_with_id("gpml:MidOceanRidge", "GM-ridge-1", &collection)
        .expect("ridge created");
    let isochron = model
        .create_feature("gpml:Isochron", &collection)
        .expect("isochron created");
    let conjugate = model
        .names()
        .property_name("gpml:conjugate")
        .expect("valid name");

    isochron.add_property(TopLevelProperty::single(
        conjugate.clone(),
        FeatureReference::new(ridge.feature_id().clone()),
    ));

    let reference = isochron.properties_named(&conjugate)[0]
        .value_as::<FeatureReference>()
        .cloned()
        .expect("reference value");
    let targets = reference.resolve();
    assert_eq!(targets.len(), 1);
    assert!(Rc::ptr_eq(&targets[0], &ridge));

    assert!(collection.remove_feature(&ridge));
    drop(ridge);
    drop(targets);
    assert!(reference.resolve().is_empty());
    assert!(model.identifiers().is_loaded("GM-ridge-1"));
}

#[test]
fn features_sharing_an_identifier_all_resolve() {
    let model = Model::new(ModelPools::new());
    let present_day = model
        .create_feature_collection(Some("present.gpml".to_string()))
        .expect("collection appended");
    let reconstructed = model
        .create_feature_collection(Some("reconstructed.gpml".to_string()))
        .expect("collection appended");
    let first = model
        .create_feature_with_id("gpml:Coastline", "GM-shared", &present_day)
        .expect("first created");
    let second = model
        .create_feature_with_id("gpml:Coastline", "GM-shared", &reconstructed)
        .expect("second created");

    assert_eq!(first.feature_id(), second.feature_id());
    assert_eq!(model.resolve("GM-shared").len(), 2);
    assert_eq!(model.identifiers().size(), 1);

    drop(reconstructed.remove(0).expect("slot in range"));
    drop(second);
    let remaining = model.resolve("GM-shared");
    assert_eq!(remaining.len(), 1);
    assert!(Rc::ptr_eq(&remaining[0], &first));
}

#[test]
fn removing_an_empty_slot_is_a_noop() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let feature = model
        .create_feature("gpml:Isochron", &collection)
        .expect("feature created");

    let removed = collection.remove(0).expect("slot in range");
    assert!(removed.is_some_and(|removed| Rc::ptr_eq(&removed, &feature)));
    let flushes = model.flush_count();

    assert!(collection.remove(0).expect("slot in range").is_none());
    assert!(!collection.remove_feature(&feature));
    assert_eq!(model.flush_count(), flushes);
    assert_eq!(collection.slot_count(), 1);
    assert!(collection.is_empty());
}

#[test]
fn store_removal_detaches_collection() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let feature = model
        .create_feature("gpml:Isochron", &collection)
        .expect("feature created");

    assert!(model.root().remove_collection(&collection));
    assert!(collection.parent().is_none());
    assert!(feature.model().is_none());
    assert!(model.root().is_empty());
    assert!(!model.root().remove_collection(&collection));
    assert_eq!(
        model.root().remove(5).unwrap_err(),
        ModelError::SlotOutOfRange { index: 5, len: 1 }
    );

    assert_eq!(model.root().append(Rc::clone(&collection)).expect("re-append"), 1);
    assert!(model.root().find_feature(feature.feature_id()).is_some());
}

#[test]
fn membership_is_exclusive() {
    let model = Model::new(ModelPools::new());
    let first = model
        .create_feature_collection(None)
        .expect("collection appended");
    let second = FeatureCollection::new(None);
    let feature = model
        .create_feature("gpml:Isochron", &first)
        .expect("feature created");

    assert!(matches!(
        second.append(Rc::clone(&feature)),
        Err(ModelError::FeatureAlreadyInCollection(_))
    ));
    assert_eq!(
        model.root().append(Rc::clone(&first)).unwrap_err(),
        ModelError::CollectionAlreadyInStore
    );
    assert!(second.is_empty());
}

#[test]
fn invalid_names_are_rejected_before_any_edit() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let revision = collection.revision();

    let err = model
        .create_feature("Isochron", &collection)
        .expect_err("missing alias");
    assert!(matches!(
        err,
        ModelError::Name(QualifiedNameError::InvalidSyntax(_))
    ));
    assert!(err.to_string().contains("Isochron"));

    let err = model
        .create_feature_with_id("gpml:Isochron", "two words", &collection)
        .expect_err("invalid identifier");
    assert!(matches!(err, ModelError::Identifier(_)));
    assert!(Rc::ptr_eq(&revision, &collection.revision()));
}

#[test]
fn property_values_and_attributes_are_readable() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let feature = model
        .create_feature("gpml:Isochron", &collection)
        .expect("feature created");
    let names = model.names();
    let plate = names
        .property_name("gpml:reconstructionPlateId")
        .expect("valid name");
    let age = names.property_name("gpml:age").expect("valid name");
    let active = names.property_name("gpml:active").expect("valid name");
    let mut attributes = XmlAttributes::new();
    attributes.insert(
        names.attribute_name("gml:units").expect("valid name"),
        "Ma".to_string(),
    );

    feature.add_property(TopLevelProperty::single(plate.clone(), PlateId(801)));
    feature.add_property(TopLevelProperty::with_attributes(
        age.clone(),
        vec![Rc::new(XsDouble(83.5))],
        attributes,
    ));
    feature.add_property(TopLevelProperty::single(active.clone(), XsBoolean(true)));

    assert_eq!(feature.property_count(), 3);
    let age_property = &feature.properties_named(&age)[0];
    assert_eq!(age_property.value_as::<XsDouble>(), Some(&XsDouble(83.5)));
    assert_eq!(age_property.attributes().len(), 1);
    assert_eq!(
        feature.property_values(&plate)[0]
            .as_any()
            .downcast_ref::<PlateId>(),
        Some(&PlateId(801))
    );
    assert_eq!(feature.remove_properties(&active), 1);
    assert_eq!(feature.property_count(), 2);
}
