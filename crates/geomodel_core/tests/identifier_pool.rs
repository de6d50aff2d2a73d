use geomodel_core::{
    BackReference, FeatureReference, Identifier, IdentifierError, IdentifierPool, Model,
    ModelPools,
};
use std::rc::Rc;

#[derive(Debug, PartialEq)]
struct Owner(&'static str);

fn names(owners: &[Rc<Owner>]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = owners.iter().map(|owner| owner.0).collect();
    names.sort_unstable();
    names
}

#[test]
fn back_references_track_registered_owners() {
    let pool = IdentifierPool::new();
    let id = pool.insert("F1").expect("valid identifier");
    let o1 = Rc::new(Owner("o1"));
    let o2 = Rc::new(Owner("o2"));
    let o3 = Rc::new(Owner("o3"));

    let _r1 = pool.register_back_reference(&id, Rc::downgrade(&o1));
    let r2 = pool.register_back_reference(&id, Rc::downgrade(&o2));
    let _r3 = pool.register_back_reference(&id, Rc::downgrade(&o3));

    assert_eq!(
        names(&pool.find_back_reference_targets::<Owner>(&id)),
        vec!["o1", "o2", "o3"]
    );

    drop(r2);
    assert_eq!(
        names(&pool.find_back_reference_targets::<Owner>(&id)),
        vec!["o1", "o3"]
    );
    assert_eq!(id.back_reference_count(), 2);
}

#[test]
fn destroyed_owner_is_not_returned() {
    let pool = IdentifierPool::new();
    let id = pool.insert("F2").expect("valid identifier");
    let kept = Rc::new(Owner("kept"));
    let gone = Rc::new(Owner("gone"));
    let _kept_ref = pool.register_back_reference(&id, Rc::downgrade(&kept));
    let _gone_ref = pool.register_back_reference(&id, Rc::downgrade(&gone));

    drop(gone);

    assert_eq!(
        names(&pool.find_back_reference_targets::<Owner>(&id)),
        vec!["kept"]
    );
}

#[test]
fn targets_are_filtered_by_owner_type() {
    let pool = IdentifierPool::new();
    let id = pool.insert("F3").expect("valid identifier");
    let owner = Rc::new(Owner("typed"));
    let other = Rc::new(42_u32);
    let _owner_ref = pool.register_back_reference(&id, Rc::downgrade(&owner));
    let _other_ref = pool.register_back_reference(&id, Rc::downgrade(&other));

    assert_eq!(pool.find_back_reference_targets::<Owner>(&id).len(), 1);
    assert_eq!(*pool.find_back_reference_targets::<u32>(&id)[0], 42);
    assert!(pool.find_back_reference_targets::<String>(&id).is_empty());
}

#[test]
fn pool_entry_outlives_back_references_until_last_handle() {
    let pool = IdentifierPool::new();
    let id = pool.insert("F1").expect("valid identifier");
    let feature = Rc::new(Owner("feature@1"));
    let registration: BackReference = pool.register_back_reference(&id, Rc::downgrade(&feature));

    let found = pool
        .find("F1")
        .map(|id| pool.find_back_reference_targets::<Owner>(&id))
        .unwrap_or_default();
    assert_eq!(names(&found), vec!["feature@1"]);
    drop(found);

    drop(registration);
    let found = pool
        .find("F1")
        .map(|id| pool.find_back_reference_targets::<Owner>(&id))
        .unwrap_or_default();
    assert!(found.is_empty());
    assert!(pool.is_loaded("F1"));

    drop(id);
    assert!(!pool.is_loaded("F1"));
    assert_eq!(pool.size(), 0);
    drop(feature);
}

#[test]
fn created_identifiers_are_unique_and_prefixed() {
    let pool = IdentifierPool::with_prefix("GPlates-");
    let ids: Vec<_> = (0..64).map(|_| pool.create()).collect();

    assert_eq!(pool.size(), 64);
    assert!(ids
        .iter()
        .all(|id| id.text().is_some_and(|text| text.starts_with("GPlates-"))));
}

#[test]
fn external_identifiers_are_validated() {
    let pool = IdentifierPool::new();

    assert_eq!(pool.insert("").unwrap_err(), IdentifierError::Empty);
    assert!(matches!(
        pool.insert("has space").unwrap_err(),
        IdentifierError::InvalidCharacters(_)
    ));
    assert_eq!(pool.size(), 0);
}

#[test]
#[should_panic(expected = "another pool")]
fn registering_against_a_foreign_identifier_panics() {
    let first = IdentifierPool::new();
    let second = IdentifierPool::new();
    let id = first.insert("F9").expect("valid identifier");
    let owner = Rc::new(Owner("stray"));

    let _registration = second.register_back_reference(&id, Rc::downgrade(&owner));
}

#[test]
fn model_resolve_follows_feature_lifetime() {
    let model = Model::new(ModelPools::new());
    let collection = model
        .create_feature_collection(None)
        .expect("collection appended");
    let feature = model
        .create_feature_with_id("gpml:Isochron", "F1", &collection)
        .expect("feature created");

    let resolved = model.resolve("F1");
    assert_eq!(resolved.len(), 1);
    assert!(Rc::ptr_eq(&resolved[0], &feature));
    drop(resolved);

    let held_id = feature.feature_id().clone();
    assert!(collection.remove_feature(&feature));
    drop(feature);

    assert!(model.resolve("F1").is_empty());
    assert!(model.identifiers().is_loaded("F1"));
    drop(held_id);
    assert!(!model.identifiers().is_loaded("F1"));
}

#[test]
fn identifiers_serialize_as_their_text() {
    let pool = IdentifierPool::new();
    let id = pool.insert("GM-ridge-7").expect("valid identifier");
    let reference = FeatureReference::new(id.clone());

    assert_eq!(
        serde_json::to_value(&id).expect("serializable"),
        serde_json::json!("GM-ridge-7")
    );
    assert_eq!(
        serde_json::to_value(&reference.target).expect("serializable"),
        serde_json::json!("GM-ridge-7")
    );
    assert_eq!(
        serde_json::to_value(Identifier::default()).expect("serializable"),
        serde_json::json!("")
    );
}
