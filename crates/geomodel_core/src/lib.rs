//! Core object model for geological feature data.
//!
//! Features, feature collections and the feature store are revisioned
//! aggregates owned by a [`Model`]. Names and identifiers are interned in
//! pools; edits are copy-on-write and grouped by changesets and notification
//! guards.

pub mod changeset;
pub mod feature;
pub mod feature_collection;
pub mod feature_store;
pub mod logging;
pub mod model;
pub mod pool;
pub mod property;
pub mod revision;
pub mod slots;

pub use changeset::{Changeset, ChangesetHandle, HandleIdentity};
pub use feature::{Feature, FeatureFields};
pub use feature_collection::{CollectionFields, FeatureCollection};
pub use feature_store::{FeatureStore, StoreFields};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::{Model, ModelError, ModelPools, ModelResult, NotificationGuard, ObserverId};
pub use pool::{
    AttributeName, BackReference, FeatureId, FeatureType, Identifier, IdentifierError,
    IdentifierPool, NamePools, PoolHandle, PropertyName, QualifiedName, QualifiedNameError,
    StringPool,
};
pub use property::{
    FeatureReference, PlateId, PropertyValue, TopLevelProperty, XsBoolean, XsDouble, XsInteger,
    XsString,
};
pub use revision::{AnyRevision, Revision, RevisionFields, Revisioned, XmlAttributes};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
