//! Interned identity strings shared across the object graph.
//!
//! # Responsibility
//! - Deduplicate names, type tags and identifiers into shared pools.
//! - Recover owning objects from an identifier through weak back-references.
//!
//! # Invariants
//! - Pools are single-threaded (`Rc`-based); no entry is ever shared across threads.
//! - Pools hold only weak links to their entries; handles own the entries.

pub mod identifier_pool;
pub mod qualified_name;
pub mod string_pool;

pub use identifier_pool::{
    BackReference, BackReferenceList, FeatureId, Identifier, IdentifierError, IdentifierPool,
    DEFAULT_IDENTIFIER_PREFIX,
};
pub use qualified_name::{
    split_qualified_name, AttributeName, FeatureType, NamePools, PropertyName, QualifiedName,
    QualifiedNameError,
};
pub use string_pool::{PoolHandle, StringPool};
