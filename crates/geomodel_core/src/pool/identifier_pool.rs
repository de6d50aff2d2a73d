//! Generated identifiers with weak back-references to their owners.
//!
//! # Responsibility
//! - Generate globally unique identifier text and intern it.
//! - Let owning objects register themselves against an identifier so that
//!   the identifier alone is enough to recover every live owner.
//!
//! # Invariants
//! - Back-references never extend an owner's lifetime; the list holds weak
//!   links only.
//! - The registrations attached to an entry are exactly those whose
//!   `BackReference` guard is still alive. Dropping the guard detaches it.
//! - A `BackReference` holds an identifier handle, so the entry it is
//!   registered on cannot be evicted underneath it.

use crate::pool::string_pool::{PoolHandle, StringPool};
use log::{debug, trace};
use serde::{Serialize, Serializer};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Prefix used by `IdentifierPool::create` unless overridden.
pub const DEFAULT_IDENTIFIER_PREFIX: &str = "GM-";

/// Errors for identifiers loaded from external text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    InvalidCharacters(String),
}

impl Display for IdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "identifier must not be empty"),
            Self::InvalidCharacters(value) => {
                write!(f, "identifier contains whitespace or control characters: {value:?}")
            }
        }
    }
}

impl Error for IdentifierError {}

struct BackReferenceNode {
    node_id: u64,
    owner_type: TypeId,
    target: Weak<dyn Any>,
}

/// Per-entry list of registered owners, in registration order.
#[derive(Default)]
pub struct BackReferenceList {
    nodes: RefCell<Vec<BackReferenceNode>>,
    next_node_id: Cell<u64>,
}

impl BackReferenceList {
    fn attach(&self, owner_type: TypeId, target: Weak<dyn Any>) -> u64 {
        let node_id = self.next_node_id.get();
        self.next_node_id.set(node_id + 1);
        self.nodes.borrow_mut().push(BackReferenceNode {
            node_id,
            owner_type,
            target,
        });
        node_id
    }

    fn detach(&self, node_id: u64) {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|node| node.node_id != node_id);
        debug_assert_eq!(before, nodes.len() + 1, "back-reference node detached twice");
    }

    fn targets_of(&self, owner_type: TypeId) -> Vec<Rc<dyn Any>> {
        self.nodes
            .borrow()
            .iter()
            .filter(|node| node.owner_type == owner_type)
            .filter_map(|node| node.target.upgrade())
            .collect()
    }

    fn len(&self) -> usize {
        self.nodes.borrow().len()
    }
}

/// Handle to an identifier entry.
///
/// Cheap to clone; equality is entry identity, so two identifiers loaded
/// from the same text in the same pool are equal.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(PoolHandle<BackReferenceList>);

/// Identifiers naming features.
pub type FeatureId = Identifier;

impl Identifier {
    pub fn text(&self) -> Option<&str> {
        self.0.text()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Handles currently sharing the entry. Back-reference guards count too.
    pub fn ref_count(&self) -> usize {
        self.0.ref_count()
    }

    /// Number of registrations attached to this identifier, across all owner types.
    pub fn back_reference_count(&self) -> usize {
        self.0.payload().map_or(0, BackReferenceList::len)
    }

    /// Live owners of type `O` registered against this identifier.
    pub fn back_reference_targets<O: Any>(&self) -> Vec<Rc<O>> {
        let Some(list) = self.0.payload() else {
            return Vec::new();
        };
        // Upgrade under the list borrow, downcast after releasing it.
        list.targets_of(TypeId::of::<O>())
            .into_iter()
            .filter_map(|target| target.downcast::<O>().ok())
            .collect()
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.text() {
            Some(text) => write!(f, "Identifier({text})"),
            None => write!(f, "Identifier(<empty>)"),
        }
    }
}

/// Serializes as the identifier text; an empty handle becomes `""`.
impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.text().unwrap_or_default())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text().unwrap_or(""))
    }
}

/// Registration guard returned by `IdentifierPool::register_back_reference`.
///
/// Owners keep this alive for as long as they want to be discoverable.
pub struct BackReference {
    identifier: Identifier,
    node_id: u64,
}

impl BackReference {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

impl Drop for BackReference {
    fn drop(&mut self) {
        if let Some(list) = self.identifier.0.payload() {
            list.detach(self.node_id);
            trace!(
                "event=back_reference_detached module=identifier_pool status=ok remaining={}",
                list.len()
            );
        }
    }
}

impl Debug for BackReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackReference")
            .field("identifier", &self.identifier)
            .field("node_id", &self.node_id)
            .finish()
    }
}

/// String pool specialised for generated identifiers.
pub struct IdentifierPool {
    pool: StringPool<BackReferenceList>,
    prefix: String,
}

impl IdentifierPool {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_IDENTIFIER_PREFIX)
    }

    /// Creates a pool whose generated identifiers start with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            pool: StringPool::new("identifiers"),
            prefix: prefix.into(),
        }
    }

    /// Generates a new unique identifier and interns it.
    ///
    /// Uniqueness comes from the v4 UUID generator; the pool never retries.
    pub fn create(&self) -> Identifier {
        let text = format!("{}{}", self.prefix, Uuid::new_v4());
        debug_assert!(!self.pool.contains(&text), "generated identifier collided");
        Identifier(self.pool.insert(&text))
    }

    /// Interns an identifier read from an external source.
    pub fn insert(&self, text: &str) -> Result<Identifier, IdentifierError> {
        validate_identifier_text(text)?;
        Ok(Identifier(self.pool.insert(text)))
    }

    /// Returns whether `text` currently names a live identifier.
    pub fn is_loaded(&self, text: &str) -> bool {
        self.pool.contains(text)
    }

    /// Returns the live identifier for `text` without creating one.
    pub fn find(&self, text: &str) -> Option<Identifier> {
        self.pool.find(text).map(Identifier)
    }

    pub fn size(&self) -> usize {
        self.pool.size()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers `owner` as discoverable through `identifier`.
    ///
    /// # Panics
    /// Panics when `identifier` is empty or belongs to another pool.
    pub fn register_back_reference<O: Any>(
        &self,
        identifier: &Identifier,
        owner: Weak<O>,
    ) -> BackReference {
        assert!(
            self.pool.owns(&identifier.0),
            "back-reference registered against an identifier from another pool"
        );
        let Some(list) = identifier.0.payload() else {
            unreachable!("owned identifier handles are never empty");
        };
        let target: Weak<dyn Any> = owner;
        let node_id = list.attach(TypeId::of::<O>(), target);
        debug!(
            "event=back_reference_registered module=identifier_pool status=ok owner_type={} registrations={}",
            std::any::type_name::<O>(),
            list.len()
        );
        BackReference {
            identifier: identifier.clone(),
            node_id,
        }
    }

    /// Live owners of type `O` registered against `identifier`, in list order.
    pub fn find_back_reference_targets<O: Any>(&self, identifier: &Identifier) -> Vec<Rc<O>> {
        identifier.back_reference_targets::<O>()
    }
}

impl Default for IdentifierPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for IdentifierPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierPool")
            .field("prefix", &self.prefix)
            .field("size", &self.size())
            .finish()
    }
}

fn validate_identifier_text(text: &str) -> Result<(), IdentifierError> {
    if text.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if text.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(IdentifierError::InvalidCharacters(text.to_string()));
    }
    Ok(())
}
