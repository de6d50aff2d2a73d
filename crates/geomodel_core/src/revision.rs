//! Copy-on-write snapshots of aggregate state.
//!
//! # Responsibility
//! - Hold the mutable attributes of one aggregate as an immutable, shared snapshot.
//! - Implement edits as clone-then-replace so past snapshots stay intact.
//!
//! # Invariants
//! - A revision reachable through an `Rc` is never mutated; edits always work
//!   on a fresh clone that is swapped in only after the edit succeeded.
//! - Cloning is shallow: fields are cloned, nested revisions (held as `Rc`)
//!   are shared with the source.
//! - The context (owning aggregate) is fixed when a revision is built.
//! - Equality is structural over fields and attributes; context is ignored.

use crate::pool::AttributeName;
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Ordered XML-style attributes attached to a revision.
pub type XmlAttributes = BTreeMap<AttributeName, String>;

/// The aggregate-specific part of a revision.
///
/// `Clone` must be shallow with respect to nested revisions: hold them as
/// `Rc<Revision<_>>` (or wrappers of it) so cloning shares them.
pub trait RevisionFields: Clone + PartialEq + 'static {
    /// Aggregate type a revision of this kind belongs to.
    type Context: 'static;

    /// Short kind name used in diagnostics.
    const KIND: &'static str;
}

/// One snapshot of an aggregate's mutable state.
pub struct Revision<F: RevisionFields> {
    fields: F,
    attributes: XmlAttributes,
    context: Option<Weak<F::Context>>,
}

impl<F: RevisionFields> Revision<F> {
    pub fn new(fields: F, context: Option<Weak<F::Context>>) -> Self {
        Self {
            fields,
            attributes: XmlAttributes::new(),
            context,
        }
    }

    pub fn with_attributes(mut self, attributes: XmlAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn fields(&self) -> &F {
        &self.fields
    }

    /// Mutable access. Only reachable while the revision is exclusively owned,
    /// i.e. before it has been published behind an `Rc`.
    pub fn fields_mut(&mut self) -> &mut F {
        &mut self.fields
    }

    pub fn attributes(&self) -> &XmlAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut XmlAttributes {
        &mut self.attributes
    }

    /// The owning aggregate, if one was given and it is still alive.
    pub fn context(&self) -> Option<Rc<F::Context>> {
        self.context.as_ref().and_then(Weak::upgrade)
    }

    pub fn has_context(&self) -> bool {
        self.context().is_some()
    }

    /// Shallow clone bound to `context`.
    ///
    /// The result has no other holders; the caller attaches it to an owner.
    pub fn clone_revision(&self, context: Option<Weak<F::Context>>) -> Self {
        Self {
            fields: self.fields.clone(),
            attributes: self.attributes.clone(),
            context,
        }
    }

    /// Shallow clone keeping the current context.
    pub fn clone_in_place(&self) -> Self {
        self.clone_revision(self.context.clone())
    }

    pub fn equals(&self, other: &Self) -> bool {
        self.fields == other.fields && self.attributes == other.attributes
    }
}

impl<F: RevisionFields> PartialEq for Revision<F> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<F: RevisionFields + Debug> Debug for Revision<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revision")
            .field("kind", &F::KIND)
            .field("fields", &self.fields)
            .field("attributes", &self.attributes)
            .field("has_context", &self.has_context())
            .finish()
    }
}

/// Type-erased view used by holders that keep revisions of mixed kinds.
pub trait AnyRevision: Any {
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Structural equality; revisions of different kinds are never equal.
    fn equals_dyn(&self, other: &dyn AnyRevision) -> bool;
}

impl<F: RevisionFields> AnyRevision for Revision<F> {
    fn kind(&self) -> &'static str {
        F::KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals_dyn(&self, other: &dyn AnyRevision) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.equals(other))
    }
}

impl Debug for dyn AnyRevision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyRevision({})", self.kind())
    }
}

/// The "current revision" slot of an aggregate.
///
/// Holds exactly one strong reference to the current snapshot. Readers get
/// cheap `Rc` snapshots; writers go through [`Revisioned::modify`].
pub struct Revisioned<F: RevisionFields> {
    current: RefCell<Rc<Revision<F>>>,
}

impl<F: RevisionFields> Revisioned<F> {
    pub fn new(revision: Revision<F>) -> Self {
        Self {
            current: RefCell::new(Rc::new(revision)),
        }
    }

    /// Snapshot of the current revision. Holding it does not block edits.
    pub fn current(&self) -> Rc<Revision<F>> {
        Rc::clone(&self.current.borrow())
    }

    /// Clone-then-replace edit. Returns the superseded revision and the
    /// closure's result.
    ///
    /// `edit` must not modify this slot again. A nested edit would be lost
    /// when the outer one is swapped in; debug builds panic instead.
    pub fn modify<R>(&self, edit: impl FnOnce(&mut Revision<F>) -> R) -> (Rc<Revision<F>>, R) {
        let base = self.current();
        let mut next = base.clone_in_place();
        let output = edit(&mut next);
        self.assert_unchanged_since(&base);
        (self.replace(Rc::new(next)), output)
    }

    /// Like [`Revisioned::modify`], but leaves the current revision untouched
    /// when the edit fails.
    pub fn try_modify<R, E>(
        &self,
        edit: impl FnOnce(&mut Revision<F>) -> Result<R, E>,
    ) -> Result<(Rc<Revision<F>>, R), E> {
        let base = self.current();
        let mut next = base.clone_in_place();
        let output = edit(&mut next)?;
        self.assert_unchanged_since(&base);
        Ok((self.replace(Rc::new(next)), output))
    }

    fn assert_unchanged_since(&self, base: &Rc<Revision<F>>) {
        debug_assert!(
            Rc::ptr_eq(base, &self.current.borrow()),
            "re-entrant edit of the same {} revision",
            F::KIND
        );
    }

    /// Rebinds the current state to a new context by cloning it.
    pub fn reparent(&self, context: Option<Weak<F::Context>>) -> Rc<Revision<F>> {
        let next = self.current().clone_revision(context);
        self.replace(Rc::new(next))
    }

    /// Adopts `revision` as current and returns the one it supersedes.
    pub fn replace(&self, revision: Rc<Revision<F>>) -> Rc<Revision<F>> {
        std::mem::replace(&mut *self.current.borrow_mut(), revision)
    }
}

impl<F: RevisionFields + Debug> Debug for Revisioned<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Revisioned").field(&self.current()).finish()
    }
}
