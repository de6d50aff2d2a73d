//! Index-stable member lists for container revisions.

use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Members of a container, addressed by slot index.
///
/// Removing a member empties its slot instead of shifting later members, so
/// indices handed out by `push` stay valid. Equality is member identity.
pub struct Slots<T> {
    slots: Vec<Option<Rc<T>>>,
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Appends `item` and returns its slot index.
    pub fn push(&mut self, item: Rc<T>) -> usize {
        self.slots.push(Some(item));
        self.slots.len() - 1
    }

    /// Empties slot `index`. Returns the previous member, `None` when the
    /// slot was already empty or out of range.
    pub fn take(&mut self, index: usize) -> Option<Rc<T>> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn get(&self, index: usize) -> Option<&Rc<T>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Slot index holding `item`, compared by identity.
    pub fn position(&self, item: &Rc<T>) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|member| Rc::ptr_eq(member, item)))
    }

    /// Live members in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<T>> {
        self.slots.iter().flatten()
    }

    /// Number of slots, including emptied ones.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> usize {
        self.iter().count()
    }
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Slots<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<T> PartialEq for Slots<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slots.len() == other.slots.len()
            && self
                .slots
                .iter()
                .zip(&other.slots)
                .all(|pair| match pair {
                    (Some(left), Some(right)) => Rc::ptr_eq(left, right),
                    (None, None) => true,
                    _ => false,
                })
    }
}

impl<T> Debug for Slots<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slots")
            .field("slot_count", &self.slot_count())
            .field("live_count", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Slots;
    use std::rc::Rc;

    #[test]
    fn take_keeps_later_indices_stable() {
        let mut slots = Slots::new();
        let a = slots.push(Rc::new("a"));
        let b = slots.push(Rc::new("b"));

        assert_eq!(slots.take(a).as_deref(), Some(&"a"));
        assert!(slots.take(a).is_none());
        assert_eq!(slots.get(b).map(|item| **item), Some("b"));
        assert_eq!(slots.slot_count(), 2);
        assert_eq!(slots.live_count(), 1);
    }

    #[test]
    fn equality_is_member_identity() {
        let shared = Rc::new(1);
        let mut left = Slots::new();
        let mut right = Slots::new();
        left.push(Rc::clone(&shared));
        right.push(Rc::clone(&shared));
        assert_eq!(left, right);

        let mut other = Slots::new();
        other.push(Rc::new(1));
        assert_ne!(left, other);
    }
}
