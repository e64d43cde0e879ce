//! Selection set: the single source of truth for what is highlighted.
//!
//! Membership mutations are the only way highlighting changes. Every
//! mutation that actually changes membership returns a [`SelectionEvent`]
//! carrying what changed plus a snapshot of the full membership; the caller
//! (the view controller) turns events into highlight and list-background
//! refreshes, keeping the bidirectional invariant — an id is highlighted iff
//! it is a member. Events are synchronous and delivered in mutation order.

use std::collections::HashSet;

use crate::ActivityId;

/// What a single mutation did.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionChange {
    Added(ActivityId),
    Removed(ActivityId),
    /// All previous members, in their selection order
    Cleared(Vec<ActivityId>),
}

/// Change notification for one selection mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub change: SelectionChange,
    /// Full membership after the mutation, in selection order (oldest first)
    pub members: Vec<ActivityId>,
}

/// Ordered set of active activity ids, no duplicates.
#[derive(Debug, Default)]
pub struct SelectionSet {
    order: Vec<ActivityId>,
    members: HashSet<ActivityId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an id. Returns `None` if it was already selected.
    pub fn add(&mut self, id: &str) -> Option<SelectionEvent> {
        if !self.members.insert(id.to_string()) {
            return None;
        }
        self.order.push(id.to_string());
        Some(SelectionEvent {
            change: SelectionChange::Added(id.to_string()),
            members: self.order.clone(),
        })
    }

    /// Remove an id. Returns `None` if it was not selected.
    pub fn remove(&mut self, id: &str) -> Option<SelectionEvent> {
        if !self.members.remove(id) {
            return None;
        }
        self.order.retain(|m| m != id);
        Some(SelectionEvent {
            change: SelectionChange::Removed(id.to_string()),
            members: self.order.clone(),
        })
    }

    /// Flip membership of an id. Always changes membership, so always
    /// returns an event.
    pub fn toggle(&mut self, id: &str) -> SelectionEvent {
        if self.members.contains(id) {
            self.remove(id).expect("member present")
        } else {
            self.add(id).expect("member absent")
        }
    }

    /// Drop all members. Returns `None` if the set was already empty.
    pub fn clear(&mut self) -> Option<SelectionEvent> {
        if self.order.is_empty() {
            return None;
        }
        let removed = std::mem::take(&mut self.order);
        self.members.clear();
        Some(SelectionEvent {
            change: SelectionChange::Cleared(removed),
            members: Vec::new(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Members in selection order, oldest first. The summary aggregator
    /// processes ids in exactly this order.
    pub fn members(&self) -> &[ActivityId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
