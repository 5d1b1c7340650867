//! Shadow events - lightweight graph nodes mirroring DAG events
//!
//! Parent links are stored as descriptors and resolved by hash through the
//! owning [`ShadowGraph`](crate::ShadowGraph), so expiring an ancestor never
//! leaves a descendant holding a dangling pointer; the lookup simply misses.

use hashbrown::HashSet;
use skein_core::{DagEvent, EventDescriptor, EventHash, Generation};
use std::sync::Arc;

/// Shadow of one DAG event
#[derive(Debug)]
pub struct ShadowEvent<E> {
    /// The wrapped event
    event: Arc<E>,

    hash: EventHash,
    generation: Generation,

    self_parent: Option<EventDescriptor>,
    other_parent: Option<EventDescriptor>,

    /// Shadows whose self-parent is this shadow
    self_children: HashSet<EventHash>,

    /// Shadows whose other-parent is this shadow
    other_children: HashSet<EventHash>,
}

impl<E: DagEvent> ShadowEvent<E> {
    pub(crate) fn new(event: Arc<E>) -> Self {
        Self {
            hash: event.hash(),
            generation: event.generation(),
            self_parent: event.self_parent(),
            other_parent: event.other_parent(),
            event,
            self_children: HashSet::new(),
            other_children: HashSet::new(),
        }
    }
}

impl<E> ShadowEvent<E> {
    pub fn event(&self) -> &Arc<E> {
        &self.event
    }

    pub fn hash(&self) -> EventHash {
        self.hash
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn self_parent(&self) -> Option<&EventDescriptor> {
        self.self_parent.as_ref()
    }

    pub fn other_parent(&self) -> Option<&EventDescriptor> {
        self.other_parent.as_ref()
    }

    pub fn self_children(&self) -> impl Iterator<Item = &EventHash> {
        self.self_children.iter()
    }

    pub fn other_children(&self) -> impl Iterator<Item = &EventHash> {
        self.other_children.iter()
    }

    pub fn num_self_children(&self) -> usize {
        self.self_children.len()
    }

    /// A tip has no self-child (it may have other-children)
    pub fn is_tip(&self) -> bool {
        self.self_children.is_empty()
    }

    /// Expired iff generation is at or below the watermark
    pub fn is_expired(&self, expired_generation: Generation) -> bool {
        self.generation <= expired_generation
    }

    pub(crate) fn add_self_child(&mut self, child: EventHash) {
        self.self_children.insert(child);
    }

    pub(crate) fn add_other_child(&mut self, child: EventHash) {
        self.other_children.insert(child);
    }

    pub(crate) fn remove_self_child(&mut self, child: &EventHash) {
        self.self_children.remove(child);
    }

    pub(crate) fn remove_other_child(&mut self, child: &EventHash) {
        self.other_children.remove(child);
    }

    /// Hashes of the forward neighbours: self-children and other-children
    pub(crate) fn children(&self) -> impl Iterator<Item = &EventHash> {
        self.self_children.iter().chain(self.other_children.iter())
    }
}
