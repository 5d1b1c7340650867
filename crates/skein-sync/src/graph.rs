//! Shadow Graph - hash-indexed DAG of shadow events
//!
//! Owns every [`ShadowEvent`]. Parent links resolve through the index;
//! forward links (self-children, other-children) are recorded on the parent
//! when the child is inserted.
//!
//! Expiration works on self-parent chains: a creator's events are strictly
//! ordered by generation, so walking back from a tip visits decreasing
//! generations and everything past the first expired shadow is expired too.
//!
//! ```text
//!   tip ──self-parent──► s3 ──► s2 ──► s1
//!    │                          └ expired ┘
//!    └─ kept by remove_strict_self_ancestry
//! ```

use hashbrown::{HashMap, HashSet};
use skein_core::{DagEvent, EventHash};
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::shadow::ShadowEvent;

/// Hash-indexed collection of shadow events
#[derive(Debug)]
pub struct ShadowGraph<E> {
    shadows: HashMap<EventHash, ShadowEvent<E>>,
}

impl<E: DagEvent> ShadowGraph<E> {
    /// Create an empty shadow graph
    pub fn new() -> Self {
        Self {
            shadows: HashMap::new(),
        }
    }

    /// Insert a shadow for `event`, linking it to any parent shadows present
    ///
    /// Does not touch any tip set; tips are a manager concern.
    pub fn insert(&mut self, event: Arc<E>) -> Result<&ShadowEvent<E>> {
        let hash = event.hash();
        if self.shadows.contains_key(&hash) {
            return Err(SyncError::DuplicateShadow(hash));
        }

        let shadow = ShadowEvent::new(event);

        if let Some(parent) = shadow.self_parent() {
            if let Some(parent) = self.shadows.get_mut(&parent.hash) {
                parent.add_self_child(hash);
            }
        }
        if let Some(parent) = shadow.other_parent() {
            if let Some(parent) = self.shadows.get_mut(&parent.hash) {
                parent.add_other_child(hash);
            }
        }

        let shadow: &ShadowEvent<E> = self.shadows.entry(hash).or_insert(shadow);
        Ok(shadow)
    }
}

impl<E> ShadowGraph<E> {
    /// Look up a shadow by event hash
    pub fn get(&self, hash: &EventHash) -> Option<&ShadowEvent<E>> {
        self.shadows.get(hash)
    }

    pub fn contains(&self, hash: &EventHash) -> bool {
        self.shadows.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShadowEvent<E>> {
        self.shadows.values()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &EventHash> {
        self.shadows.keys()
    }

    /// Resolve the self-parent shadow, if it is still present
    pub fn self_parent(&self, hash: &EventHash) -> Option<&ShadowEvent<E>> {
        self.get(hash)?
            .self_parent()
            .and_then(|parent| self.get(&parent.hash))
    }

    /// Resolve the other-parent shadow, if it is still present
    pub fn other_parent(&self, hash: &EventHash) -> Option<&ShadowEvent<E>> {
        self.get(hash)?
            .other_parent()
            .and_then(|parent| self.get(&parent.hash))
    }

    /// Every shadow reachable forward through self-children and other-children
    ///
    /// The start shadow is not included.
    pub fn graph_descendants(&self, hash: &EventHash) -> HashSet<EventHash> {
        let mut descendants = HashSet::new();
        let mut stack: Vec<EventHash> = match self.get(hash) {
            Some(start) => start.children().copied().collect(),
            None => return descendants,
        };

        while let Some(current) = stack.pop() {
            let Some(shadow) = self.get(&current) else {
                continue;
            };
            if descendants.insert(current) {
                stack.extend(shadow.children().copied());
            }
        }

        descendants
    }

    /// True if any graph descendant of `hash` satisfies `predicate`
    ///
    /// Same traversal as [`graph_descendants`](Self::graph_descendants), but
    /// stops at the first hit.
    pub fn any_descendant(&self, hash: &EventHash, mut predicate: impl FnMut(&EventHash) -> bool) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<EventHash> = match self.get(hash) {
            Some(start) => start.children().copied().collect(),
            None => return false,
        };

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(shadow) = self.get(&current) else {
                continue;
            };
            if predicate(&current) {
                return true;
            }
            stack.extend(shadow.children().copied());
        }

        false
    }

    /// Strict self-descendants of `hash`, following self-children only
    pub fn strict_self_descendants(&self, hash: &EventHash) -> Vec<EventHash> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<EventHash> = match self.get(hash) {
            Some(start) => start.self_children().copied().collect(),
            None => return found,
        };

        while let Some(current) = stack.pop() {
            let Some(shadow) = self.get(&current) else {
                continue;
            };
            if visited.insert(current) {
                found.push(current);
                stack.extend(shadow.self_children().copied());
            }
        }

        found
    }

    /// Remove every shadow on the self-ancestry chain of `hash`, including
    /// `hash` itself, that satisfies `predicate`
    ///
    /// Returns the number of shadows removed.
    pub fn remove_self_ancestry(
        &mut self,
        hash: &EventHash,
        predicate: impl Fn(&ShadowEvent<E>) -> bool,
    ) -> usize {
        self.remove_chain(Some(*hash), predicate)
    }

    /// Same as [`remove_self_ancestry`](Self::remove_self_ancestry) but never
    /// removes `hash` itself
    pub fn remove_strict_self_ancestry(
        &mut self,
        hash: &EventHash,
        predicate: impl Fn(&ShadowEvent<E>) -> bool,
    ) -> usize {
        let start = self
            .get(hash)
            .and_then(|shadow| shadow.self_parent())
            .map(|parent| parent.hash);
        self.remove_chain(start, predicate)
    }

    // Walks until the chain leaves the graph. Generation falls strictly along
    // the chain, so for a watermark predicate the removed shadows form its tail.
    fn remove_chain(
        &mut self,
        mut cursor: Option<EventHash>,
        predicate: impl Fn(&ShadowEvent<E>) -> bool,
    ) -> usize {
        let mut removed = 0;

        while let Some(hash) = cursor {
            let Some(shadow) = self.shadows.get(&hash) else {
                break;
            };
            cursor = shadow.self_parent().map(|parent| parent.hash);
            let matched = predicate(shadow);
            if matched && self.remove(&hash).is_some() {
                removed += 1;
            }
        }

        removed
    }

    /// Remove a single shadow, unlinking it from its parents
    pub fn remove(&mut self, hash: &EventHash) -> Option<ShadowEvent<E>> {
        let shadow = self.shadows.remove(hash)?;
        if let Some(parent) = shadow.self_parent() {
            if let Some(parent) = self.shadows.get_mut(&parent.hash) {
                parent.remove_self_child(hash);
            }
        }
        if let Some(parent) = shadow.other_parent() {
            if let Some(parent) = self.shadows.get_mut(&parent.hash) {
                parent.remove_other_child(hash);
            }
        }
        Some(shadow)
    }

    /// Remove every shadow
    pub fn clear(&mut self) {
        self.shadows.clear();
    }
}

impl<E: DagEvent> Default for ShadowGraph<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{CreatorId, GossipEvent};

    fn creator(n: u64) -> CreatorId {
        CreatorId::from_index(n)
    }

    fn chain(graph: &mut ShadowGraph<GossipEvent>, creator_index: u64, len: usize) -> Vec<GossipEvent> {
        let mut events: Vec<GossipEvent> = Vec::new();
        for i in 0..len {
            let mut builder = GossipEvent::builder(creator(creator_index)).timestamp(i as i64);
            if let Some(prev) = events.last() {
                builder = builder.self_parent(prev.descriptor());
            }
            let event = builder.build().unwrap();
            graph.insert(Arc::new(event.clone())).unwrap();
            events.push(event);
        }
        events
    }

    #[test]
    fn test_graph_creation() {
        let graph: ShadowGraph<GossipEvent> = ShadowGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_insert_links_self_child() {
        let mut graph = ShadowGraph::new();
        let events = chain(&mut graph, 1, 2);

        let parent = graph.get(&events[0].hash()).unwrap();
        assert!(!parent.is_tip());
        assert_eq!(parent.self_children().next(), Some(&events[1].hash()));
        assert_eq!(graph.self_parent(&events[1].hash()).unwrap().hash(), events[0].hash());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut graph = ShadowGraph::new();
        let a1 = Arc::new(GossipEvent::genesis(creator(1), vec![]));
        graph.insert(a1.clone()).unwrap();
        assert!(matches!(graph.insert(a1), Err(SyncError::DuplicateShadow(_))));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_insert_with_missing_parent_starts_new_root() {
        let mut graph = ShadowGraph::new();
        let ghost = GossipEvent::genesis(creator(9), vec![]);
        let a1 = GossipEvent::builder(creator(1))
            .other_parent(ghost.descriptor())
            .build()
            .unwrap();

        graph.insert(Arc::new(a1.clone())).unwrap();
        assert!(graph.other_parent(&a1.hash()).is_none());
        assert!(graph.contains(&a1.hash()));
    }

    #[test]
    fn test_graph_descendants_follow_other_children() {
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 2);
        let b1 = GossipEvent::builder(creator(2))
            .other_parent(a[0].descriptor())
            .build()
            .unwrap();
        graph.insert(Arc::new(b1.clone())).unwrap();
        let b2 = GossipEvent::builder(creator(2))
            .self_parent(b1.descriptor())
            .build()
            .unwrap();
        graph.insert(Arc::new(b2.clone())).unwrap();

        let descendants = graph.graph_descendants(&a[0].hash());
        assert_eq!(descendants.len(), 3);
        assert!(descendants.contains(&a[1].hash()));
        assert!(descendants.contains(&b1.hash()));
        assert!(descendants.contains(&b2.hash()));
        assert!(!descendants.contains(&a[0].hash()));

        assert!(graph.any_descendant(&a[0].hash(), |h| *h == b2.hash()));
        assert!(!graph.any_descendant(&a[1].hash(), |h| *h == b2.hash()));
    }

    #[test]
    fn test_strict_self_descendants_ignore_other_children() {
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 3);
        let b1 = GossipEvent::builder(creator(2))
            .other_parent(a[0].descriptor())
            .build()
            .unwrap();
        graph.insert(Arc::new(b1)).unwrap();

        let mut found = graph.strict_self_descendants(&a[0].hash());
        found.sort();
        let mut expected = vec![a[1].hash(), a[2].hash()];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_remove_strict_self_ancestry_keeps_start() {
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 4);

        let removed = graph.remove_strict_self_ancestry(&a[3].hash(), |s| s.generation() <= 2);
        assert_eq!(removed, 3);
        assert!(graph.contains(&a[3].hash()));
        assert!(!graph.contains(&a[2].hash()));
        assert!(!graph.contains(&a[0].hash()));

        // Unmatched shadows are passed over, not a stopping point
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 4);
        let removed = graph.remove_strict_self_ancestry(&a[3].hash(), |s| s.generation() <= 1);
        assert_eq!(removed, 2);
        assert!(graph.contains(&a[2].hash()));
        assert!(!graph.contains(&a[1].hash()));
        assert!(graph.get(&a[2].hash()).unwrap().self_parent().is_some());
    }

    #[test]
    fn test_remove_self_ancestry_includes_start() {
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 3);

        let removed = graph.remove_self_ancestry(&a[2].hash(), |_| true);
        assert_eq!(removed, 3);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_remove_unlinks_from_parent() {
        let mut graph = ShadowGraph::new();
        let a = chain(&mut graph, 1, 3);

        let removed = graph.remove_self_ancestry(&a[2].hash(), |s| s.generation() >= 2);
        assert_eq!(removed, 1);
        assert_eq!(graph.len(), 2);
        assert!(graph.get(&a[1].hash()).unwrap().is_tip());
    }

    #[test]
    fn test_clear() {
        let mut graph = ShadowGraph::new();
        chain(&mut graph, 1, 5);
        graph.clear();
        assert!(graph.is_empty());
    }
}
