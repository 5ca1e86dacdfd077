//! Parent/child bookkeeping between markets.
//!
//! Two one-directional maps: parent → pending successors (in proposal order)
//! and successor → parent. Every mutation updates both, so a successor is
//! listed under at most one parent and never appears in one map only.

use std::collections::BTreeMap;

use marketcore_types::MarketId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessionGraph {
    successors: BTreeMap<MarketId, Vec<MarketId>>,
    parents: BTreeMap<MarketId, MarketId>,
}

impl SuccessionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` as a pending successor of `parent`. A previous link of
    /// the child is replaced.
    pub fn link(&mut self, parent: &MarketId, child: &MarketId) {
        if self.parents.get(child) == Some(parent) {
            return;
        }
        self.unlink(child);
        self.successors
            .entry(parent.clone())
            .or_default()
            .push(child.clone());
        self.parents.insert(child.clone(), parent.clone());
    }

    /// Remove `child` from the graph. Returns its former parent.
    pub fn unlink(&mut self, child: &MarketId) -> Option<MarketId> {
        let parent = self.parents.remove(child)?;
        if let Some(children) = self.successors.get_mut(&parent) {
            children.retain(|c| c != child);
            if children.is_empty() {
                self.successors.remove(&parent);
            }
        }
        Some(parent)
    }

    /// Remove `parent` and every link to it. Returns its former successors in
    /// proposal order.
    pub fn take_successors(&mut self, parent: &MarketId) -> Vec<MarketId> {
        let children = self.successors.remove(parent).unwrap_or_default();
        for child in &children {
            self.parents.remove(child);
        }
        children
    }

    #[must_use]
    pub fn parent_of(&self, child: &MarketId) -> Option<&MarketId> {
        self.parents.get(child)
    }

    #[must_use]
    pub fn successors_of(&self, parent: &MarketId) -> &[MarketId] {
        self.successors.get(parent).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_successor(&self, id: &MarketId) -> bool {
        self.parents.contains_key(id)
    }

    #[must_use]
    pub fn has_successors(&self, parent: &MarketId) -> bool {
        self.successors.contains_key(parent)
    }

    /// Pending successors of `parent` other than `except`.
    #[must_use]
    pub fn siblings(&self, parent: &MarketId, except: &MarketId) -> Vec<MarketId> {
        self.successors_of(parent)
            .iter()
            .filter(|id| *id != except)
            .cloned()
            .collect()
    }

    /// Parents that have pending successors, in ID order.
    pub fn parents(&self) -> impl Iterator<Item = (&MarketId, &[MarketId])> {
        self.successors.iter().map(|(p, c)| (p, c.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Whether `id` appears anywhere in the graph.
    #[must_use]
    pub fn references(&self, id: &MarketId) -> bool {
        self.parents.contains_key(id) || self.successors.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> MarketId {
        MarketId::new(s)
    }

    #[test]
    fn link_records_both_directions() {
        let mut g = SuccessionGraph::new();
        g.link(&id("p"), &id("c1"));
        g.link(&id("p"), &id("c2"));
        assert_eq!(g.successors_of(&id("p")), &[id("c1"), id("c2")]);
        assert_eq!(g.parent_of(&id("c2")), Some(&id("p")));
        assert!(g.is_successor(&id("c1")));
    }

    #[test]
    fn relink_moves_child() {
        let mut g = SuccessionGraph::new();
        g.link(&id("p1"), &id("c"));
        g.link(&id("p2"), &id("c"));
        assert!(!g.has_successors(&id("p1")));
        assert_eq!(g.parent_of(&id("c")), Some(&id("p2")));
    }

    #[test]
    fn unlink_drops_empty_parent() {
        let mut g = SuccessionGraph::new();
        g.link(&id("p"), &id("c"));
        assert_eq!(g.unlink(&id("c")), Some(id("p")));
        assert!(g.is_empty());
        assert!(!g.references(&id("p")));
        assert_eq!(g.unlink(&id("c")), None);
    }

    #[test]
    fn take_successors_clears_children() {
        let mut g = SuccessionGraph::new();
        g.link(&id("p"), &id("a"));
        g.link(&id("p"), &id("b"));
        assert_eq!(g.take_successors(&id("p")), vec![id("a"), id("b")]);
        assert!(!g.is_successor(&id("a")));
        assert!(!g.is_successor(&id("b")));
        assert!(g.is_empty());
    }

    #[test]
    fn siblings_exclude_self() {
        let mut g = SuccessionGraph::new();
        for c in ["a", "b", "c"] {
            g.link(&id("p"), &id(c));
        }
        assert_eq!(g.siblings(&id("p"), &id("b")), vec![id("a"), id("c")]);
    }
}
