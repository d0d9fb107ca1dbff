//! Per-query analysis counters
//!
//! Each executing task owns one counter tree and updates it without
//! synchronisation; trees from concurrent subtasks are merged at the join
//! point. Counters are plain integers by construction: a node has exactly
//! one writer until it is merged.

use serde::Serialize;

/// One node of an analysis tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzeNode {
    pub name: String,
    pub description: String,
    /// Rows entering this stage
    pub count_in: i64,
    /// Rows surviving this stage
    pub count_out: i64,
    /// Time spent in this stage
    pub duration_ms: i64,
    pub children: Vec<AnalyzeNode>,
}

impl AnalyzeNode {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Record one pass through this stage
    pub fn observe(&mut self, count_in: i64, count_out: i64, duration_ms: i64) {
        self.count_in += count_in;
        self.count_out += count_out;
        self.duration_ms += duration_ms;
    }

    /// Attach a child stage, returning a handle to it
    pub fn child(&mut self, name: impl Into<String>, description: impl Into<String>) -> &mut Self {
        self.children.push(AnalyzeNode::new(name, description));
        self.children.last_mut().unwrap()
    }

    /// Fold a sibling tree produced by a joined subtask into this one.
    /// Counters of nodes with the same name are summed; unmatched children
    /// are appended.
    pub fn merge(&mut self, other: &AnalyzeNode) {
        self.count_in += other.count_in;
        self.count_out += other.count_out;
        self.duration_ms += other.duration_ms;

        for theirs in &other.children {
            match self.children.iter_mut().find(|c| c.name == theirs.name) {
                Some(ours) => ours.merge(theirs),
                None => self.children.push(theirs.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_accumulates() {
        let mut node = AnalyzeNode::new("filter", "bloom filtering");
        node.observe(100, 40, 3);
        node.observe(50, 10, 2);

        assert_eq!(node.count_in, 150);
        assert_eq!(node.count_out, 50);
        assert_eq!(node.duration_ms, 5);
    }

    #[test]
    fn test_merge_sums_and_preserves_structure() {
        let mut left = AnalyzeNode::new("query", "");
        left.observe(10, 5, 1);
        left.child("day-0", "").observe(10, 5, 1);

        let mut right = AnalyzeNode::new("query", "");
        right.observe(20, 8, 2);
        right.child("day-0", "").observe(12, 4, 1);
        right.child("day-1", "").observe(8, 4, 1);

        left.merge(&right);

        assert_eq!(left.count_in, 30);
        assert_eq!(left.count_out, 13);
        assert_eq!(left.children.len(), 2);
        assert_eq!(left.children[0].name, "day-0");
        assert_eq!(left.children[0].count_in, 22);
        assert_eq!(left.children[1].name, "day-1");
        assert_eq!(left.children[1].count_in, 8);
    }
}
