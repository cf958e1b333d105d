//! Immutable reporting trees derived from region trees.

use serde::Serialize;

use crate::OTHER_REGION_NAME;

/// One node of a reporting tree: a name, a value and ordered children.
///
/// The value is in seconds when produced by [`Profiler::performance_tree()`][1] and in whatever
/// unit the caller chose after [`scale()`][Self::scale] (e.g. seconds per item or percent).
///
/// Reporting trees are snapshots. They are combined with [`fuse()`][Self::fuse] and
/// [`scale()`][Self::scale], which produce new trees and leave their inputs untouched.
///
/// A node may have a synthetic child named `"other"`, holding the time spent directly in the
/// node outside any of its sub-regions.
///
/// [1]: crate::Profiler::performance_tree
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportNode {
    name: String,
    value: f64,
    children: Vec<ReportNode>,
}

impl ReportNode {
    /// Creates a node with the given children.
    ///
    /// # Examples
    ///
    /// ```
    /// use region_profiler::ReportNode;
    ///
    /// let tree = ReportNode::new(
    ///     "root",
    ///     5.0,
    ///     vec![
    ///         ReportNode::leaf("x", 3.0),
    ///         ReportNode::leaf("y", 2.0),
    ///     ],
    /// );
    ///
    /// assert_eq!(tree.children().len(), 2);
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, children: Vec<Self>) -> Self {
        Self {
            name: name.into(),
            value,
            children,
        }
    }

    /// Creates a node without children.
    #[must_use]
    pub fn leaf(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, Vec::new())
    }

    /// The name of the region this node describes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value of the node, including all of its children.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The children of the node, in report order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// The child with the given name, if any.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Whether this node is the synthetic node for time not covered by any sub-region.
    #[must_use]
    pub fn is_other(&self) -> bool {
        self.name == OTHER_REGION_NAME
    }

    /// The value of the synthetic `"other"` child, or zero if there is none.
    #[must_use]
    pub fn time_in_other(&self) -> f64 {
        self.child(OTHER_REGION_NAME).map_or(0.0, Self::value)
    }

    /// Whether two trees have the same shape, ignoring values.
    ///
    /// Trees have the same shape if their roots have the same name and, recursively, each has
    /// the same set of child names with children of the same shape. Child order and the
    /// synthetic `"other"` nodes do not matter.
    #[must_use]
    pub fn is_structurally_equal(&self, other: &Self) -> bool {
        self.fuse(other).is_ok()
    }
}
