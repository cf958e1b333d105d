//! Fusion and scaling of reporting trees.

use foldhash::{HashMap, HashMapExt};

use crate::{Error, ReportNode, Result, TreeSide};

impl ReportNode {
    /// Fuses two structurally equal trees into one, summing the values of matching nodes.
    ///
    /// Children are matched by name, so the order of children does not matter. The result
    /// has the child order of `self`. A synthetic `"other"` node that exists in only one of the
    /// trees is carried over as-is, as the other tree simply had no measurable untracked time
    /// at that place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FuseMismatch`] naming the first node that exists in only one of the
    /// trees. Differing trees from different threads mean that the threads executed different
    /// instrumented code paths, so they are never merged by padding the missing nodes.
    ///
    /// # Examples
    ///
    /// ```
    /// use region_profiler::ReportNode;
    ///
    /// # fn main() -> region_profiler::Result<()> {
    /// let thread1 = ReportNode::new(
    ///     "root",
    ///     5.0,
    ///     vec![ReportNode::leaf("x", 3.0), ReportNode::leaf("y", 2.0)],
    /// );
    /// let thread2 = thread1.clone();
    ///
    /// let fused = thread1.fuse(&thread2)?;
    /// assert_eq!(fused.child("x").unwrap().value(), 6.0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn fuse(&self, other: &Self) -> Result<Self> {
        if self.name() != other.name() {
            return Err(Error::FuseMismatch {
                path: self.name().to_string(),
                present_in: TreeSide::Left,
            });
        }

        let mut path = Vec::new();
        fuse_matching(self, other, &mut path)
    }

    /// Fuses any number of structurally equal trees into one.
    ///
    /// Returns `None` if there are no trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FuseMismatch`] if any tree differs in structure from the others.
    pub fn fuse_all(trees: impl IntoIterator<Item = Self>) -> Result<Option<Self>> {
        let mut trees = trees.into_iter();

        let Some(first) = trees.next() else {
            return Ok(None);
        };

        trees
            .try_fold(first, |accumulated, tree| accumulated.fuse(&tree))
            .map(Some)
    }

    /// Returns a copy of the tree with every value multiplied by `factor`.
    ///
    /// Use this to normalize a tree by a unit count (`1.0 / count`) or to convert values to
    /// percentages of the root (`100.0 / tree.value()`).
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(
            self.name(),
            self.value() * factor,
            self.children()
                .iter()
                .map(|child| child.scale(factor))
                .collect(),
        )
    }
}

fn fuse_matching<'a>(
    left: &'a ReportNode,
    right: &'a ReportNode,
    path: &mut Vec<&'a str>,
) -> Result<ReportNode> {
    path.push(left.name());

    let mut unmatched_right = index_children(right, path, TreeSide::Right)?;
    // Only used to detect duplicates on the left.
    index_children(left, path, TreeSide::Left)?;

    let mut children = Vec::with_capacity(left.children().len());

    for left_child in left.children() {
        match unmatched_right.remove(left_child.name()) {
            Some(right_child) => children.push(fuse_matching(left_child, right_child, path)?),
            None if left_child.is_other() => children.push(left_child.clone()),
            None => return Err(mismatch(path, left_child, TreeSide::Left)),
        }
    }

    // Iterate in the right tree's order, so the reported mismatch is deterministic.
    for right_child in right.children() {
        if !unmatched_right.contains_key(right_child.name()) {
            continue;
        }

        if right_child.is_other() {
            children.push(right_child.clone());
        } else {
            return Err(mismatch(path, right_child, TreeSide::Right));
        }
    }

    path.pop();

    Ok(ReportNode::new(
        left.name(),
        left.value() + right.value(),
        children,
    ))
}

fn index_children<'a>(
    node: &'a ReportNode,
    path: &[&str],
    side: TreeSide,
) -> Result<HashMap<&'a str, &'a ReportNode>> {
    let mut index = HashMap::with_capacity(node.children().len());

    for child in node.children() {
        if index.insert(child.name(), child).is_some() {
            return Err(mismatch(path, child, side));
        }
    }

    Ok(index)
}

fn mismatch(path: &[&str], node: &ReportNode, present_in: TreeSide) -> Error {
    let mut full_path = path.join("/");
    full_path.push('/');
    full_path.push_str(node.name());

    Error::FuseMismatch {
        path: full_path,
        present_in,
    }
}
