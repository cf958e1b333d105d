//! Textual and structured rendering of reporting trees.

use std::fmt::{self, Write};

use serde_json::{Value, json};

use crate::{OTHER_REGION_NAME, ReportNode};

const LABEL_WIDTH: usize = 32;

/// Renders the tree as text, one line per node that is at least `threshold` of the root value.
///
/// Each line holds the indented name, the value with three decimals and the percentage of the
/// root value. Children below the threshold are folded into a trailing `other` line together
/// with the time not covered by any sub-region.
///
/// # Panics
///
/// Panics if `threshold` is not within `0.0..=1.0`.
///
/// # Examples
///
/// ```
/// use region_profiler::{ReportNode, render};
///
/// let tree = ReportNode::new(
///     "root",
///     10.0,
///     vec![ReportNode::leaf("solve", 9.95), ReportNode::leaf("setup", 0.05)],
/// );
///
/// let text = render(&tree, 0.01);
/// assert!(text.contains("solve"));
/// assert!(!text.contains("setup"));
/// ```
#[must_use]
pub fn render(tree: &ReportNode, threshold: f64) -> String {
    let mut output = String::new();
    write_tree(tree, threshold, &mut output).expect("writing to a String cannot fail");
    output
}

/// Writes the text rendering of the tree (see [`render()`]) to `out`.
///
/// # Errors
///
/// Returns any error produced by `out`.
///
/// # Panics
///
/// Panics if `threshold` is not within `0.0..=1.0`.
pub fn write_tree(tree: &ReportNode, threshold: f64, out: &mut impl Write) -> fmt::Result {
    assert!(
        (0.0..=1.0).contains(&threshold),
        "render threshold must be a fraction between 0 and 1, got {threshold}"
    );

    let total = tree.value();
    let cutoff = threshold * total;

    write_node(tree, 0, cutoff, total, out)
}

fn write_node(
    node: &ReportNode,
    depth: usize,
    cutoff: f64,
    total: f64,
    out: &mut impl Write,
) -> fmt::Result {
    write_line(node.name(), node.value(), depth, total, out)?;

    let mut folded = 0.0;
    let mut has_folded = false;

    for child in node.children() {
        if child.is_other() || child.value() < cutoff {
            folded += child.value();
            has_folded = true;
        } else {
            write_node(child, depth.wrapping_add(1), cutoff, total, out)?;
        }
    }

    if has_folded && folded > 0.0 && folded >= cutoff {
        write_line(OTHER_REGION_NAME, folded, depth.wrapping_add(1), total, out)?;
    }

    Ok(())
}

fn write_line(name: &str, value: f64, depth: usize, total: f64, out: &mut impl Write) -> fmt::Result {
    let indent = depth.saturating_mul(2);
    let label_width = LABEL_WIDTH.saturating_sub(indent);
    let percentage = if total > 0.0 { 100.0 * value / total } else { 0.0 };

    writeln!(
        out,
        "{:indent$}{name:<label_width$}{value:>12.3}{percentage:>9.1}%",
        ""
    )
}

/// Converts the tree into its structured form: `{ "name", "value", "children" }`, recursively.
///
/// # Examples
///
/// ```
/// use region_profiler::{ReportNode, to_structured};
///
/// let tree = ReportNode::new("root", 1.0, vec![ReportNode::leaf("x", 1.0)]);
/// let json = to_structured(&tree);
///
/// assert_eq!(json["children"][0]["name"], "x");
/// ```
#[must_use]
pub fn to_structured(tree: &ReportNode) -> Value {
    json!({
        "name": tree.name(),
        "value": tree.value(),
        "children": tree.children().iter().map(to_structured).collect::<Vec<_>>(),
    })
}
