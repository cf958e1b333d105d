//! Conversion of live region trees into reporting trees.

use std::cmp::Ordering;

use crate::{OTHER_REGION_NAME, RegionId, RegionTree, ReportNode};

/// Untracked time at or below this many seconds is the gap between the clock reads of nested
/// start and stop events, not time spent in the region itself.
const OTHER_EPSILON: f64 = 1e-5;

impl ReportNode {
    /// Converts the whole region tree, starting from its root.
    ///
    /// Every region becomes a node whose value is its inclusive time in seconds. A region with
    /// sub-regions gets an additional trailing `"other"` child for the time not covered by any
    /// sub-region, unless that time is below clock read granularity. Children are ordered by value, descending.
    pub(crate) fn from_regions(regions: &RegionTree) -> Self {
        convert(regions, regions.root())
    }
}

fn convert(regions: &RegionTree, id: RegionId) -> ReportNode {
    let region = regions.get(id);
    let total = region.total().as_secs_f64();

    let mut children: Vec<ReportNode> = region
        .children()
        .map(|(_, child)| convert(regions, child))
        .collect();

    children.sort_by(|a, b| {
        b.value()
            .partial_cmp(&a.value())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name().cmp(b.name()))
    });

    if !children.is_empty() {
        let other = regions.time_in_other(id).as_secs_f64();

        if other > OTHER_EPSILON {
            children.push(ReportNode::leaf(OTHER_REGION_NAME, other));
        }
    }

    ReportNode::new(region.name(), total, children)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::float_cmp, reason = "fake clock produces exact values")]

    use std::time::Duration;

    use super::*;
    use crate::pal::{ClockFacade, FakeClock};

    fn run(tree: &mut RegionTree, clock: &FakeClock, id: RegionId, millis: u64) {
        tree.start_time(id).unwrap();
        clock.advance_millis(millis);
        tree.end_time(id).unwrap();
    }

    fn children_sum(node: &ReportNode) -> f64 {
        node.children().iter().map(ReportNode::value).sum()
    }

    #[test]
    fn leaf_region_has_no_children() {
        let clock = FakeClock::new();
        let mut tree = RegionTree::new("root", ClockFacade::fake(clock.clone()));
        let root = tree.root();
        run(&mut tree, &clock, root, 10);

        let node = ReportNode::from_regions(&tree);

        assert_eq!(node.name(), "root");
        assert_eq!(node.value(), 0.010);
        assert!(node.children().is_empty());
    }

    #[test]
    fn other_child_holds_untracked_time() {
        let clock = FakeClock::new();
        let mut tree = RegionTree::new("root", ClockFacade::fake(clock.clone()));
        let root = tree.root();

        tree.start_time(root).unwrap();
        let a = tree.subregion(root, "a").unwrap();
        run(&mut tree, &clock, a, 6);
        let b = tree.subregion(root, "b").unwrap();
        run(&mut tree, &clock, b, 3);
        clock.advance_millis(1);
        tree.end_time(root).unwrap();

        let node = ReportNode::from_regions(&tree);

        let names: Vec<_> = node.children().iter().map(ReportNode::name).collect();
        assert_eq!(names, ["a", "b", OTHER_REGION_NAME]);
        assert_eq!(node.time_in_other(), 0.001);
        assert!((children_sum(&node) - node.value()).abs() < 1e-12);
    }

    fn root_with_one_child(child: Duration, residual: Duration) -> RegionTree {
        let clock = FakeClock::new();
        let mut tree = RegionTree::new("root", ClockFacade::fake(clock.clone()));
        let root = tree.root();

        tree.start_time(root).unwrap();
        let a = tree.subregion(root, "a").unwrap();
        tree.start_time(a).unwrap();
        clock.advance(child);
        tree.end_time(a).unwrap();
        clock.advance(residual);
        tree.end_time(root).unwrap();

        tree
    }

    #[test]
    fn untracked_time_within_clock_jitter_is_not_reported() {
        let tree = root_with_one_child(Duration::from_millis(10), Duration::from_micros(5));

        let node = ReportNode::from_regions(&tree);

        assert_eq!(node.children().len(), 1);
        assert!(node.child(OTHER_REGION_NAME).is_none());
    }

    #[test]
    fn small_share_of_untracked_time_is_still_reported() {
        // 5 ms out of 10 s.
        let tree = root_with_one_child(Duration::from_millis(9995), Duration::from_millis(5));

        let node = ReportNode::from_regions(&tree);

        assert_eq!(node.value(), 10.0);
        assert!((node.time_in_other() - 0.005).abs() < 1e-12);
        assert!((children_sum(&node) - node.value()).abs() < 1e-12);
    }

    #[test]
    fn children_are_sorted_by_value_then_name() {
        let clock = FakeClock::new();
        let mut tree = RegionTree::new("root", ClockFacade::fake(clock.clone()));
        let root = tree.root();

        tree.start_time(root).unwrap();
        for (name, millis) in [("small", 1), ("beta", 5), ("alpha", 5), ("large", 9)] {
            let id = tree.subregion(root, name).unwrap();
            run(&mut tree, &clock, id, millis);
        }
        tree.end_time(root).unwrap();

        let node = ReportNode::from_regions(&tree);

        let names: Vec<_> = node.children().iter().map(ReportNode::name).collect();
        assert_eq!(names, ["large", "alpha", "beta", "small"]);
    }

    #[test]
    fn every_inner_node_equals_sum_of_children() {
        fn check(node: &ReportNode) {
            if !node.children().is_empty() {
                assert!((children_sum(node) - node.value()).abs() < 1e-12, "{node:?}");
            }
            node.children().iter().for_each(check);
        }

        let clock = FakeClock::new();
        let mut tree = RegionTree::new("root", ClockFacade::fake(clock.clone()));
        let root = tree.root();

        tree.start_time(root).unwrap();
        clock.advance_millis(2);
        let outer = tree.subregion(root, "outer").unwrap();
        tree.start_time(outer).unwrap();
        clock.advance_millis(3);
        let inner = tree.subregion(outer, "inner").unwrap();
        run(&mut tree, &clock, inner, 4);
        clock.advance_millis(5);
        tree.end_time(outer).unwrap();
        clock.advance_millis(6);
        tree.end_time(root).unwrap();

        check(&ReportNode::from_regions(&tree));
    }
}
