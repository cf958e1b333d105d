//! Named regions of code and the arena that owns them.

use std::time::{Duration, Instant};

use foldhash::{HashMap, HashMapExt};
use tracing::trace;

use crate::pal::{Clock, ClockFacade};
use crate::{Error, OTHER_REGION_NAME, Result};

/// Identifies a region within the [`RegionTree`] that created it.
///
/// Identifiers are only meaningful for the tree that handed them out. After a region is
/// discarded by [`RegionTree::clear()`], its identifier may be reused for a new region.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RegionId(usize);

impl RegionId {
    const ROOT: Self = Self(0);
}

/// One named region of code within one thread's trace.
///
/// The region accumulates the time spent between matching start and end events, inclusive of
/// all time spent in its sub-regions.
#[derive(Debug)]
pub struct Region {
    name: Box<str>,
    parent: Option<RegionId>,

    // Keyed by the name itself, so two distinct names can never share an entry.
    children: HashMap<Box<str>, RegionId>,

    accumulated: Duration,

    // Some while the region is open.
    pending_start: Option<Instant>,
}

impl Region {
    fn new(name: Box<str>, parent: Option<RegionId>) -> Self {
        Self {
            name,
            parent,
            children: HashMap::new(),
            accumulated: Duration::ZERO,
            pending_start: None,
        }
    }

    /// The name of the region, unique among its siblings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The region this one is nested in. `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    /// Whether the region is between a start and the matching end event.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.pending_start.is_some()
    }

    /// Total time accumulated by the region, including its sub-regions.
    ///
    /// An interval that is still open is not included.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.accumulated
    }

    /// Iterates over the names and identifiers of the direct sub-regions, in no particular order.
    pub fn children(&self) -> impl Iterator<Item = (&str, RegionId)> {
        self.children.iter().map(|(name, id)| (&**name, *id))
    }

    /// Whether the region has any sub-regions.
    #[must_use]
    pub fn has_subregions(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Owns a tree of regions, with the root region always present.
///
/// Regions are stored in an arena and refer to their parent by [`RegionId`], so the parent
/// link never participates in ownership. Slots of discarded regions are recycled.
#[derive(Debug)]
pub struct RegionTree {
    slots: Vec<Option<Region>>,
    vacant: Vec<RegionId>,
    clock: ClockFacade,
}

impl RegionTree {
    pub(crate) fn new(root_name: impl Into<Box<str>>, clock: ClockFacade) -> Self {
        Self {
            slots: vec![Some(Region::new(root_name.into(), None))],
            vacant: Vec::new(),
            clock,
        }
    }

    /// The identifier of the root region.
    #[must_use]
    pub fn root(&self) -> RegionId {
        RegionId::ROOT
    }

    /// The region with the given identifier, if it is alive in this tree.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live regions, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.vacant.len())
    }

    /// Whether the tree has no live regions. Always false, as the root cannot be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sub-region of `parent` with the given name, created (closed) if it does not exist.
    pub(crate) fn subregion(&mut self, parent: RegionId, name: &str) -> Result<RegionId> {
        if let Some(existing) = self.get(parent).children.get(name) {
            return Ok(*existing);
        }

        if name == OTHER_REGION_NAME {
            return Err(Error::ReservedName {
                name: name.to_string(),
            });
        }

        let name: Box<str> = name.into();
        let region = Region::new(name.clone(), Some(parent));

        let id = if let Some(id) = self.vacant.pop() {
            *self
                .slots
                .get_mut(id.0)
                .expect("vacant slots are never removed from the arena") = Some(region);
            id
        } else {
            self.slots.push(Some(region));
            RegionId(self.slots.len().wrapping_sub(1))
        };

        trace!(
            parent = self.get(parent).name(),
            region = &*name,
            "created region"
        );

        self.get_mut(parent).children.insert(name, id);

        Ok(id)
    }

    /// Opens the region, recording the current clock reading as its pending start.
    pub(crate) fn start_time(&mut self, id: RegionId) -> Result<()> {
        let now = self.clock.now();
        let region = self.get_mut(id);

        if region.pending_start.is_some() {
            return Err(Error::AlreadyOpen {
                region: region.name.to_string(),
            });
        }

        region.pending_start = Some(now);
        Ok(())
    }

    /// Closes the region, adding the time elapsed since its pending start to its total.
    pub(crate) fn end_time(&mut self, id: RegionId) -> Result<()> {
        let region = self.slots.get_mut(id.0).and_then(Option::as_mut).expect(
            "region identifiers used by the profiler always refer to live regions in its tree",
        );

        let Some(start) = region.pending_start.take() else {
            return Err(Error::NotOpen {
                region: region.name.to_string(),
            });
        };

        region.accumulated = region
            .accumulated
            .checked_add(self.clock.elapsed(start))
            .expect("region time accumulation overflows Duration - this indicates an unrealistic scenario");

        Ok(())
    }

    /// Closes the region without adding the open interval to its total.
    pub(crate) fn abandon(&mut self, id: RegionId) {
        self.get_mut(id).pending_start = None;
    }

    /// Total time accumulated by the region, including its sub-regions.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a live region of this tree.
    #[must_use]
    pub fn total(&self, id: RegionId) -> Duration {
        self.get(id).total()
    }

    /// Sum of the totals of the direct sub-regions.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a live region of this tree.
    #[must_use]
    pub fn subregion_contributions(&self, id: RegionId) -> Duration {
        self.get(id)
            .children
            .values()
            .map(|child| self.get(*child).accumulated)
            .sum()
    }

    /// Time spent directly in the region, outside any of its sub-regions.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a live region of this tree.
    #[must_use]
    pub fn time_in_other(&self, id: RegionId) -> Duration {
        self.total(id)
            .saturating_sub(self.subregion_contributions(id))
    }

    /// Discards all descendants of the region and zeroes its accumulated time.
    ///
    /// If the region is open, its timer is restarted from the current clock reading.
    pub(crate) fn clear(&mut self, id: RegionId) {
        let now = self.clock.now();

        let region = self.get_mut(id);
        let mut pending: Vec<RegionId> = region.children.drain().map(|(_, child)| child).collect();
        region.accumulated = Duration::ZERO;
        if region.pending_start.is_some() {
            region.pending_start = Some(now);
        }

        if id == RegionId::ROOT {
            // Everything except the root is a descendant, so the arena can simply shrink.
            self.slots.truncate(1);
            self.vacant.clear();
            return;
        }

        while let Some(child) = pending.pop() {
            let removed = self
                .slots
                .get_mut(child.0)
                .and_then(Option::take)
                .expect("children always refer to live regions in the same tree");

            pending.extend(removed.children.into_values());
            self.vacant.push(child);
        }
    }

    pub(crate) fn clock(&self) -> &ClockFacade {
        &self.clock
    }

    /// Number of region levels between `id` and the root.
    #[cfg(test)]
    pub(crate) fn depth_of(&self, id: RegionId) -> usize {
        let mut depth = 0_usize;
        let mut cursor = self.get(id).parent;

        while let Some(parent) = cursor {
            depth = depth.wrapping_add(1);
            cursor = self.get(parent).parent;
        }

        depth
    }

    pub(crate) fn get(&self, id: RegionId) -> &Region {
        self.region(id).expect(
            "region identifiers used by the profiler always refer to live regions in its tree",
        )
    }

    fn get_mut(&mut self, id: RegionId) -> &mut Region {
        self.slots.get_mut(id.0).and_then(Option::as_mut).expect(
            "region identifiers used by the profiler always refer to live regions in its tree",
        )
    }
}
