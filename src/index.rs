//! Container index: the system of record for what is where.
//!
//! The index owns every container, every item and the occupancy record of
//! each container (placed footprints plus maximal free regions). All
//! placement changes go through [`ContainerIndex::commit`] and
//! [`ContainerIndex::release`]; both validate fully before touching any
//! state, so a failed call leaves the index unchanged.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CargoError, CargoResult, ValidationError};
use crate::geometry::{Orientation, carve, fits, intersects, maximal_free_regions};
use crate::model::{Container, ContainerId, Item, ItemId, PlacedAt, Placement};
use crate::types::{Axis, Cuboid, Dims, EPSILON_MASS, Point3};

/// Scan order for positions: distance from the open face, then z, y, x.
#[inline]
pub fn scan_key(axis: Axis, position: &Point3) -> (u32, u32, u32, u32) {
    (axis.of_point(position), position.z, position.y, position.x)
}

#[derive(Clone, Debug, PartialEq)]
struct PlacedEntry {
    footprint: Cuboid,
    mass: f64,
}

/// Occupancy record of a single container.
#[derive(Clone, Debug, PartialEq)]
pub struct Occupancy {
    container: Container,
    placed: BTreeMap<ItemId, PlacedEntry>,
    free: Vec<Cuboid>,
    current_weight: f64,
}

impl Occupancy {
    fn new(container: Container) -> Self {
        let free = vec![container.bounds()];
        Self {
            container,
            placed: BTreeMap::new(),
            free,
            current_weight: 0.0,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn id(&self) -> &str {
        &self.container.id
    }

    /// Sum of the masses of all contained items.
    pub fn current_weight(&self) -> f64 {
        self.current_weight
    }

    pub fn remaining_weight(&self) -> f64 {
        (self.container.max_weight - self.current_weight).max(0.0)
    }

    pub fn used_volume(&self) -> u64 {
        self.placed.values().map(|entry| entry.footprint.volume()).sum()
    }

    pub fn free_volume(&self) -> u64 {
        self.container.dims.volume().saturating_sub(self.used_volume())
    }

    /// Used volume as a percentage of the container volume.
    pub fn utilization_percent(&self) -> f64 {
        let total = self.container.dims.volume();
        if total == 0 {
            return 0.0;
        }
        self.used_volume() as f64 / total as f64 * 100.0
    }

    /// Maximal free regions in canonical scan order.
    pub fn free_regions(&self) -> &[Cuboid] {
        &self.free
    }

    pub fn len(&self) -> usize {
        self.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.placed.contains_key(item_id)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> + '_ {
        self.placed.keys()
    }

    pub fn footprint(&self, item_id: &str) -> Option<Cuboid> {
        self.placed.get(item_id).map(|entry| entry.footprint)
    }

    pub fn footprints(&self) -> impl Iterator<Item = (&ItemId, &Cuboid)> + '_ {
        self.placed.iter().map(|(id, entry)| (id, &entry.footprint))
    }

    /// Room for `mass` more kg under `limit`.
    pub fn can_carry(&self, mass: f64, limit: f64) -> bool {
        self.current_weight + mass <= limit + EPSILON_MASS
    }

    /// `candidate` lies inside the container and in free space.
    pub fn is_free(&self, candidate: &Cuboid) -> bool {
        self.container.bounds().contains(candidate) && fits(&self.free, candidate)
    }

    /// Positions where a box with `extents` fits, in scan order.
    ///
    /// Only minimum corners of maximal free regions are produced: the
    /// earliest feasible position in scan order is always one of them.
    pub fn candidate_positions(&self, extents: Dims) -> impl Iterator<Item = Point3> + '_ {
        let mut last: Option<Point3> = None;
        self.free
            .iter()
            .filter(move |region| extents.fits_within(&region.dims))
            .filter_map(move |region| {
                if last == Some(region.origin) {
                    None
                } else {
                    last = Some(region.origin);
                    Some(region.origin)
                }
            })
    }

    fn sort_free(&mut self) {
        let axis = self.container.retrieval_axis;
        self.free
            .sort_by_key(|region| (scan_key(axis, &region.origin), region.dims));
    }

    fn rebuild(&mut self) {
        let bounds = self.container.bounds();
        self.free = maximal_free_regions(bounds, self.placed.values().map(|e| &e.footprint));
        self.sort_free();
        self.current_weight = self.placed.values().map(|e| e.mass).sum();
    }
}

/// Owner of all containers, items and placement state.
#[derive(Clone, Debug, Default)]
pub struct ContainerIndex {
    occupancies: BTreeMap<ContainerId, Occupancy>,
    items: BTreeMap<ItemId, Item>,
}

impl ContainerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty container.
    pub fn insert_container(&mut self, container: Container) -> CargoResult<()> {
        if self.occupancies.contains_key(&container.id) {
            return Err(ValidationError::DuplicateId(container.id).into());
        }
        self.occupancies
            .insert(container.id.clone(), Occupancy::new(container));
        Ok(())
    }

    /// Registers an item. Its placement is reset to `Unplaced`; use
    /// [`commit`](Self::commit) to place it.
    pub fn insert_item(&mut self, mut item: Item) -> CargoResult<()> {
        if self.items.contains_key(&item.id) {
            return Err(ValidationError::DuplicateId(item.id).into());
        }
        item.placement = Placement::Unplaced;
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Destroys an item, releasing it first if it is placed.
    pub fn remove_item(&mut self, item_id: &str) -> CargoResult<Item> {
        if let Some(container_id) = self.item(item_id)?.container_id().map(str::to_owned) {
            self.release(&container_id, item_id)?;
        }
        self.items
            .remove(item_id)
            .ok_or_else(|| CargoError::item_not_found(item_id))
    }

    pub fn container(&self, container_id: &str) -> CargoResult<&Container> {
        self.occupancy(container_id).map(Occupancy::container)
    }

    pub fn occupancy(&self, container_id: &str) -> CargoResult<&Occupancy> {
        self.occupancies
            .get(container_id)
            .ok_or_else(|| CargoError::container_not_found(container_id))
    }

    pub fn occupancies(&self) -> impl Iterator<Item = &Occupancy> + '_ {
        self.occupancies.values()
    }

    pub fn container_count(&self) -> usize {
        self.occupancies.len()
    }

    pub fn item(&self, item_id: &str) -> CargoResult<&Item> {
        self.items
            .get(item_id)
            .ok_or_else(|| CargoError::item_not_found(item_id))
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn usage_limit_mut(&mut self, item_id: &str) -> CargoResult<&mut Option<u32>> {
        self.items
            .get_mut(item_id)
            .map(|item| &mut item.usage_limit)
            .ok_or_else(|| CargoError::item_not_found(item_id))
    }

    /// Candidate positions for `item_id` in `orientation`, in scan order.
    pub fn candidate_positions(
        &self,
        container_id: &str,
        item_id: &str,
        orientation: Orientation,
    ) -> CargoResult<impl Iterator<Item = Point3> + '_> {
        let extents = orientation.apply(self.item(item_id)?.dims);
        Ok(self.occupancy(container_id)?.candidate_positions(extents))
    }

    /// Places an unplaced item under the container's own weight limit.
    pub fn commit(
        &mut self,
        container_id: &str,
        item_id: &str,
        position: Point3,
        orientation: Orientation,
    ) -> CargoResult<()> {
        self.commit_with_ceiling(container_id, item_id, position, orientation, f64::INFINITY)
    }

    /// Places an unplaced item; the weight limit is the lower of the
    /// container's `max_weight` and `ceiling`.
    pub fn commit_with_ceiling(
        &mut self,
        container_id: &str,
        item_id: &str,
        position: Point3,
        orientation: Orientation,
        ceiling: f64,
    ) -> CargoResult<()> {
        let item = self.item(item_id)?;
        if let Some(current) = item.container_id() {
            return Err(ValidationError::InvalidPlacement(format!(
                "item {} is already placed in container {}",
                item_id, current
            ))
            .into());
        }
        let mass = item.mass;
        let footprint = Cuboid::new(position, orientation.apply(item.dims));

        let occupancy = self
            .occupancies
            .get_mut(container_id)
            .ok_or_else(|| CargoError::container_not_found(container_id))?;

        let limit = occupancy.container.max_weight.min(ceiling);
        if !occupancy.can_carry(mass, limit) {
            return Err(CargoError::CapacityExceeded {
                container_id: container_id.to_owned(),
                requested: mass,
                current: occupancy.current_weight,
                limit,
            });
        }
        if !occupancy.is_free(&footprint) {
            return Err(CargoError::Overlap {
                container_id: container_id.to_owned(),
                item_id: item_id.to_owned(),
            });
        }

        occupancy.placed.insert(
            item_id.to_owned(),
            PlacedEntry { footprint, mass },
        );
        carve(&mut occupancy.free, &footprint);
        occupancy.sort_free();
        occupancy.current_weight = occupancy.placed.values().map(|e| e.mass).sum();

        if let Some(item) = self.items.get_mut(item_id) {
            item.placement = Placement::Placed {
                container_id: container_id.to_owned(),
                position,
                orientation,
            };
        }
        debug!(
            item = item_id,
            container = container_id,
            x = position.x,
            y = position.y,
            z = position.z,
            "committed placement"
        );
        Ok(())
    }

    /// Takes an item out of a container and returns where it was.
    pub fn release(&mut self, container_id: &str, item_id: &str) -> CargoResult<PlacedAt> {
        let at = self
            .item(item_id)?
            .placement()
            .placed_at()
            .filter(|at| at.container_id == container_id)
            .ok_or_else(|| CargoError::NotFound {
                entity: "item in container",
                id: format!("{}/{}", container_id, item_id),
            })?;

        let occupancy = self
            .occupancies
            .get_mut(container_id)
            .ok_or_else(|| CargoError::container_not_found(container_id))?;
        occupancy.placed.remove(item_id);
        occupancy.rebuild();

        if let Some(item) = self.items.get_mut(item_id) {
            item.placement = Placement::Unplaced;
        }
        debug!(item = item_id, container = container_id, "released placement");
        Ok(at)
    }

    /// Re-commits an item exactly where it was before a release.
    pub(crate) fn restore(&mut self, item_id: &str, at: &PlacedAt) -> CargoResult<()> {
        self.commit(&at.container_id, item_id, at.position, at.orientation)
    }

    pub fn free_volume(&self, container_id: &str) -> CargoResult<u64> {
        self.occupancy(container_id).map(Occupancy::free_volume)
    }

    pub fn utilization_percent(&self, container_id: &str) -> CargoResult<f64> {
        self.occupancy(container_id).map(Occupancy::utilization_percent)
    }

    /// Checks every container invariant and returns the violations found.
    ///
    /// An empty result means weights are within limits, footprints are in
    /// bounds and disjoint, and free regions match a fresh rebuild.
    pub fn audit(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for occupancy in self.occupancies.values() {
            let id = occupancy.id();
            let bounds = occupancy.container.bounds();
            if occupancy.current_weight > occupancy.container.max_weight + EPSILON_MASS {
                violations.push(format!("{}: weight over limit", id));
            }
            if occupancy.used_volume() > occupancy.container.dims.volume() {
                violations.push(format!("{}: volume over limit", id));
            }
            let entries: Vec<_> = occupancy.placed.iter().collect();
            for (i, (item_id, entry)) in entries.iter().enumerate() {
                if !bounds.contains(&entry.footprint) {
                    violations.push(format!("{}: {} out of bounds", id, item_id));
                }
                for (other_id, other) in &entries[i + 1..] {
                    if intersects(&entry.footprint, &other.footprint) {
                        violations.push(format!("{}: {} overlaps {}", id, item_id, other_id));
                    }
                }
                let recorded = self
                    .items
                    .get(item_id.as_str())
                    .and_then(|item| item.footprint());
                if recorded != Some(entry.footprint) {
                    violations.push(format!("{}: {} placement out of sync", id, item_id));
                }
            }
            let mut fresh = occupancy.clone();
            fresh.rebuild();
            if fresh.free != occupancy.free {
                violations.push(format!("{}: free regions out of sync", id));
            }
        }
        violations
    }
}

#[derive(Clone, Debug)]
enum JournalEntry {
    Released { item_id: ItemId, at: PlacedAt },
    Committed { item_id: ItemId, container_id: ContainerId },
}

/// Undo log for multi-step plans.
///
/// Every release and commit made through the journal is recorded so that
/// a failed plan can be unwound in reverse order.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn release(
        &mut self,
        index: &mut ContainerIndex,
        container_id: &str,
        item_id: &str,
    ) -> CargoResult<PlacedAt> {
        let at = index.release(container_id, item_id)?;
        self.entries.push(JournalEntry::Released {
            item_id: item_id.to_owned(),
            at: at.clone(),
        });
        Ok(at)
    }

    /// Records a commit the caller has already made.
    pub(crate) fn committed(&mut self, item_id: &str, container_id: &str) {
        self.entries.push(JournalEntry::Committed {
            item_id: item_id.to_owned(),
            container_id: container_id.to_owned(),
        });
    }

    /// Unwinds every recorded step, newest first.
    pub(crate) fn rollback(self, index: &mut ContainerIndex) {
        for entry in self.entries.into_iter().rev() {
            let outcome = match &entry {
                JournalEntry::Released { item_id, at } => index.restore(item_id, at),
                JournalEntry::Committed {
                    item_id,
                    container_id,
                } => index.release(container_id, item_id).map(|_| ()),
            };
            if let Err(err) = outcome {
                tracing::error!(?entry, %err, "rollback step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(container: Container, items: Vec<Item>) -> ContainerIndex {
        let mut index = ContainerIndex::new();
        index.insert_container(container).unwrap();
        for item in items {
            index.insert_item(item).unwrap();
        }
        index
    }

    fn cube_container(id: &str, side: u32, max_weight: f64) -> Container {
        Container::new(id, "A", Dims::new(side, side, side), max_weight).unwrap()
    }

    fn cube(id: &str, side: u32, mass: f64) -> Item {
        Item::new(id, id, Dims::new(side, side, side), mass).unwrap()
    }

    #[test]
    fn empty_container_offers_origin_first() {
        let index = index_with(cube_container("c", 100, 100.0), vec![cube("a", 50, 1.0)]);
        let first = index
            .candidate_positions("c", "a", Orientation::WidthDepthHeight)
            .unwrap()
            .next();
        assert_eq!(first, Some(Point3::origin()));
    }

    #[test]
    fn candidates_follow_scan_order() {
        let mut index = index_with(
            cube_container("c", 100, 100.0),
            vec![cube("a", 50, 1.0), cube("b", 50, 1.0)],
        );
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();

        let candidates: Vec<_> = index
            .candidate_positions("c", "b", Orientation::WidthDepthHeight)
            .unwrap()
            .collect();
        assert_eq!(
            candidates,
            vec![
                Point3::new(50, 0, 0),
                Point3::new(0, 0, 50),
                Point3::new(0, 50, 0),
            ]
        );
    }

    #[test]
    fn commit_rejects_overweight() {
        let mut index = index_with(cube_container("c", 100, 10.0), vec![cube("a", 10, 11.0)]);
        let err = index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap_err();
        assert!(matches!(err, CargoError::CapacityExceeded { .. }));
        assert!(!index.item("a").unwrap().is_placed());
        assert_eq!(index.occupancy("c").unwrap().current_weight(), 0.0);
    }

    #[test]
    fn commit_rejects_overlap_and_out_of_bounds() {
        let mut index = index_with(
            cube_container("c", 100, 100.0),
            vec![cube("a", 50, 1.0), cube("b", 50, 1.0)],
        );
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        let before = index.occupancy("c").unwrap().clone();

        let overlap = index
            .commit("c", "b", Point3::new(25, 0, 0), Orientation::WidthDepthHeight)
            .unwrap_err();
        assert!(matches!(overlap, CargoError::Overlap { .. }));

        let outside = index
            .commit("c", "b", Point3::new(60, 0, 0), Orientation::WidthDepthHeight)
            .unwrap_err();
        assert!(matches!(outside, CargoError::Overlap { .. }));
        assert_eq!(index.occupancy("c").unwrap(), &before);
    }

    #[test]
    fn commit_rejects_already_placed_item() {
        let mut index = index_with(cube_container("c", 100, 100.0), vec![cube("a", 10, 1.0)]);
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        let err = index
            .commit("c", "a", Point3::new(50, 0, 0), Orientation::WidthDepthHeight)
            .unwrap_err();
        assert!(matches!(err, CargoError::Validation(_)));
    }

    #[test]
    fn ceiling_overrides_container_limit() {
        let mut index = index_with(cube_container("c", 100, 100.0), vec![cube("a", 10, 6.0)]);
        let err = index
            .commit_with_ceiling("c", "a", Point3::origin(), Orientation::WidthDepthHeight, 5.0)
            .unwrap_err();
        assert!(matches!(err, CargoError::CapacityExceeded { limit, .. } if limit == 5.0));
    }

    #[test]
    fn release_round_trip_restores_free_space() {
        let mut index = index_with(
            cube_container("c", 100, 100.0),
            vec![cube("a", 30, 1.0), cube("b", 20, 2.0)],
        );
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        let before = index.occupancy("c").unwrap().clone();

        index
            .commit("c", "b", Point3::new(30, 0, 0), Orientation::WidthDepthHeight)
            .unwrap();
        assert_eq!(index.occupancy("c").unwrap().current_weight(), 3.0);

        let at = index.release("c", "b").unwrap();
        assert_eq!(at.position, Point3::new(30, 0, 0));
        assert_eq!(index.occupancy("c").unwrap(), &before);
        assert!(!index.item("b").unwrap().is_placed());
        assert!(index.audit().is_empty());
    }

    #[test]
    fn release_requires_matching_container() {
        let mut index = index_with(cube_container("c", 100, 100.0), vec![cube("a", 10, 1.0)]);
        index.insert_container(cube_container("d", 100, 100.0)).unwrap();
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();

        assert!(matches!(
            index.release("d", "a"),
            Err(CargoError::NotFound { .. })
        ));
        assert!(matches!(
            index.release("c", "missing"),
            Err(CargoError::NotFound { .. })
        ));
        index.release("c", "a").unwrap();
        assert!(matches!(
            index.release("c", "a"),
            Err(CargoError::NotFound { .. })
        ));
    }

    #[test]
    fn derived_queries() {
        let mut index = index_with(cube_container("c", 10, 100.0), vec![cube("a", 5, 1.0)]);
        assert_eq!(index.free_volume("c").unwrap(), 1000);
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        assert_eq!(index.free_volume("c").unwrap(), 875);
        assert!((index.utilization_percent("c").unwrap() - 12.5).abs() < 1e-9);
        assert!(index.free_volume("nope").is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut index = index_with(cube_container("c", 10, 100.0), vec![cube("a", 5, 1.0)]);
        assert!(index.insert_container(cube_container("c", 10, 1.0)).is_err());
        assert!(index.insert_item(cube("a", 1, 1.0)).is_err());
    }

    #[test]
    fn remove_item_releases_first() {
        let mut index = index_with(cube_container("c", 10, 100.0), vec![cube("a", 5, 1.0)]);
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        let removed = index.remove_item("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(index.occupancy("c").unwrap().is_empty());
        assert_eq!(index.occupancy("c").unwrap().free_regions().len(), 1);
        assert!(index.item("a").is_err());
    }

    #[test]
    fn journal_rollback_restores_previous_state() {
        let mut index = index_with(
            cube_container("c", 100, 100.0),
            vec![cube("a", 50, 1.0), cube("b", 50, 1.0)],
        );
        index.insert_container(cube_container("d", 100, 100.0)).unwrap();
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        index
            .commit("c", "b", Point3::new(50, 0, 0), Orientation::WidthDepthHeight)
            .unwrap();
        let before = index.clone();

        let mut journal = Journal::new();
        journal.release(&mut index, "c", "a").unwrap();
        index
            .commit("d", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        journal.committed("a", "d");
        journal.release(&mut index, "c", "b").unwrap();
        journal.rollback(&mut index);

        assert_eq!(index.occupancy("c").unwrap(), before.occupancy("c").unwrap());
        assert_eq!(index.occupancy("d").unwrap(), before.occupancy("d").unwrap());
        assert_eq!(index.item("a").unwrap(), before.item("a").unwrap());
        assert!(index.audit().is_empty());
    }

    #[test]
    fn free_regions_follow_retrieval_axis() {
        let container = Container::new("c", "A", Dims::new(100, 100, 100), 100.0)
            .unwrap()
            .with_retrieval_axis(Axis::Width);
        let mut index = index_with(container, vec![cube("a", 50, 1.0), cube("b", 50, 1.0)]);
        index
            .commit("c", "a", Point3::origin(), Orientation::WidthDepthHeight)
            .unwrap();
        let first = index
            .candidate_positions("c", "b", Orientation::WidthDepthHeight)
            .unwrap()
            .next();
        assert_eq!(first, Some(Point3::new(0, 50, 0)));
    }
}
