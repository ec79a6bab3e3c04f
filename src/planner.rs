//! Placement planner.
//!
//! Chooses a container, position and orientation for unplaced items:
//! - containers are filtered by activity and remaining weight capacity
//! - candidates are ranked by zone match, accessibility for important
//!   items, free volume and utilization
//! - positions come from the container index in scan order, so the first
//!   fit found is committed without further scoring
//!
//! Batch placement never aborts on a single item: items that cannot be
//! placed are reported with an [`UnplacedReason`] and the batch proceeds.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult, ValidationError};
use crate::geometry::Orientation;
use crate::index::{ContainerIndex, Occupancy, scan_key};
use crate::model::{ContainerId, Item, ItemId, PlacedAt};
use crate::types::{Dims, Point3};

/// Tunable heuristics shared by the planners.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlannerConfig {
    /// Reorient items that do not fit in their native orientation.
    pub allow_rotation: bool,
    /// Items at or above this priority prefer positions near the open face.
    pub high_priority_threshold: u8,
    /// Containers below this utilization are consolidation sources.
    pub low_utilization_percent: f64,
    /// Containers above this utilization shed items.
    pub high_utilization_percent: f64,
}

impl PlannerConfig {
    pub const DEFAULT_ALLOW_ROTATION: bool = true;
    pub const DEFAULT_HIGH_PRIORITY_THRESHOLD: u8 = 70;
    pub const DEFAULT_LOW_UTILIZATION_PERCENT: f64 = 30.0;
    pub const DEFAULT_HIGH_UTILIZATION_PERCENT: f64 = 90.0;

    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    /// Orientations to try for `dims`, identity first.
    pub fn orientations_for(&self, dims: Dims) -> Vec<Orientation> {
        if self.allow_rotation {
            Orientation::distinct_for(dims)
        } else {
            vec![Orientation::default()]
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            allow_rotation: Self::DEFAULT_ALLOW_ROTATION,
            high_priority_threshold: Self::DEFAULT_HIGH_PRIORITY_THRESHOLD,
            low_utilization_percent: Self::DEFAULT_LOW_UTILIZATION_PERCENT,
            high_utilization_percent: Self::DEFAULT_HIGH_UTILIZATION_PERCENT,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn allow_rotation(mut self, allow: bool) -> Self {
        self.config.allow_rotation = allow;
        self
    }

    pub fn high_priority_threshold(mut self, threshold: u8) -> Self {
        self.config.high_priority_threshold = threshold.min(100);
        self
    }

    pub fn low_utilization_percent(mut self, percent: f64) -> Self {
        self.config.low_utilization_percent = percent;
        self
    }

    pub fn high_utilization_percent(mut self, percent: f64) -> Self {
        self.config.high_utilization_percent = percent;
        self
    }

    pub fn build(self) -> PlannerConfig {
        self.config
    }
}

/// Why an item could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    NoCapacity,
    NoGeometricFit,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::NoCapacity => "no_capacity",
            UnplacedReason::NoGeometricFit => "no_geometric_fit",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::NoCapacity => {
                write!(f, "No active container can carry the item's mass")
            }
            UnplacedReason::NoGeometricFit => {
                write!(f, "No free position fits the item in any orientation")
            }
        }
    }
}

/// Outcome of a single placement attempt.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlacementDecision {
    Placed {
        container_id: ContainerId,
        position: Point3,
        orientation: Orientation,
    },
    Unplaceable { reason: UnplacedReason },
}

impl PlacementDecision {
    pub fn placed_at(&self) -> Option<PlacedAt> {
        match self {
            PlacementDecision::Placed {
                container_id,
                position,
                orientation,
            } => Some(PlacedAt {
                container_id: container_id.clone(),
                position: *position,
                orientation: *orientation,
            }),
            PlacementDecision::Unplaceable { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PlacedItem {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub position: Point3,
    pub orientation: Orientation,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct UnplacedItem {
    pub item_id: ItemId,
    pub reason: UnplacedReason,
}

/// Result of a batch placement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct PlacementReport {
    pub placed: Vec<PlacedItem>,
    pub unplaced: Vec<UnplacedItem>,
}

impl PlacementReport {
    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }
}

/// Progress events emitted during batch placement, suitable for SSE.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum PlacementEvent {
    ItemPlaced {
        item_id: ItemId,
        container_id: ContainerId,
        position: Point3,
        orientation: Orientation,
        extents: Dims,
        container_weight: f64,
    },
    ItemRejected {
        item_id: ItemId,
        mass: f64,
        dims: Dims,
        reason_code: String,
        reason_text: String,
    },
    Finished { placed: usize, unplaced: usize },
}

/// Earliest position for `item` in `occupancy`.
///
/// The native orientation wins whenever it fits anywhere. Otherwise the
/// rotated orientation whose first candidate comes earliest in scan order is
/// used, ties going to the canonical orientation order.
pub fn best_fit(
    occupancy: &Occupancy,
    item: &Item,
    config: &PlannerConfig,
) -> Option<(Point3, Orientation)> {
    let axis = occupancy.container().retrieval_axis;
    let mut orientations = config.orientations_for(item.dims).into_iter();
    let native = orientations.next()?;
    if let Some(position) = occupancy.candidate_positions(native.apply(item.dims)).next() {
        return Some((position, native));
    }

    orientations
        .filter_map(|orientation| {
            occupancy
                .candidate_positions(orientation.apply(item.dims))
                .next()
                .map(|position| (position, orientation))
        })
        .min_by_key(|(position, orientation)| (scan_key(axis, position), *orientation))
}

struct Candidate<'a> {
    occupancy: &'a Occupancy,
    zone_match: bool,
    fit: Option<(Point3, Orientation)>,
}

fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>, accessibility: bool) -> Ordering {
    let face_distance = |candidate: &Candidate<'_>| {
        let axis = candidate.occupancy.container().retrieval_axis;
        candidate
            .fit
            .map(|(position, _)| axis.of_point(&position))
            .unwrap_or(u32::MAX)
    };

    b.zone_match
        .cmp(&a.zone_match)
        .then_with(|| {
            if accessibility {
                face_distance(a).cmp(&face_distance(b))
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.occupancy.free_volume().cmp(&a.occupancy.free_volume()))
        .then_with(|| {
            a.occupancy
                .utilization_percent()
                .total_cmp(&b.occupancy.utilization_percent())
        })
        .then_with(|| a.occupancy.id().cmp(b.occupancy.id()))
}

/// Chooses a placement for `item` without changing the index.
pub fn find_placement(
    index: &ContainerIndex,
    item: &Item,
    config: &PlannerConfig,
) -> PlacementDecision {
    let mut candidates: Vec<Candidate<'_>> = index
        .occupancies()
        .filter(|occupancy| occupancy.container().is_active)
        .filter(|occupancy| occupancy.can_carry(item.mass, occupancy.container().max_weight))
        .map(|occupancy| Candidate {
            occupancy,
            zone_match: occupancy
                .container()
                .matches_zone(item.preferred_zone.as_deref()),
            fit: None,
        })
        .collect();

    if candidates.is_empty() {
        return PlacementDecision::Unplaceable {
            reason: UnplacedReason::NoCapacity,
        };
    }

    let accessibility = item.priority >= config.high_priority_threshold;
    if accessibility {
        for candidate in &mut candidates {
            candidate.fit = best_fit(candidate.occupancy, item, config);
        }
        candidates.retain(|candidate| candidate.fit.is_some());
    }
    candidates.sort_by(|a, b| compare_candidates(a, b, accessibility));

    for candidate in candidates {
        let fit = candidate
            .fit
            .or_else(|| best_fit(candidate.occupancy, item, config));
        if let Some((position, orientation)) = fit {
            return PlacementDecision::Placed {
                container_id: candidate.occupancy.id().to_owned(),
                position,
                orientation,
            };
        }
    }

    PlacementDecision::Unplaceable {
        reason: UnplacedReason::NoGeometricFit,
    }
}

fn unplaced_item<'a>(index: &'a ContainerIndex, item_id: &str) -> CargoResult<&'a Item> {
    let item = index.item(item_id)?;
    if let Some(container_id) = item.container_id() {
        return Err(ValidationError::InvalidPlacement(format!(
            "item {} is already placed in container {}",
            item_id, container_id
        ))
        .into());
    }
    Ok(item)
}

/// Places one unplaced item and commits the result.
pub fn place(
    index: &mut ContainerIndex,
    item_id: &str,
    config: &PlannerConfig,
) -> CargoResult<PlacementDecision> {
    let decision = find_placement(index, unplaced_item(index, item_id)?, config);
    if let Some(at) = decision.placed_at() {
        index.commit(&at.container_id, item_id, at.position, at.orientation)?;
        debug!(
            item = item_id,
            container = %at.container_id,
            orientation = ?at.orientation,
            "placed item"
        );
    }
    Ok(decision)
}

/// Places an unplaced item into a fixed container under `ceiling` kg.
///
/// Activity is not checked: the caller chose the target deliberately.
pub fn place_in(
    index: &mut ContainerIndex,
    item_id: &str,
    container_id: &str,
    ceiling: f64,
    config: &PlannerConfig,
) -> CargoResult<PlacedAt> {
    let item = unplaced_item(index, item_id)?;
    let occupancy = index.occupancy(container_id)?;
    let limit = occupancy.container().max_weight.min(ceiling);
    if !occupancy.can_carry(item.mass, limit) {
        return Err(CargoError::CapacityExceeded {
            container_id: container_id.to_owned(),
            requested: item.mass,
            current: occupancy.current_weight(),
            limit,
        });
    }
    let (position, orientation) =
        best_fit(occupancy, item, config).ok_or_else(|| CargoError::NoGeometricFit {
            item_id: item_id.to_owned(),
        })?;

    index.commit_with_ceiling(container_id, item_id, position, orientation, ceiling)?;
    Ok(PlacedAt {
        container_id: container_id.to_owned(),
        position,
        orientation,
    })
}

/// Batch processing order: priority descending, expiry ascending with
/// undated items last, then id.
pub fn batch_order(index: &ContainerIndex, item_ids: &[ItemId]) -> CargoResult<Vec<ItemId>> {
    let mut items = item_ids
        .iter()
        .map(|id| unplaced_item(index, id))
        .collect::<CargoResult<Vec<_>>>()?;
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.expiry_key().cmp(&b.expiry_key()))
            .then_with(|| a.id.cmp(&b.id))
    });
    items.dedup_by(|a, b| a.id == b.id);
    Ok(items.into_iter().map(|item| item.id.clone()).collect())
}

pub fn place_batch(
    index: &mut ContainerIndex,
    item_ids: &[ItemId],
    config: &PlannerConfig,
) -> CargoResult<PlacementReport> {
    place_batch_with_progress(index, item_ids, config, |_| {})
}

/// Batch placement with a progress callback.
///
/// Every id is validated before the first commit: unknown or already placed
/// items fail the call without changing the index.
pub fn place_batch_with_progress(
    index: &mut ContainerIndex,
    item_ids: &[ItemId],
    config: &PlannerConfig,
    mut on_event: impl FnMut(&PlacementEvent),
) -> CargoResult<PlacementReport> {
    let order = batch_order(index, item_ids)?;
    let mut report = PlacementReport::default();

    for item_id in order {
        match place(index, &item_id, config)? {
            PlacementDecision::Placed {
                container_id,
                position,
                orientation,
            } => {
                let extents = orientation.apply(index.item(&item_id)?.dims);
                let container_weight = index.occupancy(&container_id)?.current_weight();
                on_event(&PlacementEvent::ItemPlaced {
                    item_id: item_id.clone(),
                    container_id: container_id.clone(),
                    position,
                    orientation,
                    extents,
                    container_weight,
                });
                report.placed.push(PlacedItem {
                    item_id,
                    container_id,
                    position,
                    orientation,
                });
            }
            PlacementDecision::Unplaceable { reason } => {
                let item = index.item(&item_id)?;
                debug!(item = %item_id, reason = reason.code(), "item rejected");
                on_event(&PlacementEvent::ItemRejected {
                    item_id: item_id.clone(),
                    mass: item.mass,
                    dims: item.dims,
                    reason_code: reason.code().to_string(),
                    reason_text: reason.to_string(),
                });
                report.unplaced.push(UnplacedItem { item_id, reason });
            }
        }
    }

    on_event(&PlacementEvent::Finished {
        placed: report.placed_count(),
        unplaced: report.unplaced_count(),
    });
    info!(
        placed = report.placed_count(),
        unplaced = report.unplaced_count(),
        "batch placement finished"
    );
    Ok(report)
}
