//! Rearrangement advisor.
//!
//! Three independent rules look for improvements:
//! - **Consolidation** empties sparsely used containers into well used ones
//! - **LoadBalancing** sheds the least important items of crowded containers
//! - **ZoneCorrection** moves items into a container of their preferred zone
//!
//! Each (rule, source container) pair is simulated on its own scratch copy
//! of the index, so proposing never changes anything. Applying a plan is
//! journaled and rolls back completely on the first failing move.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult};
use crate::geometry::Orientation;
use crate::index::{ContainerIndex, Journal, Occupancy};
use crate::model::{ContainerId, ItemId};
use crate::planner::{PlannerConfig, place_in};
use crate::retrieval::blocking_items;
use crate::types::Point3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RearrangementReason {
    Consolidation,
    LoadBalancing,
    ZoneCorrection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Move {
    pub item_id: ItemId,
    pub from_container: ContainerId,
    pub to_container: ContainerId,
    pub reason: RearrangementReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RearrangementPlan {
    pub reason: RearrangementReason,
    pub source_container: ContainerId,
    pub moves: Vec<Move>,
    /// Moves plus the blockers that have to be shifted to reach each item.
    pub estimated_steps: usize,
}

/// A move as it was carried out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct AppliedMove {
    pub item_id: ItemId,
    pub from_container: ContainerId,
    pub to_container: ContainerId,
    pub position: Point3,
    pub orientation: Orientation,
}

fn by_utilization(a: &Occupancy, b: &Occupancy) -> Ordering {
    a.utilization_percent()
        .total_cmp(&b.utilization_percent())
        .then_with(|| a.id().cmp(b.id()))
}

/// Tries each target in order on `scratch`; restores the item on failure.
fn relocate(
    scratch: &mut ContainerIndex,
    source: &str,
    item_id: &str,
    targets: &[ContainerId],
    config: &PlannerConfig,
) -> Option<ContainerId> {
    let at = scratch.release(source, item_id).ok()?;
    for target in targets {
        if place_in(scratch, item_id, target, f64::INFINITY, config).is_ok() {
            return Some(target.clone());
        }
    }
    if let Err(err) = scratch.restore(item_id, &at) {
        warn!(item = item_id, %err, "could not restore item on scratch index");
    }
    None
}

/// Simulates moving `items` out of `source` on a scratch copy of the index.
///
/// `targets` ranks candidate containers for one item against the scratch
/// state; the source itself is never a target.
fn build_plan(
    index: &ContainerIndex,
    reason: RearrangementReason,
    source: &str,
    items: Vec<ItemId>,
    targets: impl Fn(&ContainerIndex, &str) -> Vec<ContainerId>,
    config: &PlannerConfig,
) -> Option<RearrangementPlan> {
    let mut scratch = index.clone();
    let mut moves = Vec::new();
    for item_id in items {
        let candidates: Vec<ContainerId> = targets(&scratch, &item_id)
            .into_iter()
            .filter(|target| target != source)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        if let Some(to_container) = relocate(&mut scratch, source, &item_id, &candidates, config) {
            moves.push(Move {
                item_id,
                from_container: source.to_owned(),
                to_container,
                reason,
            });
        }
    }
    if moves.is_empty() {
        return None;
    }

    let estimated_steps = moves
        .iter()
        .map(|m| 1 + blocking_items(index, &m.item_id).map_or(0, |b| b.len()))
        .sum();
    Some(RearrangementPlan {
        reason,
        source_container: source.to_owned(),
        moves,
        estimated_steps,
    })
}

fn consolidation(index: &ContainerIndex, config: &PlannerConfig) -> Vec<RearrangementPlan> {
    let low = config.low_utilization_percent;
    let is_source = |o: &Occupancy| {
        o.container().is_active && !o.is_empty() && o.utilization_percent() < low
    };
    let sources: Vec<ContainerId> = index
        .occupancies()
        .filter(|o| is_source(*o))
        .map(|o| o.id().to_owned())
        .collect();

    // Only containers already in use absorb items.
    let targets = |scratch: &ContainerIndex, _: &str| -> Vec<ContainerId> {
        let mut occupancies: Vec<&Occupancy> = scratch
            .occupancies()
            .filter(|o| {
                o.container().is_active && !o.is_empty() && !sources.iter().any(|s| s == o.id())
            })
            .collect();
        occupancies.sort_by(|a, b| by_utilization(b, a));
        occupancies.iter().map(|o| o.id().to_owned()).collect()
    };

    sources
        .iter()
        .filter_map(|source| {
            let occupancy = index.occupancy(source).ok()?;
            let mut items: Vec<(u64, ItemId)> = occupancy
                .footprints()
                .map(|(id, footprint)| (footprint.volume(), id.clone()))
                .collect();
            items.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            let items = items.into_iter().map(|(_, id)| id).collect();
            build_plan(index, RearrangementReason::Consolidation, source, items, &targets, config)
        })
        .collect()
}

fn load_balancing(index: &ContainerIndex, config: &PlannerConfig) -> Vec<RearrangementPlan> {
    let high = config.high_utilization_percent;
    let sources: Vec<ContainerId> = index
        .occupancies()
        .filter(|o| o.container().is_active && o.utilization_percent() > high)
        .map(|o| o.id().to_owned())
        .collect();

    let targets = |scratch: &ContainerIndex, _: &str| -> Vec<ContainerId> {
        let mut occupancies: Vec<&Occupancy> = scratch
            .occupancies()
            .filter(|o| o.container().is_active && o.utilization_percent() < high)
            .collect();
        occupancies.sort_by(|a, b| by_utilization(a, b));
        occupancies.iter().map(|o| o.id().to_owned()).collect()
    };

    sources
        .iter()
        .filter_map(|source| {
            let occupancy = index.occupancy(source).ok()?;
            let mut items: Vec<(u8, ItemId)> = occupancy
                .item_ids()
                .filter_map(|id| index.item(id).ok().map(|item| (item.priority, id.clone())))
                .collect();
            items.sort();
            let shed = items.len().div_ceil(2);
            let items = items.into_iter().take(shed).map(|(_, id)| id).collect();
            build_plan(index, RearrangementReason::LoadBalancing, source, items, &targets, config)
        })
        .collect()
}

fn zone_correction(index: &ContainerIndex, config: &PlannerConfig) -> Vec<RearrangementPlan> {
    let targets = |scratch: &ContainerIndex, item_id: &str| -> Vec<ContainerId> {
        let zone = scratch
            .item(item_id)
            .ok()
            .and_then(|item| item.preferred_zone.as_deref());
        let mut matching: Vec<&Occupancy> = scratch
            .occupancies()
            .filter(|o| o.container().is_active && o.container().matches_zone(zone))
            .collect();
        matching.sort_by(|a, b| {
            b.free_volume()
                .cmp(&a.free_volume())
                .then_with(|| a.id().cmp(b.id()))
        });
        matching.iter().map(|o| o.id().to_owned()).collect()
    };

    index
        .occupancies()
        .filter_map(|occupancy| {
            let misplaced: Vec<ItemId> = occupancy
                .item_ids()
                .filter_map(|id| index.item(id).ok())
                .filter(|item| {
                    item.preferred_zone.is_some()
                        && !occupancy.container().matches_zone(item.preferred_zone.as_deref())
                })
                .map(|item| item.id.clone())
                .collect();
            if misplaced.is_empty() {
                return None;
            }
            build_plan(
                index,
                RearrangementReason::ZoneCorrection,
                occupancy.id(),
                misplaced,
                &targets,
                config,
            )
        })
        .collect()
}

/// Proposes rearrangement plans without changing the index.
pub fn propose(index: &ContainerIndex, config: &PlannerConfig) -> Vec<RearrangementPlan> {
    let mut plans = consolidation(index, config);
    plans.extend(load_balancing(index, config));
    plans.extend(zone_correction(index, config));
    plans
}

fn apply_move(
    index: &mut ContainerIndex,
    journal: &mut Journal,
    planned: &Move,
    config: &PlannerConfig,
) -> CargoResult<AppliedMove> {
    let current = index.item(&planned.item_id)?.container_id();
    if current != Some(planned.from_container.as_str()) {
        return Err(CargoError::StalePlan {
            item_id: planned.item_id.clone(),
        });
    }
    journal.release(index, &planned.from_container, &planned.item_id)?;
    let at = place_in(
        index,
        &planned.item_id,
        &planned.to_container,
        f64::INFINITY,
        config,
    )?;
    journal.committed(&planned.item_id, &at.container_id);
    Ok(AppliedMove {
        item_id: planned.item_id.clone(),
        from_container: planned.from_container.clone(),
        to_container: at.container_id,
        position: at.position,
        orientation: at.orientation,
    })
}

/// Applies a plan move by move; any failure restores the prior state.
pub fn apply(
    index: &mut ContainerIndex,
    plan: &RearrangementPlan,
    config: &PlannerConfig,
) -> CargoResult<Vec<AppliedMove>> {
    let mut journal = Journal::new();
    let mut applied = Vec::with_capacity(plan.moves.len());
    for planned in &plan.moves {
        match apply_move(index, &mut journal, planned, config) {
            Ok(done) => applied.push(done),
            Err(err) => {
                warn!(
                    item = %planned.item_id,
                    source = %plan.source_container,
                    %err,
                    "rearrangement move failed, rolling back"
                );
                journal.rollback(index);
                return Err(err);
            }
        }
    }
    info!(
        reason = ?plan.reason,
        source = %plan.source_container,
        moves = applied.len(),
        "rearrangement applied"
    );
    Ok(applied)
}
