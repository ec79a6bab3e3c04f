//! Retrieval planning.
//!
//! An item is blocked by every item in the same container that sits between
//! it and the open face: the blocker's projection onto the face plane
//! overlaps the target's with positive area, and its whole extent along the
//! retrieval axis lies in front of the target.

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult};
use crate::geometry::projected_overlap;
use crate::index::{ContainerIndex, Journal};
use crate::model::{ContainerId, ItemId};
use crate::types::Point3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalAction {
    /// Take a blocking item out temporarily.
    Move,
    /// Take the requested item out.
    Extract,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetrievalStep {
    /// 1-based position in the plan.
    pub step: usize,
    pub action: RetrievalAction,
    pub item_id: ItemId,
    pub position: Point3,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetrievalPlan {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub steps: Vec<RetrievalStep>,
}

impl RetrievalPlan {
    /// Number of items that must be moved before the extraction.
    pub fn blocker_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.action == RetrievalAction::Move)
            .count()
    }
}

/// Items blocking `item_id`, nearest to the open face first (ties by id).
pub fn blocking_items(index: &ContainerIndex, item_id: &str) -> CargoResult<Vec<(ItemId, Point3)>> {
    let item = index.item(item_id)?;
    let container_id = item.container_id().ok_or_else(|| CargoError::NotPlaced {
        item_id: item_id.to_owned(),
    })?;
    let occupancy = index.occupancy(container_id)?;
    let target = occupancy
        .footprint(item_id)
        .ok_or_else(|| CargoError::NotPlaced {
            item_id: item_id.to_owned(),
        })?;
    let axis = occupancy.container().retrieval_axis;
    let (target_near, _) = target.span(axis);

    let mut blockers: Vec<_> = occupancy
        .footprints()
        .filter(|(other_id, _)| other_id.as_str() != item_id)
        .filter(|(_, other)| other.span(axis).1 <= target_near)
        .filter(|(_, other)| projected_overlap(&target, other, axis) > 0)
        .map(|(other_id, other)| (axis.of_point(&other.origin), other_id.clone(), other.origin))
        .collect();
    blockers.sort();
    Ok(blockers
        .into_iter()
        .map(|(_, id, position)| (id, position))
        .collect())
}

/// Builds the retrieval plan for an item without changing anything.
pub fn plan_retrieval(index: &ContainerIndex, item_id: &str) -> CargoResult<RetrievalPlan> {
    let blockers = blocking_items(index, item_id)?;
    let at = index
        .item(item_id)?
        .placement()
        .placed_at()
        .ok_or_else(|| CargoError::NotPlaced {
            item_id: item_id.to_owned(),
        })?;

    let mut steps: Vec<RetrievalStep> = blockers
        .into_iter()
        .enumerate()
        .map(|(i, (id, position))| RetrievalStep {
            step: i + 1,
            action: RetrievalAction::Move,
            item_id: id,
            position,
        })
        .collect();
    steps.push(RetrievalStep {
        step: steps.len() + 1,
        action: RetrievalAction::Extract,
        item_id: item_id.to_owned(),
        position: at.position,
    });

    Ok(RetrievalPlan {
        item_id: item_id.to_owned(),
        container_id: at.container_id,
        steps,
    })
}

/// Executes the retrieval plan for an item.
///
/// Blocking items and the target all end up unplaced. If any step fails
/// the items already taken out are put back.
pub fn retrieve(index: &mut ContainerIndex, item_id: &str) -> CargoResult<RetrievalPlan> {
    let plan = plan_retrieval(index, item_id)?;
    let mut journal = Journal::new();
    for step in &plan.steps {
        if let Err(err) = journal.release(index, &plan.container_id, &step.item_id) {
            journal.rollback(index);
            return Err(err);
        }
    }
    info!(
        item = item_id,
        container = %plan.container_id,
        moved = plan.blocker_count(),
        "item retrieved"
    );
    Ok(plan)
}
