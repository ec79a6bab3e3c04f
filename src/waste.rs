//! Waste identification and undocking return planning.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult};
use crate::geometry::Orientation;
use crate::index::{ContainerIndex, Journal};
use crate::model::{ContainerId, Item, ItemId};
use crate::planner::{PlannerConfig, place_in};
use crate::types::{EPSILON_MASS, Point3};
use crate::types::validation::validate_mass;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WasteReason {
    Expired,
    UsageExhausted,
}

impl WasteReason {
    /// Classifies an item as of `date`. Expiry is checked first.
    pub fn of(item: &Item, date: NaiveDate) -> Option<Self> {
        if item.is_expired(date) {
            Some(WasteReason::Expired)
        } else if item.is_usage_exhausted() {
            Some(WasteReason::UsageExhausted)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WasteItem {
    pub item_id: ItemId,
    pub name: String,
    pub reason: WasteReason,
    pub mass: f64,
    pub volume: u64,
    pub container_id: Option<ContainerId>,
    pub position: Option<Point3>,
}

impl WasteItem {
    fn new(item: &Item, reason: WasteReason) -> Self {
        let at = item.placement().placed_at();
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            reason,
            mass: item.mass,
            volume: item.dims.volume(),
            container_id: at.as_ref().map(|at| at.container_id.clone()),
            position: at.map(|at| at.position),
        }
    }
}

/// Every waste item as of `date`, placed or not, ordered by id.
pub fn identify_waste(index: &ContainerIndex, date: NaiveDate) -> Vec<WasteItem> {
    index
        .items()
        .filter_map(|item| WasteReason::of(item, date).map(|reason| WasteItem::new(item, reason)))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    WeightBudget,
    NoGeometricFit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExcludedWaste {
    pub item_id: ItemId,
    pub mass: f64,
    pub reason: ExclusionReason,
}

/// One consolidation move into the undocking container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReturnMove {
    pub step: usize,
    pub item_id: ItemId,
    /// `None` when the item was not placed anywhere.
    pub from_container: Option<ContainerId>,
    pub to_container: ContainerId,
    pub position: Point3,
    pub orientation: Orientation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WasteManifest {
    pub undocking_container_id: ContainerId,
    pub undocking_date: NaiveDate,
    /// Effective weight ceiling: the lower of the requested budget and the
    /// container limit.
    pub max_weight: f64,
    pub items: Vec<WasteItem>,
    pub total_mass: f64,
    pub total_volume: u64,
    pub moves: Vec<ReturnMove>,
    pub excluded: Vec<ExcludedWaste>,
}

impl WasteManifest {
    fn empty(container_id: &str, date: NaiveDate, max_weight: f64) -> Self {
        Self {
            undocking_container_id: container_id.to_owned(),
            undocking_date: date,
            max_weight,
            items: Vec::new(),
            total_mass: 0.0,
            total_volume: 0,
            moves: Vec::new(),
            excluded: Vec::new(),
        }
    }
}

fn lightest_first(a: &WasteItem, b: &WasteItem) -> Ordering {
    a.mass
        .total_cmp(&b.mass)
        .then_with(|| a.volume.cmp(&b.volume))
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Plans which waste goes into the undocking container.
///
/// Candidates are taken lightest first (ties by volume, then id) so the
/// manifest carries as many items as the budget allows. Waste already inside
/// the undocking container stays where it is but still counts against the
/// budget; whatever does not fit is excluded.
pub fn plan_return(
    index: &ContainerIndex,
    current_date: NaiveDate,
    container_id: &str,
    undocking_date: NaiveDate,
    max_weight: f64,
    config: &PlannerConfig,
) -> CargoResult<WasteManifest> {
    let container = index.container(container_id)?;
    validate_mass(max_weight, "Return weight budget")?;
    if undocking_date < current_date {
        return Err(CargoError::InvalidRange(format!(
            "undocking date {} lies before the current date {}",
            undocking_date, current_date
        )));
    }

    let ceiling = max_weight.min(container.max_weight);
    let mut manifest = WasteManifest::empty(container_id, undocking_date, ceiling);
    let mut waste = identify_waste(index, undocking_date);
    if waste.is_empty() {
        return Ok(manifest);
    }

    let (mut resident, mut candidates): (Vec<_>, Vec<_>) = waste
        .drain(..)
        .partition(|w| w.container_id.as_deref() == Some(container_id));
    resident.sort_by(lightest_first);
    candidates.sort_by(lightest_first);

    let mut resident_mass = 0.0;
    for waste in resident {
        if resident_mass + waste.mass > ceiling + EPSILON_MASS {
            manifest.excluded.push(ExcludedWaste {
                item_id: waste.item_id,
                mass: waste.mass,
                reason: ExclusionReason::WeightBudget,
            });
        } else {
            resident_mass += waste.mass;
            manifest.items.push(waste);
        }
    }

    let mut scratch = index.clone();
    for candidate in candidates {
        let previous = match candidate.container_id.as_deref() {
            Some(from) => Some(scratch.release(from, &candidate.item_id)?),
            None => None,
        };
        match place_in(&mut scratch, &candidate.item_id, container_id, ceiling, config) {
            Ok(at) => {
                manifest.moves.push(ReturnMove {
                    step: manifest.moves.len() + 1,
                    item_id: candidate.item_id.clone(),
                    from_container: candidate.container_id.clone(),
                    to_container: at.container_id,
                    position: at.position,
                    orientation: at.orientation,
                });
                manifest.items.push(candidate);
            }
            Err(err) => {
                let reason = match err {
                    CargoError::CapacityExceeded { .. } => ExclusionReason::WeightBudget,
                    CargoError::NoGeometricFit { .. } => ExclusionReason::NoGeometricFit,
                    other => return Err(other),
                };
                if let Some(at) = previous {
                    scratch.restore(&candidate.item_id, &at)?;
                }
                manifest.excluded.push(ExcludedWaste {
                    item_id: candidate.item_id,
                    mass: candidate.mass,
                    reason,
                });
            }
        }
    }

    if manifest.items.is_empty() {
        return Err(CargoError::NoCapacity {
            container_id: container_id.to_owned(),
            max_weight: ceiling,
        });
    }
    manifest.total_mass = manifest.items.iter().map(|w| w.mass).sum();
    manifest.total_volume = manifest.items.iter().map(|w| w.volume).sum();
    Ok(manifest)
}

fn apply_return_move(
    index: &mut ContainerIndex,
    journal: &mut Journal,
    planned: &ReturnMove,
    ceiling: f64,
    config: &PlannerConfig,
) -> CargoResult<ReturnMove> {
    let current = index.item(&planned.item_id)?.container_id();
    if current != planned.from_container.as_deref() {
        return Err(CargoError::StalePlan {
            item_id: planned.item_id.clone(),
        });
    }
    if let Some(from) = &planned.from_container {
        journal.release(index, from, &planned.item_id)?;
    }
    let at = place_in(index, &planned.item_id, &planned.to_container, ceiling, config)?;
    journal.committed(&planned.item_id, &at.container_id);
    Ok(ReturnMove {
        position: at.position,
        orientation: at.orientation,
        ..planned.clone()
    })
}

/// Executes the moves of a manifest; any failure restores the prior state.
pub fn apply_return(
    index: &mut ContainerIndex,
    manifest: &WasteManifest,
    config: &PlannerConfig,
) -> CargoResult<Vec<ReturnMove>> {
    index.container(&manifest.undocking_container_id)?;
    let mut journal = Journal::new();
    let mut applied = Vec::with_capacity(manifest.moves.len());
    for planned in &manifest.moves {
        match apply_return_move(index, &mut journal, planned, manifest.max_weight, config) {
            Ok(done) => applied.push(done),
            Err(err) => {
                warn!(item = %planned.item_id, %err, "return move failed, rolling back");
                journal.rollback(index);
                return Err(err);
            }
        }
    }
    info!(
        container = %manifest.undocking_container_id,
        moves = applied.len(),
        "return plan applied"
    );
    Ok(applied)
}

/// Permanently removes every item inside the undocking container.
pub fn complete_undocking(index: &mut ContainerIndex, container_id: &str) -> CargoResult<usize> {
    let ids: Vec<ItemId> = index.occupancy(container_id)?.item_ids().cloned().collect();
    if ids.is_empty() {
        return Err(CargoError::NothingToRemove {
            container_id: container_id.to_owned(),
        });
    }
    for id in &ids {
        index.remove_item(id)?;
    }
    info!(container = container_id, removed = ids.len(), "undocking completed");
    Ok(ids.len())
}
