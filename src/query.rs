//! Read-only views: filtered listings, arrangement export and statistics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{CargoError, CargoResult};
use crate::geometry::Orientation;
use crate::index::{ContainerIndex, Occupancy};
use crate::model::{Container, ContainerId, Item, ItemId};
use crate::types::{Dims, EPSILON_MASS, Point3};

fn check_range<T: PartialOrd + std::fmt::Display>(
    min: Option<T>,
    max: Option<T>,
    name: &str,
) -> CargoResult<()> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(CargoError::InvalidRange(format!(
            "{} range is empty: {} > {}",
            name, min, max
        ))),
        _ => Ok(()),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Item listing filter. Every field is optional; set fields are combined.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemFilter {
    /// Case-insensitive substring of the item name.
    pub name: Option<String>,
    pub container_id: Option<String>,
    /// Zone of the current container, or the preferred zone when unplaced.
    pub zone: Option<String>,
    pub min_mass: Option<f64>,
    pub max_mass: Option<f64>,
    pub min_priority: Option<u8>,
    pub max_priority: Option<u8>,
    /// Only items expiring strictly before this date.
    pub expires_before: Option<NaiveDate>,
    pub placed: Option<bool>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ItemFilter {
    fn matches(&self, index: &ContainerIndex, item: &Item) -> bool {
        if let Some(name) = &self.name {
            if !contains_ignore_case(&item.name, name) {
                return false;
            }
        }
        if let Some(container_id) = &self.container_id {
            if item.container_id() != Some(container_id.as_str()) {
                return false;
            }
        }
        if let Some(zone) = &self.zone {
            let item_zone = match item.container_id() {
                Some(id) => index.container(id).ok().map(|c| c.zone.as_str()),
                None => item.preferred_zone.as_deref(),
            };
            if !item_zone.is_some_and(|z| z.eq_ignore_ascii_case(zone)) {
                return false;
            }
        }
        if self.min_mass.is_some_and(|min| item.mass < min)
            || self.max_mass.is_some_and(|max| item.mass > max)
        {
            return false;
        }
        if self.min_priority.is_some_and(|min| item.priority < min)
            || self.max_priority.is_some_and(|max| item.priority > max)
        {
            return false;
        }
        if let Some(before) = self.expires_before {
            if !item.expiry_date.is_some_and(|expiry| expiry < before) {
                return false;
            }
        }
        self.placed.is_none_or(|placed| item.is_placed() == placed)
    }
}

/// Items matching `filter`, ordered by id.
pub fn list_items<'a>(index: &'a ContainerIndex, filter: &ItemFilter) -> CargoResult<Vec<&'a Item>> {
    check_range(filter.min_mass, filter.max_mass, "mass")?;
    check_range(filter.min_priority, filter.max_priority, "priority")?;
    Ok(index
        .items()
        .filter(|item| filter.matches(index, item))
        .skip(filter.offset.unwrap_or(0))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContainerFilter {
    /// Case-insensitive substring of the container id.
    pub id: Option<String>,
    pub zone: Option<String>,
    pub is_active: Option<bool>,
    /// Containers that still have free volume and weight capacity.
    pub has_space: Option<bool>,
    pub min_utilization: Option<f64>,
    pub max_utilization: Option<f64>,
}

impl ContainerFilter {
    fn matches(&self, occupancy: &Occupancy) -> bool {
        let container = occupancy.container();
        if self.id.as_deref().is_some_and(|id| !contains_ignore_case(&container.id, id)) {
            return false;
        }
        if self.zone.is_some() && !container.matches_zone(self.zone.as_deref()) {
            return false;
        }
        if self.is_active.is_some_and(|active| container.is_active != active) {
            return false;
        }
        let has_space = occupancy.free_volume() > 0 && occupancy.remaining_weight() > EPSILON_MASS;
        if self.has_space.is_some_and(|wanted| has_space != wanted) {
            return false;
        }
        let utilization = occupancy.utilization_percent();
        !(self.min_utilization.is_some_and(|min| utilization < min)
            || self.max_utilization.is_some_and(|max| utilization > max))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ContainerSummary {
    pub container: Container,
    pub current_weight: f64,
    pub remaining_weight: f64,
    pub free_volume: u64,
    pub utilization_percent: f64,
    pub item_count: usize,
}

impl From<&Occupancy> for ContainerSummary {
    fn from(occupancy: &Occupancy) -> Self {
        Self {
            container: occupancy.container().clone(),
            current_weight: occupancy.current_weight(),
            remaining_weight: occupancy.remaining_weight(),
            free_volume: occupancy.free_volume(),
            utilization_percent: occupancy.utilization_percent(),
            item_count: occupancy.len(),
        }
    }
}

pub fn list_containers(
    index: &ContainerIndex,
    filter: &ContainerFilter,
) -> CargoResult<Vec<ContainerSummary>> {
    check_range(filter.min_utilization, filter.max_utilization, "utilization")?;
    Ok(index
        .occupancies()
        .filter(|occupancy| filter.matches(occupancy))
        .map(ContainerSummary::from)
        .collect())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArrangedItem {
    pub item_id: ItemId,
    pub name: String,
    pub position: Point3,
    pub orientation: Orientation,
    pub extents: Dims,
    pub mass: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerArrangement {
    pub container: Container,
    pub current_weight: f64,
    pub utilization_percent: f64,
    pub items: Vec<ArrangedItem>,
}

/// Full placement state at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArrangementSnapshot {
    pub date: NaiveDate,
    pub containers: Vec<ContainerArrangement>,
    pub unplaced: Vec<ItemId>,
}

pub fn export_arrangement(index: &ContainerIndex, date: NaiveDate) -> ArrangementSnapshot {
    let containers = index
        .occupancies()
        .map(|occupancy| ContainerArrangement {
            container: occupancy.container().clone(),
            current_weight: occupancy.current_weight(),
            utilization_percent: occupancy.utilization_percent(),
            items: occupancy
                .item_ids()
                .filter_map(|id| index.item(id).ok())
                .filter_map(|item| {
                    let at = item.placement().placed_at()?;
                    Some(ArrangedItem {
                        item_id: item.id.clone(),
                        name: item.name.clone(),
                        position: at.position,
                        orientation: at.orientation,
                        extents: at.orientation.apply(item.dims),
                        mass: item.mass,
                    })
                })
                .collect(),
        })
        .collect();
    let unplaced = index
        .items()
        .filter(|item| !item.is_placed())
        .map(|item| item.id.clone())
        .collect();
    ArrangementSnapshot {
        date,
        containers,
        unplaced,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerUtilization {
    pub container_id: ContainerId,
    pub zone: String,
    pub item_count: usize,
    pub utilization_percent: f64,
    pub weight_percent: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlacementStatistics {
    pub total_containers: usize,
    pub active_containers: usize,
    pub total_items: usize,
    pub placed_items: usize,
    pub unplaced_items: usize,
    pub total_volume: u64,
    pub used_volume: u64,
    pub volume_utilization_percent: f64,
    pub weight_capacity: f64,
    pub placed_weight: f64,
    pub weight_utilization_percent: f64,
    /// Placed items with a preferred zone that sit in that zone.
    pub zone_matched_items: usize,
    /// Share of placed items with a preferred zone that sit in that zone.
    pub zone_match_rate_percent: f64,
    pub containers: Vec<ContainerUtilization>,
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

pub fn statistics(index: &ContainerIndex) -> PlacementStatistics {
    let mut stats = PlacementStatistics {
        total_containers: index.container_count(),
        total_items: index.item_count(),
        ..PlacementStatistics::default()
    };

    for occupancy in index.occupancies() {
        let container = occupancy.container();
        if container.is_active {
            stats.active_containers += 1;
        }
        stats.total_volume += container.dims.volume();
        stats.used_volume += occupancy.used_volume();
        stats.weight_capacity += container.max_weight;
        stats.placed_weight += occupancy.current_weight();
        stats.containers.push(ContainerUtilization {
            container_id: container.id.clone(),
            zone: container.zone.clone(),
            item_count: occupancy.len(),
            utilization_percent: occupancy.utilization_percent(),
            weight_percent: percent(occupancy.current_weight(), container.max_weight),
        });
    }

    let mut with_preference = 0usize;
    for item in index.items() {
        let Some(container_id) = item.container_id() else {
            stats.unplaced_items += 1;
            continue;
        };
        stats.placed_items += 1;
        if item.preferred_zone.is_some() {
            with_preference += 1;
            let matched = index
                .container(container_id)
                .is_ok_and(|c| c.matches_zone(item.preferred_zone.as_deref()));
            if matched {
                stats.zone_matched_items += 1;
            }
        }
    }

    stats.volume_utilization_percent = percent(stats.used_volume as f64, stats.total_volume as f64);
    stats.weight_utilization_percent = percent(stats.placed_weight, stats.weight_capacity);
    stats.zone_match_rate_percent = percent(stats.zone_matched_items as f64, with_preference as f64);
    stats
}
