//! Bulk import of containers and items.
//!
//! Records arrive with raw (signed) numbers so that malformed values can be
//! reported per record instead of failing the whole batch.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult, ValidationError};
use crate::geometry::Orientation;
use crate::index::ContainerIndex;
use crate::model::{Container, Item};
use crate::types::validation::{normalize_label, validate_dimension, validate_priority};
use crate::types::{Axis, Dims, Point3};

fn default_true() -> bool {
    true
}

fn dims_of(width: i64, depth: i64, height: i64) -> Result<Dims, ValidationError> {
    Ok(Dims::new(
        validate_dimension(width, "width")?,
        validate_dimension(depth, "depth")?,
        validate_dimension(height, "height")?,
    ))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "container_id": "contA",
    "zone": "Crew Quarters",
    "width": 100, "depth": 85, "height": 200,
    "max_weight": 500.0
}))]
pub struct ContainerRecord {
    #[serde(alias = "id")]
    pub container_id: String,
    pub zone: String,
    pub width: i64,
    pub depth: i64,
    pub height: i64,
    pub max_weight: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub retrieval_axis: Axis,
}

impl TryFrom<ContainerRecord> for Container {
    type Error = ValidationError;

    fn try_from(record: ContainerRecord) -> Result<Self, Self::Error> {
        let dims = dims_of(record.width, record.depth, record.height)?;
        Ok(Container::new(record.container_id, record.zone, dims, record.max_weight)?
            .with_active(record.is_active)
            .with_retrieval_axis(record.retrieval_axis))
    }
}

impl From<&Container> for ContainerRecord {
    fn from(container: &Container) -> Self {
        Self {
            container_id: container.id.clone(),
            zone: container.zone.clone(),
            width: i64::from(container.dims.width),
            depth: i64::from(container.dims.depth),
            height: i64::from(container.dims.height),
            max_weight: container.max_weight,
            is_active: container.is_active,
            retrieval_axis: container.retrieval_axis,
        }
    }
}

/// Existing placement carried by an imported item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlacementRecord {
    pub container_id: String,
    pub position: Point3,
    #[serde(default)]
    pub orientation: Orientation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "item_id": "000001",
    "name": "Food Packet",
    "width": 10, "depth": 10, "height": 20,
    "mass": 5.0,
    "priority": 80,
    "preferred_zone": "Crew Quarters",
    "expiry_date": "2025-05-20",
    "usage_limit": 30
}))]
pub struct ItemRecord {
    #[serde(alias = "id")]
    pub item_id: String,
    pub name: String,
    pub width: i64,
    pub depth: i64,
    pub height: i64,
    pub mass: f64,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub preferred_zone: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub placement: Option<PlacementRecord>,
}

impl TryFrom<&ItemRecord> for Item {
    type Error = ValidationError;

    fn try_from(record: &ItemRecord) -> Result<Self, Self::Error> {
        let dims = dims_of(record.width, record.depth, record.height)?;
        let mut item = Item::new(&record.item_id, record.name.trim(), dims, record.mass)?;
        if let Some(priority) = record.priority {
            item = item.with_priority(validate_priority(priority)?);
        }
        item.preferred_zone = normalize_label(record.preferred_zone.clone());
        item.expiry_date = record.expiry_date;
        item.usage_limit = record.usage_limit;
        Ok(item)
    }
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            width: i64::from(item.dims.width),
            depth: i64::from(item.dims.depth),
            height: i64::from(item.dims.height),
            mass: item.mass,
            priority: Some(i64::from(item.priority)),
            preferred_zone: item.preferred_zone.clone(),
            expiry_date: item.expiry_date,
            usage_limit: item.usage_limit,
            placement: item.placement().placed_at().map(|at| PlacementRecord {
                container_id: at.container_id,
                position: at.position,
                orientation: at.orientation,
            }),
        }
    }
}

/// A record that was not imported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectedRecord {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    pub id: String,
    pub code: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedRecord>,
}

impl ImportReport {
    fn reject(&mut self, index: usize, id: &str, err: &CargoError) {
        warn!(record = index, id, code = err.code(), %err, "import record rejected");
        self.rejected.push(RejectedRecord {
            index,
            id: id.to_owned(),
            code: err.code().to_owned(),
            error: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub fn import_containers(index: &mut ContainerIndex, records: Vec<ContainerRecord>) -> ImportReport {
    let mut report = ImportReport::default();
    for (position, record) in records.into_iter().enumerate() {
        let id = record.container_id.trim().to_owned();
        let outcome = Container::try_from(record)
            .map_err(CargoError::from)
            .and_then(|container| index.insert_container(container));
        match outcome {
            Ok(()) => report.accepted.push(id),
            Err(err) => report.reject(position, &id, &err),
        }
    }
    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "containers imported"
    );
    report
}

fn import_item(index: &mut ContainerIndex, record: &ItemRecord) -> CargoResult<()> {
    let item = Item::try_from(record)?;
    let id = item.id.clone();
    index.insert_item(item)?;
    if let Some(placement) = &record.placement {
        let committed = index.commit(
            placement.container_id.trim(),
            &id,
            placement.position,
            placement.orientation,
        );
        if let Err(err) = committed {
            index.remove_item(&id)?;
            return Err(err);
        }
    }
    Ok(())
}

pub fn import_items(index: &mut ContainerIndex, records: Vec<ItemRecord>) -> ImportReport {
    let mut report = ImportReport::default();
    for (position, record) in records.iter().enumerate() {
        let id = record.item_id.trim();
        match import_item(index, record) {
            Ok(()) => report.accepted.push(id.to_owned()),
            Err(err) => report.reject(position, id, &err),
        }
    }
    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "items imported"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_record(id: &str, width: i64) -> ContainerRecord {
        ContainerRecord {
            container_id: id.into(),
            zone: "Lab".into(),
            width,
            depth: 100,
            height: 100,
            max_weight: 100.0,
            is_active: true,
            retrieval_axis: Axis::Depth,
        }
    }

    fn item_record(id: &str, mass: f64) -> ItemRecord {
        ItemRecord {
            item_id: id.into(),
            name: "Wrench".into(),
            width: 10,
            depth: 10,
            height: 10,
            mass,
            priority: Some(60),
            preferred_zone: Some("Lab".into()),
            expiry_date: None,
            usage_limit: None,
            placement: None,
        }
    }

    #[test]
    fn container_import_reports_each_bad_record() {
        let mut index = ContainerIndex::new();
        let report = import_containers(
            &mut index,
            vec![
                container_record("a", 100),
                container_record("b", 0),
                container_record("a", 100),
                container_record(" ", 100),
            ],
        );
        assert_eq!(report.accepted, vec!["a".to_string()]);
        let codes: Vec<_> = report.rejected.iter().map(|r| (r.index, r.code.as_str())).collect();
        assert_eq!(
            codes,
            vec![(1, "validation_error"), (2, "validation_error"), (3, "validation_error")]
        );
        assert_eq!(index.container_count(), 1);
    }

    #[test]
    fn item_import_validates_priority_and_mass() {
        let mut index = ContainerIndex::new();
        let mut bad_priority = item_record("p", 1.0);
        bad_priority.priority = Some(101);
        let report = import_items(
            &mut index,
            vec![item_record("ok", 1.0), bad_priority, item_record("m", 0.0)],
        );
        assert_eq!(report.accepted, vec!["ok".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(index.item("ok").unwrap().priority, 60);
    }

    #[test]
    fn placements_are_committed_or_rejected() {
        let mut index = ContainerIndex::new();
        import_containers(&mut index, vec![container_record("c", 100)]);

        let mut first = item_record("first", 1.0);
        first.placement = Some(PlacementRecord {
            container_id: "c".into(),
            position: Point3::origin(),
            orientation: Orientation::WidthDepthHeight,
        });
        let mut colliding = item_record("colliding", 1.0);
        colliding.placement = first.placement.clone();
        let mut lost = item_record("lost", 1.0);
        lost.placement = Some(PlacementRecord {
            container_id: "nowhere".into(),
            position: Point3::origin(),
            orientation: Orientation::WidthDepthHeight,
        });

        let report = import_items(&mut index, vec![first, colliding, lost]);
        assert_eq!(report.accepted, vec!["first".to_string()]);
        assert_eq!(report.rejected[0].code, "overlap");
        assert_eq!(report.rejected[1].code, "not_found");
        assert!(index.item("colliding").is_err());
        assert_eq!(index.occupancy("c").unwrap().len(), 1);
    }

    #[test]
    fn exported_items_round_trip() {
        let mut index = ContainerIndex::new();
        import_containers(&mut index, vec![container_record("c", 100)]);
        let mut record = item_record("x", 2.0);
        record.placement = Some(PlacementRecord {
            container_id: "c".into(),
            position: Point3::new(10, 0, 0),
            orientation: Orientation::WidthDepthHeight,
        });
        import_items(&mut index, vec![record.clone()]);
        let exported = ItemRecord::from(index.item("x").unwrap());
        assert_eq!(exported, record);
    }

    #[test]
    fn records_accept_id_alias_and_defaults() {
        let record: ContainerRecord = serde_json::from_value(serde_json::json!({
            "id": "c1", "zone": "Lab", "width": 1, "depth": 2, "height": 3, "max_weight": 4.0
        }))
        .unwrap();
        assert_eq!(record.container_id, "c1");
        assert!(record.is_active);
        assert_eq!(record.retrieval_axis, Axis::Depth);
    }
}
