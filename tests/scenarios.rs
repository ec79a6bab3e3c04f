//! End-to-end behaviour through the public `Engine` API.

use chrono::NaiveDate;
use stowplan::CargoError;
use stowplan::Engine;
use stowplan::geometry::{Orientation, intersects};
use stowplan::import::{ContainerRecord, ItemRecord};
use stowplan::planner::{PlacementDecision, PlannerConfig, UnplacedReason};
use stowplan::simulation::ItemUsage;
use stowplan::types::{Axis, EPSILON_MASS, Point3};
use stowplan::waste::{ExclusionReason, WasteReason};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn engine_with(config: PlannerConfig) -> Engine {
    stowplan::logging::init_test();
    Engine::new(config, date(2024, 1, 1))
}

fn engine() -> Engine {
    engine_with(PlannerConfig::default())
}

fn container(id: &str, zone: &str, dims: (i64, i64, i64), max_weight: f64) -> ContainerRecord {
    ContainerRecord {
        container_id: id.into(),
        zone: zone.into(),
        width: dims.0,
        depth: dims.1,
        height: dims.2,
        max_weight,
        is_active: true,
        retrieval_axis: Axis::Depth,
    }
}

fn item(id: &str, dims: (i64, i64, i64), mass: f64) -> ItemRecord {
    ItemRecord {
        item_id: id.into(),
        name: format!("Item {id}"),
        width: dims.0,
        depth: dims.1,
        height: dims.2,
        mass,
        priority: None,
        preferred_zone: None,
        expiry_date: None,
        usage_limit: None,
        placement: None,
    }
}

fn position_of(engine: &Engine, item_id: &str) -> Option<(Point3, Orientation)> {
    engine
        .index()
        .item(item_id)
        .ok()?
        .placement()
        .placed_at()
        .map(|at| (at.position, at.orientation))
}

#[test]
fn first_item_goes_to_origin_and_second_beside_it() {
    let mut engine = engine();
    assert!(
        engine
            .import_containers(vec![container("c", "Lab", (100, 100, 100), 1000.0)])
            .is_clean()
    );
    engine.import_items(vec![item("a", (50, 50, 50), 1.0), item("b", (50, 50, 50), 1.0)]);

    engine.place_item("a").unwrap();
    assert_eq!(
        position_of(&engine, "a"),
        Some((Point3::new(0, 0, 0), Orientation::WidthDepthHeight))
    );

    engine.place_item("b").unwrap();
    assert_eq!(
        position_of(&engine, "b"),
        Some((Point3::new(50, 0, 0), Orientation::WidthDepthHeight))
    );
}

#[test]
fn batch_respects_volume_and_weight_and_never_overlaps() {
    let mut engine = engine();
    engine.import_containers(vec![
        container("c1", "Lab", (60, 40, 40), 30.0),
        container("c2", "Lab", (50, 50, 30), 25.0),
    ]);
    let items: Vec<ItemRecord> = (0..24)
        .map(|i| {
            let w = 10 + (i % 3) * 5;
            let d = 10 + (i % 4) * 5;
            let h = 10 + (i % 2) * 10;
            item(&format!("i{i:02}"), (w, d, h), 1.5 + (i % 5) as f64)
        })
        .collect();
    engine.import_items(items);

    let report = engine.place_batch(&[]).unwrap();
    assert_eq!(report.placed_count() + report.unplaced_count(), 24);
    assert!(report.placed_count() > 0);

    for occupancy in engine.index().occupancies() {
        let container = occupancy.container();
        assert!(occupancy.used_volume() <= container.dims.volume());
        assert!(occupancy.current_weight() <= container.max_weight + EPSILON_MASS);

        let boxes: Vec<_> = occupancy.footprints().map(|(_, b)| *b).collect();
        for (i, a) in boxes.iter().enumerate() {
            for b in &boxes[i + 1..] {
                assert!(!intersects(a, b), "{a:?} overlaps {b:?}");
            }
        }
    }
    assert!(engine.index().audit().is_empty(), "{:?}", engine.index().audit());
}

#[test]
fn retrieving_twice_reports_not_placed() {
    let mut engine = engine();
    engine.import_containers(vec![container("c", "Lab", (20, 20, 20), 10.0)]);
    engine.import_items(vec![item("a", (10, 10, 10), 1.0)]);
    engine.place_item("a").unwrap();

    let plan = engine.retrieve("a").unwrap();
    assert_eq!(plan.blocker_count(), 0);
    assert!(matches!(
        engine.retrieve("a"),
        Err(CargoError::NotPlaced { .. })
    ));
}

#[test]
fn place_then_retrieve_restores_free_space_exactly() {
    let mut engine = engine();
    engine.import_containers(vec![container("c", "Lab", (40, 30, 20), 10.0)]);
    engine.import_items(vec![item("a", (10, 10, 10), 1.0), item("b", (15, 5, 10), 1.0)]);
    engine.place_item("a").unwrap();

    let before = engine.index().occupancy("c").unwrap().clone();
    engine.place_item("b").unwrap();
    assert_ne!(engine.index().occupancy("c").unwrap(), &before);

    engine.retrieve("b").unwrap();
    assert_eq!(engine.index().occupancy("c").unwrap(), &before);
}

#[test]
fn exact_fit_is_placed_and_one_unit_more_is_not() {
    let config = PlannerConfig::builder().allow_rotation(false).build();
    let mut engine = engine_with(config);
    engine.import_containers(vec![container("c", "Lab", (30, 20, 10), 10.0)]);
    engine.import_items(vec![
        item("exact", (30, 20, 10), 1.0),
        item("wide", (31, 20, 10), 1.0),
    ]);

    assert!(matches!(
        engine.place_item("wide").unwrap(),
        PlacementDecision::Unplaceable {
            reason: UnplacedReason::NoGeometricFit
        }
    ));
    assert_eq!(
        engine.place_item("exact").unwrap().placed_at().map(|at| at.position),
        Some(Point3::origin())
    );
}

#[test]
fn single_use_item_is_depleted_after_one_day() {
    let mut engine = engine();
    let mut kit = item("kit", (5, 5, 5), 0.5);
    kit.usage_limit = Some(1);
    engine.import_items(vec![kit]);

    let result = engine.advance(1, &[ItemUsage::new("kit", 1)]).unwrap();
    assert_eq!(result.items_depleted, vec!["kit".to_string()]);
    assert_eq!(engine.index().item("kit").unwrap().usage_limit, Some(0));
    assert_eq!(engine.current_date(), date(2024, 1, 2));
}

#[test]
fn expired_item_is_waste_the_next_day() {
    let mut engine = engine();
    let mut food = item("food", (5, 5, 5), 0.5);
    food.expiry_date = Some(date(2024, 1, 1));
    engine.import_items(vec![food]);

    assert!(engine.identify_waste_at(date(2024, 1, 1)).is_empty());
    let waste = engine.identify_waste_at(date(2024, 1, 2));
    assert_eq!(waste.len(), 1);
    assert_eq!(waste[0].reason, WasteReason::Expired);
}

#[test]
fn return_plan_stays_within_budget_and_applies() {
    let mut engine = engine();
    engine.import_containers(vec![
        container("dock", "Airlock", (50, 50, 50), 100.0),
        container("store", "Storage", (50, 50, 50), 100.0),
    ]);
    let waste: Vec<ItemRecord> = ["w1", "w2", "w3"]
        .into_iter()
        .map(|id| {
            let mut record = item(id, (10, 10, 10), 4.0);
            record.preferred_zone = Some("Storage".into());
            record.expiry_date = Some(date(2023, 12, 1));
            record
        })
        .collect();
    engine.import_items(waste);
    engine.place_batch(&[]).unwrap();
    assert_eq!(engine.index().occupancy("store").unwrap().len(), 3);

    let manifest = engine.plan_return("dock", date(2024, 2, 1), 10.0).unwrap();
    assert_eq!(manifest.items.len(), 2);
    assert_eq!(manifest.total_mass, 8.0);
    assert_eq!(manifest.excluded.len(), 1);
    assert_eq!(manifest.excluded[0].reason, ExclusionReason::WeightBudget);

    let moves = engine.apply_return(&manifest).unwrap();
    assert_eq!(moves.len(), 2);
    assert_eq!(engine.index().occupancy("dock").unwrap().len(), 2);

    assert_eq!(engine.complete_undocking("dock").unwrap(), 2);
    assert!(matches!(
        engine.complete_undocking("dock"),
        Err(CargoError::NothingToRemove { .. })
    ));
    assert!(engine.index().audit().is_empty());
}

#[test]
fn snapshot_serializes_to_json() {
    let mut engine = engine();
    engine.import_containers(vec![container("c", "Lab", (20, 20, 20), 10.0)]);
    engine.import_items(vec![item("a", (10, 10, 10), 1.0), item("big", (30, 30, 30), 1.0)]);
    let report = engine.place_batch(&[]).unwrap();
    assert_eq!(report.unplaced_count(), 1);

    let snapshot = engine.export_arrangement();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["unplaced"], serde_json::json!(["big"]));
    assert_eq!(json["date"], "2024-01-01");
}

#[test]
fn manifest_never_exceeds_its_budget_with_resident_waste() {
    use stowplan::import::PlacementRecord;

    let mut engine = engine();
    engine.import_containers(vec![
        container("dock", "Airlock", (50, 50, 50), 100.0),
        container("store", "Storage", (50, 50, 50), 100.0),
    ]);
    let mut old = item("old", (10, 10, 10), 7.0);
    old.expiry_date = Some(date(2023, 6, 1));
    old.placement = Some(PlacementRecord {
        container_id: "dock".into(),
        position: Point3::origin(),
        orientation: Orientation::WidthDepthHeight,
    });
    let mut stale = item("stale", (10, 10, 10), 4.0);
    stale.expiry_date = Some(date(2023, 6, 1));
    assert!(engine.import_items(vec![old, stale]).is_clean());

    let manifest = engine.plan_return("dock", date(2024, 2, 1), 10.0).unwrap();
    assert!(manifest.total_mass <= manifest.max_weight);
    assert_eq!(manifest.total_mass, 7.0);
    assert_eq!(manifest.excluded.len(), 1);
    assert_eq!(manifest.excluded[0].item_id, "stale");
}
