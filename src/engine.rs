//! Engine façade: the single entry point for every external command.
//!
//! Owns the container index, the simulated date and the planner
//! configuration. Mutating commands take `&mut self`, so each one runs as a
//! serialized transaction.

use chrono::NaiveDate;
use tracing::info;

use crate::error::CargoResult;
use crate::import::{self, ContainerRecord, ImportReport, ItemRecord};
use crate::index::ContainerIndex;
use crate::model::{Item, ItemId};
use crate::planner::{self, PlacementDecision, PlacementEvent, PlacementReport, PlannerConfig};
use crate::query::{
    self, ArrangementSnapshot, ContainerFilter, ContainerSummary, ItemFilter, PlacementStatistics,
};
use crate::rearrangement::{self, AppliedMove, RearrangementPlan};
use crate::retrieval::{self, RetrievalPlan};
use crate::simulation::{self, ItemUsage, SimulationResult};
use crate::waste::{self, ReturnMove, WasteItem, WasteManifest};

#[derive(Clone, Debug)]
pub struct Engine {
    index: ContainerIndex,
    current_date: NaiveDate,
    config: PlannerConfig,
}

impl Engine {
    pub fn new(config: PlannerConfig, start_date: NaiveDate) -> Self {
        Self {
            index: ContainerIndex::new(),
            current_date: start_date,
            config,
        }
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // Import

    pub fn import_containers(&mut self, records: Vec<ContainerRecord>) -> ImportReport {
        import::import_containers(&mut self.index, records)
    }

    pub fn import_items(&mut self, records: Vec<ItemRecord>) -> ImportReport {
        import::import_items(&mut self.index, records)
    }

    pub fn remove_item(&mut self, item_id: &str) -> CargoResult<Item> {
        let item = self.index.remove_item(item_id)?;
        info!(item = item_id, "item removed");
        Ok(item)
    }

    // Placement

    pub fn place_item(&mut self, item_id: &str) -> CargoResult<PlacementDecision> {
        planner::place(&mut self.index, item_id, &self.config)
    }

    /// Places the given items, or every unplaced item when `item_ids` is empty.
    pub fn place_batch(&mut self, item_ids: &[ItemId]) -> CargoResult<PlacementReport> {
        self.place_batch_with_progress(item_ids, |_| {})
    }

    pub fn place_batch_with_progress(
        &mut self,
        item_ids: &[ItemId],
        on_event: impl FnMut(&PlacementEvent),
    ) -> CargoResult<PlacementReport> {
        let ids = if item_ids.is_empty() {
            self.unplaced_item_ids()
        } else {
            item_ids.to_vec()
        };
        planner::place_batch_with_progress(&mut self.index, &ids, &self.config, on_event)
    }

    fn unplaced_item_ids(&self) -> Vec<ItemId> {
        self.index
            .items()
            .filter(|item| !item.is_placed())
            .map(|item| item.id.clone())
            .collect()
    }

    // Retrieval

    pub fn plan_retrieval(&self, item_id: &str) -> CargoResult<RetrievalPlan> {
        retrieval::plan_retrieval(&self.index, item_id)
    }

    pub fn retrieve(&mut self, item_id: &str) -> CargoResult<RetrievalPlan> {
        retrieval::retrieve(&mut self.index, item_id)
    }

    // Rearrangement

    pub fn propose_rearrangement(&self) -> Vec<RearrangementPlan> {
        rearrangement::propose(&self.index, &self.config)
    }

    pub fn apply_rearrangement(&mut self, plan: &RearrangementPlan) -> CargoResult<Vec<AppliedMove>> {
        rearrangement::apply(&mut self.index, plan, &self.config)
    }

    // Waste

    pub fn identify_waste(&self) -> Vec<WasteItem> {
        waste::identify_waste(&self.index, self.current_date)
    }

    pub fn identify_waste_at(&self, date: NaiveDate) -> Vec<WasteItem> {
        waste::identify_waste(&self.index, date)
    }

    pub fn plan_return(
        &self,
        container_id: &str,
        undocking_date: NaiveDate,
        max_weight: f64,
    ) -> CargoResult<WasteManifest> {
        waste::plan_return(
            &self.index,
            self.current_date,
            container_id,
            undocking_date,
            max_weight,
            &self.config,
        )
    }

    pub fn apply_return(&mut self, manifest: &WasteManifest) -> CargoResult<Vec<ReturnMove>> {
        waste::apply_return(&mut self.index, manifest, &self.config)
    }

    pub fn complete_undocking(&mut self, container_id: &str) -> CargoResult<usize> {
        waste::complete_undocking(&mut self.index, container_id)
    }

    // Simulation

    pub fn advance(&mut self, days: i64, usage: &[ItemUsage]) -> CargoResult<SimulationResult> {
        let result = simulation::advance(&mut self.index, self.current_date, days, usage)?;
        self.current_date = result.new_date;
        Ok(result)
    }

    pub fn advance_to(
        &mut self,
        target: NaiveDate,
        usage: &[ItemUsage],
    ) -> CargoResult<SimulationResult> {
        let result = simulation::advance_to(&mut self.index, self.current_date, target, usage)?;
        self.current_date = result.new_date;
        Ok(result)
    }

    // Queries

    pub fn list_items(&self, filter: &ItemFilter) -> CargoResult<Vec<&Item>> {
        query::list_items(&self.index, filter)
    }

    pub fn list_containers(&self, filter: &ContainerFilter) -> CargoResult<Vec<ContainerSummary>> {
        query::list_containers(&self.index, filter)
    }

    pub fn export_arrangement(&self) -> ArrangementSnapshot {
        query::export_arrangement(&self.index, self.current_date)
    }

    pub fn statistics(&self) -> PlacementStatistics {
        query::statistics(&self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CargoError;
    use crate::types::Axis;

    fn engine() -> Engine {
        Engine::new(
            PlannerConfig::default(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
    }

    fn container(id: &str) -> ContainerRecord {
        ContainerRecord {
            container_id: id.into(),
            zone: "Lab".into(),
            width: 20,
            depth: 20,
            height: 20,
            max_weight: 100.0,
            is_active: true,
            retrieval_axis: Axis::Depth,
        }
    }

    fn item(id: &str) -> ItemRecord {
        ItemRecord {
            item_id: id.into(),
            name: id.into(),
            width: 10,
            depth: 10,
            height: 10,
            mass: 1.0,
            priority: None,
            preferred_zone: None,
            expiry_date: None,
            usage_limit: Some(1),
            placement: None,
        }
    }

    #[test]
    fn empty_batch_places_every_unplaced_item() {
        let mut engine = engine();
        engine.import_containers(vec![container("c")]);
        engine.import_items(vec![item("a"), item("b")]);
        let report = engine.place_batch(&[]).unwrap();
        assert_eq!(report.placed_count(), 2);
        assert_eq!(engine.statistics().placed_items, 2);
    }

    #[test]
    fn advancing_moves_the_clock() {
        let mut engine = engine();
        engine.import_items(vec![item("a")]);
        let result = engine.advance(2, &[ItemUsage::new("a", 1)]).unwrap();
        assert_eq!(result.previous_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(engine.current_date(), NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(engine.identify_waste().len(), 1);
        assert!(matches!(
            engine.advance_to(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), &[]),
            Err(CargoError::InvalidRange(_))
        ));
    }

    #[test]
    fn retrieve_then_snapshot() {
        let mut engine = engine();
        engine.import_containers(vec![container("c")]);
        engine.import_items(vec![item("a")]);
        engine.place_item("a").unwrap();
        engine.retrieve("a").unwrap();
        assert_eq!(engine.export_arrangement().unplaced, vec!["a".to_string()]);
        assert!(engine.remove_item("a").is_ok());
        assert!(engine.remove_item("a").is_err());
    }
}
