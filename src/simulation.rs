//! Time simulation: advances the clock, consumes uses and tracks expiry.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::{CargoError, CargoResult};
use crate::index::ContainerIndex;
use crate::model::ItemId;
use crate::waste::{WasteItem, identify_waste};

fn one() -> u32 {
    1
}

/// Uses of one item per simulated day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemUsage {
    pub item_id: ItemId,
    #[serde(default = "one")]
    pub count: u32,
}

impl ItemUsage {
    pub fn new(item_id: impl Into<ItemId>, count: u32) -> Self {
        Self {
            item_id: item_id.into(),
            count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UsedItem {
    pub item_id: ItemId,
    /// Uses actually consumed over the whole horizon.
    pub uses: u32,
    /// Remaining uses afterwards; `None` for unlimited items.
    pub remaining: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimulationResult {
    pub previous_date: NaiveDate,
    pub new_date: NaiveDate,
    pub days_simulated: u64,
    pub items_used: Vec<UsedItem>,
    /// Items whose expiry passed during the horizon.
    pub items_expired: Vec<ItemId>,
    /// Items whose usage counter reached zero during the horizon.
    pub items_depleted: Vec<ItemId>,
    pub waste: Vec<WasteItem>,
}

/// Advances the clock by `days`, applying `usage` once per day.
pub fn advance(
    index: &mut ContainerIndex,
    current_date: NaiveDate,
    days: i64,
    usage: &[ItemUsage],
) -> CargoResult<SimulationResult> {
    if days <= 0 {
        return Err(CargoError::InvalidRange(format!(
            "days to simulate must be positive, got: {}",
            days
        )));
    }
    for entry in usage {
        index.item(&entry.item_id)?;
    }
    let days = days.unsigned_abs();
    let new_date = current_date
        .checked_add_days(Days::new(days))
        .ok_or_else(|| CargoError::InvalidRange(format!("cannot advance {} days", days)))?;

    let mut used: BTreeMap<ItemId, u32> = BTreeMap::new();
    let mut depleted = Vec::new();
    for day in 1..=days {
        for entry in usage {
            let limit = index.usage_limit_mut(&entry.item_id)?;
            let consumed = match limit {
                Some(remaining) => {
                    let consumed = entry.count.min(*remaining);
                    let before = *remaining;
                    *remaining -= consumed;
                    if before > 0 && *remaining == 0 {
                        depleted.push(entry.item_id.clone());
                    }
                    consumed
                }
                None => entry.count,
            };
            *used.entry(entry.item_id.clone()).or_default() += consumed;
        }
        debug!(day, "simulated day");
    }

    let items_used = used
        .into_iter()
        .map(|(item_id, uses)| {
            let remaining = index.item(&item_id)?.usage_limit;
            Ok(UsedItem {
                item_id,
                uses,
                remaining,
            })
        })
        .collect::<CargoResult<Vec<_>>>()?;

    let items_expired = index
        .items()
        .filter(|item| item.is_expired(new_date) && !item.is_expired(current_date))
        .map(|item| item.id.clone())
        .collect();

    let waste = identify_waste(index, new_date);
    info!(
        from = %current_date,
        to = %new_date,
        waste = waste.len(),
        "simulation advanced"
    );
    Ok(SimulationResult {
        previous_date: current_date,
        new_date,
        days_simulated: days,
        items_used,
        items_expired,
        items_depleted: depleted,
        waste,
    })
}

/// Advances the clock to `target`, which must lie after `current_date`.
pub fn advance_to(
    index: &mut ContainerIndex,
    current_date: NaiveDate,
    target: NaiveDate,
    usage: &[ItemUsage],
) -> CargoResult<SimulationResult> {
    if target <= current_date {
        return Err(CargoError::InvalidRange(format!(
            "target date {} must lie after the current date {}",
            target, current_date
        )));
    }
    advance(index, current_date, (target - current_date).num_days(), usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::types::Dims;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn index_with(items: Vec<Item>) -> ContainerIndex {
        let mut index = ContainerIndex::new();
        for item in items {
            index.insert_item(item).unwrap();
        }
        index
    }

    fn item(id: &str) -> Item {
        Item::new(id, id, Dims::new(1, 1, 1), 1.0).unwrap()
    }

    #[test]
    fn single_use_item_is_depleted() {
        let mut index = index_with(vec![item("kit").with_usage_limit(1)]);
        let result = advance(&mut index, date(2025, 1, 1), 1, &[ItemUsage::new("kit", 1)]).unwrap();
        assert_eq!(result.items_depleted, vec!["kit".to_string()]);
        assert_eq!(index.item("kit").unwrap().usage_limit, Some(0));
        assert_eq!(result.new_date, date(2025, 1, 2));
        assert_eq!(result.waste.len(), 1);
    }

    #[test]
    fn usage_is_clamped_and_depletion_reported_once() {
        let mut index = index_with(vec![item("kit").with_usage_limit(3), item("tool")]);
        let usage = [ItemUsage::new("kit", 2), ItemUsage::new("tool", 1)];
        let result = advance(&mut index, date(2025, 1, 1), 3, &usage).unwrap();

        assert_eq!(result.items_depleted, vec!["kit".to_string()]);
        assert_eq!(
            result.items_used,
            vec![
                UsedItem {
                    item_id: "kit".into(),
                    uses: 3,
                    remaining: Some(0)
                },
                UsedItem {
                    item_id: "tool".into(),
                    uses: 3,
                    remaining: None
                },
            ]
        );
    }

    #[test]
    fn expiry_is_reported_when_it_passes() {
        let mut index = index_with(vec![
            item("milk").with_expiry(date(2025, 1, 3)),
            item("old").with_expiry(date(2024, 12, 1)),
            item("fresh").with_expiry(date(2025, 6, 1)),
        ]);
        let result = advance(&mut index, date(2025, 1, 1), 2, &[]).unwrap();
        assert!(result.items_expired.is_empty());

        let result = advance_to(&mut index, date(2025, 1, 3), date(2025, 1, 10), &[]).unwrap();
        assert_eq!(result.items_expired, vec!["milk".to_string()]);
        assert_eq!(result.days_simulated, 7);
        let waste: Vec<_> = result.waste.iter().map(|w| w.item_id.as_str()).collect();
        assert_eq!(waste, vec!["milk", "old"]);
    }

    #[test]
    fn rejects_bad_ranges_and_unknown_items() {
        let mut index = index_with(vec![item("kit").with_usage_limit(2)]);
        let today = date(2025, 1, 1);
        assert!(matches!(advance(&mut index, today, 0, &[]), Err(CargoError::InvalidRange(_))));
        assert!(matches!(advance_to(&mut index, today, today, &[]), Err(CargoError::InvalidRange(_))));

        let usage = [ItemUsage::new("kit", 1), ItemUsage::new("ghost", 1)];
        assert!(matches!(
            advance(&mut index, today, 1, &usage),
            Err(CargoError::NotFound { .. })
        ));
        assert_eq!(index.item("kit").unwrap().usage_limit, Some(2));
    }
}
