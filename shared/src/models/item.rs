//! Item (stock-keeping unit) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::StockLedger;

/// A stock-keeping unit tracked through the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Unique item code (e.g., "STL-ROD-12")
    pub code: String,
    pub name: String,
    /// Unit of measure (kg, pcs, m, ...)
    pub unit: String,
    pub unit_price: Decimal,
    /// Reorder threshold against available raw stock
    pub minimum_stock: Decimal,
    pub item_type: ItemType,
    /// Items with movement history are deactivated, never deleted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Whether available stock has fallen to or below the reorder threshold.
    pub fn is_below_minimum(&self, available: Decimal) -> bool {
        self.minimum_stock > Decimal::ZERO && available <= self.minimum_stock
    }
}

/// Kind of stock-keeping unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Purchased raw material
    Material,
    /// Manufactured product
    Product,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Material => "material",
            ItemType::Product => "product",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "material" => Some(ItemType::Material),
            "product" => Some(ItemType::Product),
            _ => None,
        }
    }
}

/// Item together with its aggregate per-state quantities. The aggregate must
/// equal the sum of the same states across the item's batches.
#[derive(Debug, Clone, Serialize)]
pub struct ItemStock {
    pub item: Item,
    pub states: StockLedger,
}

impl ItemStock {
    pub fn total_quantity(&self) -> Decimal {
        self.states.total_quantity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(minimum: i64) -> Item {
        Item {
            id: Uuid::new_v4(),
            code: "STL-ROD-12".to_string(),
            name: "Steel Rod 12mm".to_string(),
            unit: "kg".to_string(),
            unit_price: Decimal::from(52),
            minimum_stock: Decimal::from(minimum),
            item_type: ItemType::Material,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_below_minimum() {
        let item = item(100);
        assert!(item.is_below_minimum(Decimal::from(100)));
        assert!(item.is_below_minimum(Decimal::from(40)));
        assert!(!item.is_below_minimum(Decimal::from(101)));
    }

    #[test]
    fn test_zero_threshold_never_triggers() {
        let item = item(0);
        assert!(!item.is_below_minimum(Decimal::ZERO));
    }
}
