//! Inventory collaborator
//!
//! Loads stock records from CSV, exposes them to the trend engine as a read-only
//! keyed lookup, and correlates trend records with stock levels into product
//! actions.
//!
//! # Header inference
//!
//! Column names are matched case-insensitively against aliases, so exports from
//! different tools load without remapping:
//!
//! | Field | Accepted headers |
//! |-------|------------------|
//! | product name | `product_name`, `product`, `name`, `item`, `item_name` |
//! | stock | `current_stock`, `stock`, `quantity`, `qty`, `on_hand` |
//! | reorder point | `reorder_point`, `reorder`, `min_stock`, `reorder_level` |
//! | category | `category`, `type`, `department` |
//! | unit price | `unit_price`, `price`, `cost`, `unit_cost` |
//! | location | `warehouse_location`, `location`, `bin`, `warehouse` |
//!
//! Product name and stock are required; a missing reorder point defaults to 20% of
//! stock, rounded up.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{AtimErrorTrait, ErrorCategory};
use crate::trends::types::{TrendRecord, TrendState};
use crate::utils::normalize_keyword;

const NAME_ALIASES: &[&str] = &["product_name", "product", "name", "item", "item_name"];
const STOCK_ALIASES: &[&str] = &["current_stock", "stock", "quantity", "qty", "on_hand"];
const REORDER_ALIASES: &[&str] = &["reorder_point", "reorder", "min_stock", "reorder_level"];
const CATEGORY_ALIASES: &[&str] = &["category", "type", "department"];
const PRICE_ALIASES: &[&str] = &["unit_price", "price", "cost", "unit_cost"];
const LOCATION_ALIASES: &[&str] = &["warehouse_location", "location", "bin", "warehouse"];

/// Canonical header written by [`CsvInventory::save`]
pub const CANONICAL_HEADER: [&str; 6] = [
    "product_name",
    "category",
    "current_stock",
    "reorder_point",
    "unit_price",
    "warehouse_location",
];

/// Share of stock used as reorder point when the column is missing
const DEFAULT_REORDER_RATIO: f64 = 0.2;

/// Inventory errors
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Failed to access inventory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column '{0}' not found in inventory header")]
    MissingColumn(&'static str),

    #[error("Invalid {column} '{value}' on row {row}")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },
}

impl AtimErrorTrait for InventoryError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } => ErrorCategory::Storage,
            Self::Csv(_) | Self::MissingColumn(_) | Self::InvalidValue { .. } => ErrorCategory::Data,
        }
    }
}

/// One stocked product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_name: String,
    pub category: String,
    pub current_stock: u32,
    pub reorder_point: u32,
    pub unit_price: f64,
    pub warehouse_location: String,
}

impl InventoryItem {
    pub fn new(product_name: impl Into<String>, current_stock: u32, reorder_point: u32) -> Self {
        Self {
            product_name: product_name.into(),
            category: String::from("General"),
            current_stock,
            reorder_point,
            unit_price: 0.0,
            warehouse_location: String::new(),
        }
    }

    /// Stock at or below the reorder point
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_point
    }

    /// Stock value at unit price
    pub fn stock_value(&self) -> f64 {
        f64::from(self.current_stock) * self.unit_price
    }

    /// Urgency of a low-stock item; `None` when stock is sufficient
    pub fn urgency(&self) -> Option<Urgency> {
        if !self.is_low_stock() {
            None
        } else if f64::from(self.current_stock) < f64::from(self.reorder_point) * 0.5 {
            Some(Urgency::Urgent)
        } else {
            Some(Urgency::Reorder)
        }
    }
}

/// Read-only keyed access to inventory records
pub trait InventoryLookup: Send + Sync {
    /// Item whose product name matches `keyword` case-insensitively
    fn lookup(&self, keyword: &str) -> Option<&InventoryItem>;
}

/// Urgency of a low-stock alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Stock below half of the reorder point
    Urgent,
    /// Stock at or below the reorder point
    Reorder,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "URGENT",
            Self::Reorder => "REORDER",
        }
    }
}

/// Item at or below its reorder point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockAlert {
    pub item: InventoryItem,
    pub urgency: Urgency,
}

/// Aggregate inventory figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_items: usize,
    pub low_stock_items: usize,
    pub total_inventory_value: f64,
}

/// Inventory held in memory, persisted as CSV
#[derive(Debug, Clone, Default)]
pub struct CsvInventory {
    items: Vec<InventoryItem>,
    index: HashMap<String, usize>,
}

impl CsvInventory {
    /// Build from items; later duplicates of a product name win the lookup
    pub fn from_items(items: Vec<InventoryItem>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (normalize_keyword(&item.product_name), i))
            .collect();
        Self { items, index }
    }

    /// Load from a CSV file
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let file = std::fs::File::open(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let inventory = Self::from_reader(file)?;
        info!(path = %path.display(), items = inventory.len(), "Loaded inventory");
        Ok(inventory)
    }

    /// Parse CSV with inferred headers
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, InventoryError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns = ColumnMap::infer(rdr.headers()?)?;
        debug!(?columns, "Inferred inventory columns");

        let mut items = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            // Header is row 1
            let row = i + 2;

            let Some(name) = record.get(columns.name).filter(|n| !n.is_empty()) else {
                continue;
            };

            let current_stock = parse_count(record.get(columns.stock), row, "current_stock")?
                .unwrap_or(0);

            let reorder_point = match columns.reorder {
                Some(col) => parse_count(record.get(col), row, "reorder_point")?,
                None => None,
            }
            .unwrap_or_else(|| default_reorder_point(current_stock));

            let unit_price = match columns.price {
                Some(col) => parse_price(record.get(col), row)?,
                None => 0.0,
            };

            let text = |col: Option<usize>| {
                col.and_then(|c| record.get(c))
                    .map(str::to_string)
                    .unwrap_or_default()
            };

            let mut category = text(columns.category);
            if category.is_empty() {
                category = String::from("General");
            }

            items.push(InventoryItem {
                product_name: name.to_string(),
                category,
                current_stock,
                reorder_point,
                unit_price,
                warehouse_location: text(columns.location),
            });
        }

        Ok(Self::from_items(items))
    }

    /// Write to a CSV file with the canonical header
    pub fn save(&self, path: &Path) -> Result<(), InventoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| InventoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = std::fs::File::create(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.to_writer(file)?;

        info!(path = %path.display(), items = self.len(), "Saved inventory");
        Ok(())
    }

    /// Write CSV with the canonical header
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), InventoryError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(CANONICAL_HEADER)?;

        for item in &self.items {
            let stock = item.current_stock.to_string();
            let reorder = item.reorder_point.to_string();
            let price = format!("{:.2}", item.unit_price);
            wtr.write_record([
                item.product_name.as_str(),
                item.category.as_str(),
                stock.as_str(),
                reorder.as_str(),
                price.as_str(),
                item.warehouse_location.as_str(),
            ])?;
        }

        wtr.flush().map_err(|e| InventoryError::Csv(e.into()))?;
        Ok(())
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Normalized product names in file order, usable as trend keywords
    pub fn keywords(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| normalize_keyword(&item.product_name))
            .collect()
    }

    /// Item counts and stock value
    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            total_items: self.items.len(),
            low_stock_items: self.items.iter().filter(|i| i.is_low_stock()).count(),
            total_inventory_value: self.items.iter().map(InventoryItem::stock_value).sum(),
        }
    }

    /// Items at or below their reorder point, in file order
    pub fn low_stock(&self) -> Vec<LowStockAlert> {
        self.items
            .iter()
            .filter_map(|item| {
                item.urgency().map(|urgency| LowStockAlert {
                    item: item.clone(),
                    urgency,
                })
            })
            .collect()
    }
}

impl InventoryLookup for CsvInventory {
    fn lookup(&self, keyword: &str) -> Option<&InventoryItem> {
        self.index
            .get(&normalize_keyword(keyword))
            .and_then(|&i| self.items.get(i))
    }
}

fn default_reorder_point(stock: u32) -> u32 {
    (f64::from(stock) * DEFAULT_REORDER_RATIO).ceil() as u32
}

#[derive(Debug)]
struct ColumnMap {
    name: usize,
    stock: usize,
    reorder: Option<usize>,
    category: Option<usize>,
    price: Option<usize>,
    location: Option<usize>,
}

impl ColumnMap {
    fn infer(headers: &csv::StringRecord) -> Result<Self, InventoryError> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_lowercase().replace([' ', '-'], "_"))
            .collect();

        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        Ok(Self {
            name: find(NAME_ALIASES).ok_or(InventoryError::MissingColumn("product_name"))?,
            stock: find(STOCK_ALIASES).ok_or(InventoryError::MissingColumn("current_stock"))?,
            reorder: find(REORDER_ALIASES),
            category: find(CATEGORY_ALIASES),
            price: find(PRICE_ALIASES),
            location: find(LOCATION_ALIASES),
        })
    }
}

fn parse_count(value: Option<&str>, row: usize, column: &'static str) -> Result<Option<u32>, InventoryError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let invalid = || InventoryError::InvalidValue {
        row,
        column,
        value: raw.to_string(),
    };

    // Whole numbers only; spreadsheet exports may still write "12.0"
    let number: f64 = raw.replace(',', "").parse().map_err(|_| invalid())?;
    if !number.is_finite() || number < 0.0 || number > f64::from(u32::MAX) || number.fract() != 0.0 {
        return Err(invalid());
    }
    Ok(Some(number as u32))
}

fn parse_price(value: Option<&str>, row: usize) -> Result<f64, InventoryError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(0.0);
    };

    let price: f64 = raw
        .trim_start_matches('$')
        .replace(',', "")
        .parse()
        .map_err(|_| InventoryError::InvalidValue {
            row,
            column: "unit_price",
            value: raw.to_string(),
        })?;

    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(InventoryError::InvalidValue {
            row,
            column: "unit_price",
            value: raw.to_string(),
        })
    }
}

// ============================================================================
// Trend correlation
// ============================================================================

/// Stock action suggested by a trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Stock is low; replenish now
    Reorder,
    /// Demand is climbing; raise stock levels
    IncreaseStock,
    /// Demand is at its peak; move to a prime warehouse or store position
    Reposition,
    /// Demand is falling with stock on hand; discount to clear
    Markdown,
    /// No change needed
    Hold,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reorder => "Reorder",
            Self::IncreaseStock => "Increase stock",
            Self::Reposition => "Reposition",
            Self::Markdown => "Markdown",
            Self::Hold => "Hold",
        }
    }
}

/// Trend record joined with the matching inventory item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAction {
    pub keyword: String,
    pub product_name: String,
    pub state: TrendState,
    pub confidence: f64,
    pub current_stock: u32,
    pub reorder_point: u32,
    pub action: ActionKind,
    pub rationale: String,
}

/// Decide the action for an item under a trend state
pub fn decide_action(state: TrendState, item: &InventoryItem) -> ActionKind {
    let low = item.is_low_stock();
    match state {
        TrendState::Rising if low => ActionKind::Reorder,
        TrendState::Rising if item.current_stock < item.reorder_point.saturating_mul(2) => {
            ActionKind::IncreaseStock
        }
        TrendState::Rising => ActionKind::Hold,
        TrendState::Peaking => ActionKind::Reposition,
        TrendState::Declining if item.current_stock > item.reorder_point => ActionKind::Markdown,
        TrendState::Declining => ActionKind::Hold,
        TrendState::Stable if low => ActionKind::Reorder,
        TrendState::Stable => ActionKind::Hold,
    }
}

fn rationale(state: TrendState, action: ActionKind, item: &InventoryItem) -> String {
    let stock = format!("{} on hand, reorder point {}", item.current_stock, item.reorder_point);
    match action {
        ActionKind::Reorder => format!("{state} demand with low stock ({stock})"),
        ActionKind::IncreaseStock => format!("Rising demand; stock below twice the reorder point ({stock})"),
        ActionKind::Reposition => format!("Interest is at its peak; give it prime placement ({stock})"),
        ActionKind::Markdown => format!("Declining demand with surplus stock ({stock})"),
        ActionKind::Hold => format!("{state} demand; stock is adequate ({stock})"),
    }
}

/// Join trend records with inventory, in record order
///
/// Records without a matching item are left out.
pub fn correlate(records: &[TrendRecord], lookup: &dyn InventoryLookup) -> Vec<ProductAction> {
    records
        .iter()
        .filter_map(|record| {
            let item = lookup.lookup(&record.keyword)?;
            let action = decide_action(record.state, item);
            Some(ProductAction {
                keyword: record.keyword.clone(),
                product_name: item.product_name.clone(),
                state: record.state,
                confidence: record.confidence,
                current_stock: item.current_stock,
                reorder_point: item.reorder_point,
                action,
                rationale: rationale(record.state, action, item),
            })
        })
        .collect()
}
