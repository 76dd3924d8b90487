use anyhow::{Context, Result};
use std::path::PathBuf;

use atim::config::Config;
use atim::inventory::CsvInventory;

pub fn inventory(config: Config, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or(config.inventory.csv_path);
    let inventory = CsvInventory::load(&path)
        .with_context(|| format!("Failed to load inventory: {}", path.display()))?;

    let summary = inventory.summary();

    println!("Inventory: {}", path.display());
    println!("================================");
    println!("  Total items:      {}", summary.total_items);
    println!("  Low stock items:  {}", summary.low_stock_items);
    println!("  Inventory value:  ${:.2}", summary.total_inventory_value);

    let alerts = inventory.low_stock();
    if alerts.is_empty() {
        println!("\nAll items are above their reorder point.");
        return Ok(());
    }

    println!("\nLow Stock Alerts");
    println!("--------------------------------");
    for alert in &alerts {
        println!(
            "  [{}] {} ({}): {} left, reorder at {}, location {}",
            alert.urgency.as_str(),
            alert.item.product_name,
            alert.item.category,
            alert.item.current_stock,
            alert.item.reorder_point,
            if alert.item.warehouse_location.is_empty() {
                "-"
            } else {
                alert.item.warehouse_location.as_str()
            },
        );
    }

    Ok(())
}
