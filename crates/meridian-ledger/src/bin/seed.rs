//! Seed Data Generator for Meridian Ledger
//!
//! Stocks a handful of branches with the same catalog and adds one live
//! promotion, so orders and transfers can be tried against a fresh database.
//!
//! ## Usage
//! ```bash
//! cargo run -p meridian-ledger --bin seed
//! cargo run -p meridian-ledger --bin seed -- --db ./meridian_dev.db
//! cargo run -p meridian-ledger --bin seed -- --config ./ledger.toml
//! ```

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use meridian_core::{Product, Promotion, PromotionCondition, PromotionEffect};
use meridian_ledger::{logging, Backend, LedgerConfig};

/// Branches that receive the catalog.
const BRANCHES: &[&str] = &["main", "north", "harbor"];

/// (category, [(code, name, sale price cents, tax bps)])
const CATALOG: &[(&str, &[(&str, &str, i64, u32)])] = &[
    (
        "Beverages",
        &[
            ("BEV-COLA", "Cola 500ml", 199, 825),
            ("BEV-WATR", "Spring Water 1L", 129, 0),
            ("BEV-COFF", "Cold Brew Coffee", 349, 825),
            ("BEV-JUIC", "Orange Juice 1L", 399, 0),
        ],
    ),
    (
        "Snacks",
        &[
            ("SNK-CHIP", "Potato Chips", 249, 825),
            ("SNK-PRTZ", "Pretzels", 219, 825),
            ("SNK-BAR", "Granola Bar", 149, 825),
        ],
    ),
    (
        "Grocery",
        &[
            ("GRO-RICE", "Rice 2kg", 599, 0),
            ("GRO-FLOR", "Flour 1kg", 289, 0),
            ("GRO-SUGR", "Sugar 1kg", 259, 0),
        ],
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file, overrides the config");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path).context("loading ledger config")?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    logging::init(&config.logging);

    println!("Meridian Ledger Seed Data Generator");
    println!("===================================");
    println!("Database: {}", config.database.path.display());
    println!("Branches: {}", BRANCHES.join(", "));
    println!();

    let backend = Backend::connect(&config)
        .await
        .context("opening ledger database")?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let inventory = backend.inventory();
    let products = backend.database().products();
    let now = Utc::now();

    for (branch_idx, branch_id) in BRANCHES.iter().enumerate() {
        let existing = inventory.stock_levels(branch_id).await?;
        if !existing.is_empty() {
            println!(
                "⚠ Branch {} already has {} products, skipping",
                branch_id,
                existing.len()
            );
            continue;
        }

        let mut inserted = 0;
        for (category, items) in CATALOG {
            for (item_idx, (code, name, price_cents, tax_rate_bps)) in items.iter().enumerate() {
                let product = Product {
                    // Same id in every branch so transfers can move it.
                    id: code.to_lowercase(),
                    branch_id: branch_id.to_string(),
                    code: code.to_string(),
                    name: name.to_string(),
                    category: Some(category.to_string()),
                    stock_quantity: (10 + branch_idx * 15 + item_idx * 7) as i64,
                    cost_price_cents: price_cents * 65 / 100,
                    sale_price_cents: *price_cents,
                    tax_rate_bps: *tax_rate_bps,
                    created_at: now,
                    updated_at: now,
                };

                if let Err(e) = products.insert(&product).await {
                    eprintln!("Failed to insert {} at {}: {}", code, branch_id, e);
                    continue;
                }
                inserted += 1;
            }
        }
        println!("✓ Branch {}: {} products", branch_id, inserted);
    }

    let promotion = Promotion {
        id: Uuid::new_v4().to_string(),
        name: "Beverage week 10%".to_string(),
        effect: PromotionEffect::PercentageBps(1000),
        condition: PromotionCondition::Category("Beverages".to_string()),
        active: true,
        starts_at: Some(now),
        ends_at: Some(now + chrono::Duration::days(7)),
        created_at: now,
    };
    backend
        .database()
        .promotions()
        .insert(&promotion)
        .await
        .context("inserting sample promotion")?;
    println!("✓ Promotion '{}' live for 7 days", promotion.name);

    println!();
    println!("Stock levels:");
    for branch_id in BRANCHES {
        for product in inventory.stock_levels(branch_id).await? {
            println!(
                "  {:<8} {:<10} {:>4}",
                branch_id, product.code, product.stock_quantity
            );
        }
    }

    backend.shutdown().await;

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
