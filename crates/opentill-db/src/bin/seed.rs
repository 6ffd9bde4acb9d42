//! # Seed Data Generator
//!
//! Populates the database with a development menu and floor plan.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p opentill-db --bin seed
//!
//! # Specify database path
//! cargo run -p opentill-db --bin seed -- --db ./data/opentill.db
//! ```
//!
//! ## Generated Data
//! - A café menu: espresso drinks, teas and pastries, each with size
//!   variants. Pastries track stock (they run out); drinks do not.
//! - Six dining tables (T1-T6), all starting Available.

use chrono::Utc;
use std::env;

use opentill_core::Variant;
use opentill_db::{Database, DbConfig};
use uuid::Uuid;

/// Menu: (product, options as (option_name, price_cents), track_stock, stock per option)
const MENU: &[(&str, &[(&str, i64)], bool, i64)] = &[
    (
        "Latte",
        &[("Small", 300), ("Large", 350)],
        false,
        0,
    ),
    (
        "Cappuccino",
        &[("Small", 300), ("Large", 350)],
        false,
        0,
    ),
    (
        "Espresso",
        &[("Single", 200), ("Double", 250)],
        false,
        0,
    ),
    (
        "Flat White",
        &[("Regular", 325)],
        false,
        0,
    ),
    (
        "English Breakfast Tea",
        &[("Regular", 250)],
        false,
        0,
    ),
    (
        "Muffin",
        &[("Blueberry", 275), ("Chocolate", 275)],
        true,
        12,
    ),
    (
        "Croissant",
        &[("Plain", 300), ("Almond", 375)],
        true,
        8,
    ),
    (
        "Banana Bread",
        &[("Slice", 325)],
        true,
        6,
    ),
];

const TABLES: &[&str] = &["T1", "T2", "T3", "T4", "T5", "T6"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./opentill_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("OpenTill Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./opentill_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 OpenTill Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.variants().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} variants", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding menu...");

    let now = Utc::now();
    let mut seeded = 0;

    for (product_name, options, track_stock, stock) in MENU {
        for (option_name, price_cents) in *options {
            let variant = Variant {
                id: Uuid::new_v4().to_string(),
                product_name: product_name.to_string(),
                option_name: option_name.to_string(),
                price_cents: *price_cents,
                stock_quantity: *stock,
                track_stock: *track_stock,
                is_active: true,
                created_at: now,
                updated_at: now,
            };

            if let Err(e) = db.variants().insert(&variant).await {
                eprintln!("Failed to insert {}: {}", variant.name(), e);
                continue;
            }
            seeded += 1;
        }
    }

    println!("✓ Seeded {} variants", seeded);

    println!();
    println!("Seeding floor plan...");

    for table_number in TABLES {
        db.tables().create(table_number).await?;
    }

    println!("✓ Seeded {} tables", TABLES.len());
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
