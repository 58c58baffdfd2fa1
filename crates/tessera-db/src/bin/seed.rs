//! # Seed Data Generator
//!
//! Populates the database with draft and issued invoices for development.
//!
//! ## Usage
//! ```bash
//! # Generate 50 documents (default) into ./tessera_dev.db
//! cargo run -p tessera-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p tessera-db --bin seed -- --count 200
//!
//! # Use a config file (database path, tenant, strategy)
//! cargo run -p tessera-db --bin seed -- --config ./tessera.toml
//! ```
//!
//! ## Generated Documents
//! Each document gets 1-6 lines drawn from a small service catalog, with a
//! mix of percentage and absolute line discounts. Every third document is
//! issued after saving.

use std::env;
use std::path::PathBuf;

use tessera_core::{DocumentHeaderInput, DocumentStatus, ItemId, LineItemInput, Principal};
use tessera_db::{Database, TesseraConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (description, unit price) pairs
const CATALOG: &[(&str, f64)] = &[
    ("Consulting (hour)", 95.0),
    ("Design review", 450.0),
    ("Hosting (month)", 29.9),
    ("Support retainer", 1200.0),
    ("Travel expenses", 184.35),
    ("Training session", 780.0),
    ("License seat", 49.0),
    ("Data migration", 2150.0),
];

/// Tax rates in percent
const TAX_RATES: &[f64] = &[0.0, 7.0, 19.0, 21.0];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tessera Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of documents to generate (default: 50)");
                println!("  -d, --db <PATH>      Database file path (default: ./tessera_dev.db)");
                println!("      --config <PATH>  TOML config file");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = TesseraConfig::load(config_path.as_deref())?;
    match db_path {
        Some(path) => config.database.path = path,
        None if config_path.is_none() => config.database.path = "./tessera_dev.db".to_string(),
        None => {}
    }

    info!(
        database = %config.database.path,
        documents = count,
        strategy = %config.documents.save_strategy,
        "Seeding database"
    );

    let db = Database::new(config.db_config()).await?;
    let persister = db.persister(config.persister_config());
    let principal = Principal::new(config.documents.default_tenant.clone(), "seed");

    let existing = persister.list(&principal).await?.len();
    if existing > 0 {
        warn!(
            existing,
            "Database already has documents for this tenant, skipping seed"
        );
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut issued = 0;

    for seed in 0..count {
        let (header, items) = generate_document(seed);

        let outcome = match persister.save(&principal, header, items).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(seed, error = %e, "Failed to save document");
                continue;
            }
        };
        generated += 1;

        if seed % 3 == 0 {
            persister
                .transition(&principal, outcome.document_id, DocumentStatus::Issued)
                .await?;
            issued += 1;
        }

        if generated % 25 == 0 {
            info!(generated, "Progress");
        }
    }

    info!(
        generated,
        issued,
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    Ok(())
}

/// Generates one document's header and lines from a seed.
fn generate_document(seed: usize) -> (DocumentHeaderInput, Vec<LineItemInput>) {
    let header = DocumentHeaderInput {
        tax_rate: TAX_RATES[seed % TAX_RATES.len()],
        discount_amount: if seed % 5 == 0 { 25.0 } else { 0.0 },
        shipping_cost: if seed % 2 == 0 { 9.95 } else { 0.0 },
        notes: Some(format!("Seed document #{}", seed + 1)),
        ..DocumentHeaderInput::default()
    };

    let line_count = 1 + seed % 6;
    let items = (0..line_count)
        .map(|line| {
            let (description, price) = CATALOG[(seed * 7 + line * 3) % CATALOG.len()];
            let quantity = 1.0 + ((seed + line) % 4) as f64 * 0.5;

            LineItemInput {
                id: Some(ItemId::new_transient()),
                description: description.to_string(),
                quantity,
                unit_price: price,
                discount_percentage: (line % 3 == 1).then_some(10.0),
                discount_amount: (line % 4 == 2).then_some(15.0),
                ..LineItemInput::default()
            }
        })
        .collect();

    (header, items)
}
