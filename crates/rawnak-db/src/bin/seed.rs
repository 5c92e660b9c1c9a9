//! # Seed Cache Generator
//!
//! Writes the demo dataset for one branch into a SQLite cache file, so an
//! offline install starts with a populated cache.
//!
//! ## Usage
//! ```bash
//! # Seed the default branch into ./rawnak_cache.db
//! cargo run -p rawnak-db --bin seed
//!
//! # Another branch and file, replacing existing entries
//! cargo run -p rawnak-db --bin seed -- --branch b2 --db ./data/cache.db --force
//! ```
//!
//! ## Written Keys
//! - `products_{branch}`, `customers_{branch}`, `sales_{branch}` (empty)
//! - `categories_{branch}`, `settings_{branch}`
//! - `branches` when no branch list is cached yet

use std::env;

use chrono::Utc;
use rawnak_core::{seed, Branch, BranchSettings, Sale, DEFAULT_BRANCH_ID};
use rawnak_db::cache::{self, BRANCHES_KEY};
use rawnak_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./rawnak_cache.db");
    let mut branch_id = String::from(DEFAULT_BRANCH_ID);
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--branch" | "-b" => {
                if i + 1 < args.len() {
                    branch_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--force" | "-f" => force = true,
            "--help" | "-h" => {
                println!("Rawnak Sales Seed Cache Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Cache file path (default: ./rawnak_cache.db)");
                println!("  -b, --branch <ID>    Branch to seed (default: main)");
                println!("  -f, --force          Overwrite existing entries");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(db = %db_path, branch = %branch_id, "Seeding local cache");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let repo = db.cache();

    let products_key = cache::collection_key("products", &branch_id);
    if !force && repo.get(&products_key).await?.is_some() {
        println!("⚠ Cache already has '{}'", products_key);
        println!("  Skipping seed to avoid overwriting synced data.");
        println!("  Pass --force to overwrite.");
        return Ok(());
    }

    let products = seed::initial_products();
    let customers = seed::initial_customers(Utc::now().date_naive());
    let sales: Vec<Sale> = Vec::new();

    cache::write_json(&repo, &products_key, &products).await?;
    cache::write_json(&repo, &cache::collection_key("customers", &branch_id), &customers).await?;
    cache::write_json(&repo, &cache::collection_key("sales", &branch_id), &sales).await?;
    cache::write_json(&repo, &cache::categories_key(&branch_id), &seed::initial_categories())
        .await?;
    cache::write_json(&repo, &cache::settings_key(&branch_id), &BranchSettings::default())
        .await?;

    let cached_branches: Option<Vec<Branch>> = cache::read_json(&repo, BRANCHES_KEY).await;
    if cached_branches.map(|b| b.is_empty()).unwrap_or(true) {
        cache::write_json(&repo, BRANCHES_KEY, &vec![seed::default_branch()]).await?;
    }

    println!("✓ Seeded branch '{}'", branch_id);
    println!("  Products:   {}", products.len());
    println!("  Customers:  {}", customers.len());
    println!("  Categories: {}", seed::initial_categories().len());
    println!("  Cache keys: {}", repo.count().await?);

    db.close().await;
    Ok(())
}
