// Catalog database connection and pool management
// The catalog lives in SQLite; one pool is shared by every catalog read of a run

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::debug;

use crate::domain::catalog::CatalogLanguage;

const MAX_CONNECTIONS: u32 = 10;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        // In-memory databases have no file to prepare
        if !db_path.contains(":memory:") {
            let path = Path::new(db_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create catalog directory {}", parent.display()))?;
            }
            if !path.exists() {
                std::fs::File::create(path).with_context(|| format!("Failed to create catalog file {db_path}"))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to catalog at {database_url}"))?;

        debug!("Connected to catalog database {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the catalog tables of both language partitions
    pub async fn migrate(&self) -> Result<()> {
        for language in [CatalogLanguage::English, CatalogLanguage::Japanese] {
            let sets = language.sets_table();
            let products = language.products_table();

            let create_sets_sql = format!(
                r"
                CREATE TABLE IF NOT EXISTS {sets} (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    name_other TEXT,
                    code TEXT
                )
                "
            );

            let create_products_sql = format!(
                r"
                CREATE TABLE IF NOT EXISTS {products} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tcg_product_id INTEGER NOT NULL UNIQUE,
                    set_id INTEGER,
                    name TEXT NOT NULL,
                    product_type TEXT,
                    card_number TEXT,
                    rarity TEXT,
                    image_url TEXT,
                    market_price REAL,
                    FOREIGN KEY (set_id) REFERENCES {sets} (id)
                )
                "
            );

            let create_indexes_sql = format!(
                r"
                CREATE INDEX IF NOT EXISTS idx_{products}_set_id ON {products} (set_id);
                CREATE INDEX IF NOT EXISTS idx_{products}_card_number ON {products} (card_number);
                "
            );

            sqlx::query(&create_sets_sql).execute(&self.pool).await?;
            sqlx::query(&create_products_sql).execute(&self.pool).await?;
            sqlx::raw_sql(&create_indexes_sql).execute(&self.pool).await?;
        }

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
