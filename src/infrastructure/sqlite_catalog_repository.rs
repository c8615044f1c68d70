//! SQLite implementation of the catalog repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::catalog::{CatalogLanguage, CatalogProduct, CatalogSet, ProductWithSet};
use crate::domain::repositories::{CatalogRepository, JapanProductProbe};
use crate::domain::value_objects::normalize_card_number;

const PRODUCT_COLUMNS: &str = "p.id, p.tcg_product_id, p.set_id, p.name, p.product_type, p.card_number, \
     p.rarity, p.image_url, p.market_price, \
     s.id AS joined_set_id, s.name AS set_name, s.name_other AS set_name_other, s.code AS set_code";

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    fn set_from_row(row: &SqliteRow, language: CatalogLanguage) -> Result<CatalogSet> {
        Ok(CatalogSet {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            name_other: row.try_get("name_other")?,
            code: row.try_get("code")?,
            language,
        })
    }

    fn product_from_row(row: &SqliteRow, language: CatalogLanguage) -> Result<ProductWithSet> {
        let joined_set_id: Option<i64> = row.try_get("joined_set_id")?;
        let set = match joined_set_id {
            Some(id) => Some(CatalogSet {
                id,
                name: row.try_get::<Option<String>, _>("set_name")?.unwrap_or_default(),
                name_other: row.try_get("set_name_other")?,
                code: row.try_get("set_code")?,
                language,
            }),
            None => None,
        };

        Ok(ProductWithSet {
            product: CatalogProduct {
                id: row.try_get("id")?,
                external_id: row.try_get("tcg_product_id")?,
                name: row.try_get("name")?,
                set_id: row.try_get("set_id")?,
                card_number: row.try_get("card_number")?,
                rarity: row.try_get("rarity")?,
                image_url: row.try_get("image_url")?,
                market_price: row.try_get("market_price")?,
                product_type: row.try_get("product_type")?,
            },
            set,
        })
    }

    async fn products_where_in(
        &self,
        language: CatalogLanguage,
        column: &str,
        values: &[i64],
    ) -> Result<Vec<ProductWithSet>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM {products} p LEFT JOIN {sets} s ON s.id = p.set_id \
             WHERE p.{column} IN ({placeholders}) ORDER BY p.id",
            products = language.products_table(),
            sets = language.sets_table(),
            placeholders = Self::placeholders(values.len()),
        );
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read {} by {column}", language.products_table()))?;
        rows.iter().map(|row| Self::product_from_row(row, language)).collect()
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn list_sets(&self, language: CatalogLanguage) -> Result<Vec<CatalogSet>> {
        let sql = format!("SELECT id, name, name_other, code FROM {} ORDER BY id", language.sets_table());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {}", language.sets_table()))?;
        rows.iter().map(|row| Self::set_from_row(row, language)).collect()
    }

    async fn products_by_external_ids(
        &self,
        language: CatalogLanguage,
        external_ids: &[i64],
    ) -> Result<Vec<ProductWithSet>> {
        self.products_where_in(language, "tcg_product_id", external_ids).await
    }

    async fn products_by_set_ids(&self, language: CatalogLanguage, set_ids: &[i64]) -> Result<Vec<ProductWithSet>> {
        self.products_where_in(language, "set_id", set_ids).await
    }

    /// Products whose canonical card number equals the probe's, optionally
    /// narrowed by name. The set filter only decides whether the owning set
    /// is attached. Catalog numbers are stored as published ("045/071"), so
    /// the number comparison happens after normalizing each row.
    async fn search_japan_products(&self, probe: &JapanProductProbe) -> Result<Vec<ProductWithSet>> {
        let language = CatalogLanguage::Japanese;
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM {products} p \
             LEFT JOIN {sets} s ON s.id = p.set_id \
               AND (?1 IS NULL OR s.name LIKE '%' || ?1 || '%' OR s.name_other LIKE '%' || ?1 || '%') \
             WHERE p.card_number IS NOT NULL \
               AND (?2 IS NULL OR p.name LIKE '%' || ?2 || '%') \
             ORDER BY p.id",
            products = language.products_table(),
            sets = language.sets_table(),
        );

        let rows = sqlx::query(&sql)
            .bind(probe.set_name.as_deref())
            .bind(probe.name.as_deref())
            .fetch_all(&self.pool)
            .await
            .context("Failed to probe Japanese catalog")?;

        let mut found = Vec::new();
        for row in &rows {
            if found.len() >= probe.limit as usize {
                break;
            }
            let candidate = Self::product_from_row(row, language)?;
            let number = candidate.product.card_number.as_deref().and_then(normalize_card_number);
            if number.as_deref() == Some(probe.normalized_card_number.as_str()) {
                found.push(candidate);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::TempDir;

    async fn seeded() -> Result<(TempDir, SqliteCatalogRepository)> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await?;
        db.migrate().await?;

        sqlx::raw_sql(
            r"
            INSERT INTO pokemon_sets (id, name, name_other, code) VALUES (1, 'Jungle', NULL, 'JU');
            INSERT INTO pokemon_products (tcg_product_id, set_id, name, card_number, rarity, market_price)
                VALUES (100, 1, 'Clefable', '1/64', 'Holo Rare', 12.5),
                       (101, 1, 'Eevee', '51/64', 'Common', NULL),
                       (102, NULL, 'Loose Promo', NULL, NULL, NULL);
            INSERT INTO pokemon_japan_sets (id, name, name_other, code) VALUES (9, 'Clay Burst', 'SV2D', 'SV2D');
            INSERT INTO pokemon_japan_products (tcg_product_id, set_id, name, card_number, rarity)
                VALUES (900, 9, 'Pikachu', '049', 'C'),
                       (901, 9, 'Raichu', '050', 'U'),
                       (902, 9, 'Koraidon ex', '045/071', 'RR');
            ",
        )
        .execute(db.pool())
        .await?;

        Ok((dir, SqliteCatalogRepository::new(db.pool().clone())))
    }

    #[tokio::test]
    async fn test_list_sets() -> Result<()> {
        let (_dir, repo) = seeded().await?;
        let sets = repo.list_sets(CatalogLanguage::Japanese).await?;
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name_other.as_deref(), Some("SV2D"));
        assert_eq!(sets[0].language, CatalogLanguage::Japanese);
        Ok(())
    }

    #[tokio::test]
    async fn test_products_by_external_ids_join_sets() -> Result<()> {
        let (_dir, repo) = seeded().await?;
        let rows = repo.products_by_external_ids(CatalogLanguage::English, &[100, 102, 555]).await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product.external_id, 100);
        assert_eq!(rows[0].product.market_price, Some(12.5));
        assert_eq!(rows[0].set.as_ref().map(|s| s.name.as_str()), Some("Jungle"));
        assert!(rows[1].set.is_none());

        assert!(repo.products_by_external_ids(CatalogLanguage::English, &[]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_products_by_set_ids() -> Result<()> {
        let (_dir, repo) = seeded().await?;
        let rows = repo.products_by_set_ids(CatalogLanguage::English, &[1]).await?;
        let names: Vec<_> = rows.iter().map(|r| r.product.name.as_str()).collect();
        assert_eq!(names, vec!["Clefable", "Eevee"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_japan_probe_filters() -> Result<()> {
        let (_dir, repo) = seeded().await?;
        let probe = JapanProductProbe {
            normalized_card_number: "49".into(),
            name: Some("pika".into()),
            set_name: Some("clay".into()),
            limit: 5,
        };
        let rows = repo.search_japan_products(&probe).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product.external_id, 900);
        assert_eq!(rows[0].set.as_ref().map(|s| s.id), Some(9));

        let other_set = JapanProductProbe {
            set_name: Some("Shiny Treasure".into()),
            ..probe.clone()
        };
        let rows = repo.search_japan_products(&other_set).await?;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].set.is_none());

        let wrong_name = JapanProductProbe {
            name: Some("Mew".into()),
            ..probe
        };
        assert!(repo.search_japan_products(&wrong_name).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_japan_probe_normalizes_catalog_numbers() -> Result<()> {
        let (_dir, repo) = seeded().await?;
        let probe = JapanProductProbe {
            normalized_card_number: "45/71".into(),
            name: None,
            set_name: Some("Clay".into()),
            limit: 5,
        };
        let rows = repo.search_japan_products(&probe).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product.external_id, 902);
        assert_eq!(rows[0].product.card_number.as_deref(), Some("045/071"));
        assert_eq!(rows[0].set.as_ref().map(|s| s.id), Some(9));

        let capped = JapanProductProbe { limit: 0, ..probe };
        assert!(repo.search_japan_products(&capped).await?.is_empty());
        Ok(())
    }
}
