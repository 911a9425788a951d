//! Product persistence: Postgres in deployment, in-memory otherwise.

use crate::types::ProductRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Option<ProductRecord>>;

    /// Insert or replace by barcode. A missing `sds_url` keeps the stored one.
    async fn upsert_product(&self, record: ProductRecord) -> Result<ProductRecord>;

    /// Attach a verified SDS to an existing product. False when the barcode is unknown.
    async fn update_sds_url(&self, barcode: &str, sds_url: &str) -> Result<bool>;
}

pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub async fn init(pool: PgPool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                barcode VARCHAR PRIMARY KEY,
                name TEXT NOT NULL,
                size_or_weight TEXT,
                sds_url TEXT,
                updated_at TIMESTAMPTZ DEFAULT NOW()
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Option<ProductRecord>> {
        let row = sqlx::query_as::<_, ProductRecord>(
            "SELECT barcode, name, size_or_weight, sds_url, updated_at FROM products WHERE barcode = $1",
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_product(&self, record: ProductRecord) -> Result<ProductRecord> {
        let row = sqlx::query_as::<_, ProductRecord>(
            r#"
            INSERT INTO products (barcode, name, size_or_weight, sds_url, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (barcode) DO UPDATE SET
                name = EXCLUDED.name,
                size_or_weight = EXCLUDED.size_or_weight,
                sds_url = COALESCE(EXCLUDED.sds_url, products.sds_url),
                updated_at = NOW()
            RETURNING barcode, name, size_or_weight, sds_url, updated_at
            "#,
        )
        .bind(&record.barcode)
        .bind(&record.name)
        .bind(&record.size_or_weight)
        .bind(&record.sds_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_sds_url(&self, barcode: &str, sds_url: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET sds_url = $2, updated_at = NOW() WHERE barcode = $1")
            .bind(barcode)
            .bind(sds_url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Default)]
pub struct MemoryProductStore {
    products: RwLock<HashMap<String, ProductRecord>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Option<ProductRecord>> {
        let products = self.products.read().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(products.get(barcode).cloned())
    }

    async fn upsert_product(&self, mut record: ProductRecord) -> Result<ProductRecord> {
        let mut products = self.products.write().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        if record.sds_url.is_none() {
            record.sds_url = products.get(&record.barcode).and_then(|p| p.sds_url.clone());
        }
        record.updated_at = Some(Utc::now());
        products.insert(record.barcode.clone(), record.clone());
        Ok(record)
    }

    async fn update_sds_url(&self, barcode: &str, sds_url: &str) -> Result<bool> {
        let mut products = self.products.write().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        match products.get_mut(barcode) {
            Some(record) => {
                record.sds_url = Some(sds_url.to_string());
                record.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
