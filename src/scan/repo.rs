use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::scan::repo_types::{NewScan, ScanRecord};

/// Persistence used by the scan pipeline: the acting user's profile and the
/// scan history.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> anyhow::Result<Option<User>>;
    async fn insert_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord>;
    async fn list_scans(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ScanRecord>>;
}

#[derive(Clone)]
pub struct PgScanStore {
    db: PgPool,
}

impl PgScanStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn find_user(&self, user_id: Uuid) -> anyhow::Result<Option<User>> {
        User::find_by_id(&self.db, user_id).await
    }

    async fn insert_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord> {
        let row = sqlx::query_as::<_, ScanRecord>(
            r#"
            INSERT INTO scans (user_id, barcode, product_name, analysis_result)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, barcode, product_name, created_at, analysis_result
            "#,
        )
        .bind(scan.user_id)
        .bind(&scan.barcode)
        .bind(&scan.product_name)
        .bind(&scan.analysis_result)
        .fetch_one(&self.db)
        .await
        .context("insert scan")?;
        Ok(row)
    }

    async fn list_scans(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ScanRecord>> {
        let rows = sqlx::query_as::<_, ScanRecord>(
            r#"
            SELECT id, user_id, barcode, product_name, created_at, analysis_result
              FROM scans
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list scans by user")?;
        Ok(rows)
    }
}
