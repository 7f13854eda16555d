use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use qguard_core::{BatchWindow, ComplaintRecord, ComplaintStatus, WorkOrderRecord};
use sqlx::{Row, SqlitePool};

/// Read-only view of the ingestion collaborator's record batches.
pub trait RecordStore: Send + Sync {
    async fn open_complaints_in(&self, window: BatchWindow) -> Result<Vec<ComplaintRecord>>;
    async fn closed_work_orders_in(&self, window: BatchWindow) -> Result<Vec<WorkOrderRecord>>;
}

/// Read-only view of the contractor-history collaborator: historical
/// rework rate in [0, 1] per contractor, or `None` for no history.
pub trait ContractorHistoryStore: Send + Sync {
    async fn rework_rate(&self, contractor_id: &str) -> Result<Option<f64>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    complaints: Arc<RwLock<Vec<ComplaintRecord>>>,
    work_orders: Arc<RwLock<Vec<WorkOrderRecord>>>,
    rework_rates: Arc<RwLock<HashMap<String, f64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_complaint(&self, record: ComplaintRecord) {
        self.complaints.write().push(record);
    }

    pub fn insert_work_order(&self, record: WorkOrderRecord) {
        self.work_orders.write().push(record);
    }

    pub fn set_rework_rate(&self, contractor_id: &str, rate: f64) {
        self.rework_rates
            .write()
            .insert(contractor_id.to_string(), rate);
    }
}

impl RecordStore for MemoryStore {
    async fn open_complaints_in(&self, window: BatchWindow) -> Result<Vec<ComplaintRecord>> {
        let mut records = self
            .complaints
            .read()
            .iter()
            .filter(|record| record.status == ComplaintStatus::Open)
            .filter(|record| window.contains(record.reported_at))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| {
            a.reported_at
                .cmp(&b.reported_at)
                .then_with(|| a.complaint_id.cmp(&b.complaint_id))
        });
        Ok(records)
    }

    async fn closed_work_orders_in(&self, window: BatchWindow) -> Result<Vec<WorkOrderRecord>> {
        let mut records = self
            .work_orders
            .read()
            .iter()
            .filter(|record| window.contains(record.completed_at))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.work_order_id.cmp(&b.work_order_id))
        });
        Ok(records)
    }
}

impl ContractorHistoryStore for MemoryStore {
    async fn rework_rate(&self, contractor_id: &str) -> Result<Option<f64>> {
        Ok(self.rework_rates.read().get(contractor_id).copied())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS complaints (
              complaint_id TEXT PRIMARY KEY,
              narrative TEXT NOT NULL,
              category TEXT NOT NULL,
              reported_at TEXT NOT NULL,
              location_id TEXT NOT NULL,
              status TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS work_orders (
              work_order_id TEXT PRIMARY KEY,
              asset_id TEXT NOT NULL,
              asset_age_months INTEGER NOT NULL,
              resolution_code TEXT NOT NULL,
              contractor_id TEXT NOT NULL,
              completed_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contractor_history (
              contractor_id TEXT PRIMARY KEY,
              rework_rate REAL NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_complaint(&self, record: &ComplaintRecord) -> Result<()> {
        let status = match record.status {
            ComplaintStatus::Open => "open",
            ComplaintStatus::Closed => "closed",
        };

        sqlx::query(
            r#"
            INSERT INTO complaints (complaint_id, narrative, category, reported_at, location_id, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(complaint_id) DO UPDATE SET
              narrative=excluded.narrative,
              category=excluded.category,
              reported_at=excluded.reported_at,
              location_id=excluded.location_id,
              status=excluded.status
            "#,
        )
        .bind(&record.complaint_id)
        .bind(&record.narrative)
        .bind(&record.category)
        .bind(record.reported_at.to_rfc3339())
        .bind(&record.location_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_work_order(&self, record: &WorkOrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO work_orders (work_order_id, asset_id, asset_age_months, resolution_code, contractor_id, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(work_order_id) DO UPDATE SET
              asset_id=excluded.asset_id,
              asset_age_months=excluded.asset_age_months,
              resolution_code=excluded.resolution_code,
              contractor_id=excluded.contractor_id,
              completed_at=excluded.completed_at
            "#,
        )
        .bind(&record.work_order_id)
        .bind(&record.asset_id)
        .bind(i64::from(record.asset_age_months))
        .bind(&record.resolution_code)
        .bind(&record.contractor_id)
        .bind(record.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_rework_rate(&self, contractor_id: &str, rate: f64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contractor_history (contractor_id, rework_rate)
            VALUES (?1, ?2)
            ON CONFLICT(contractor_id) DO UPDATE SET rework_rate=excluded.rework_rate
            "#,
        )
        .bind(contractor_id)
        .bind(rate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

impl RecordStore for SqliteStore {
    async fn open_complaints_in(&self, window: BatchWindow) -> Result<Vec<ComplaintRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT complaint_id, narrative, category, reported_at, location_id, status
            FROM complaints
            WHERE status = 'open' AND reported_at >= ?1 AND reported_at < ?2
            ORDER BY reported_at, complaint_id
            "#,
        )
        .bind(window.since.to_rfc3339())
        .bind(window.until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(|row| ComplaintRecord {
                complaint_id: row.get("complaint_id"),
                narrative: row.get("narrative"),
                category: row.get("category"),
                reported_at: parse_timestamp(&row.get::<String, _>("reported_at")),
                location_id: row.get("location_id"),
                status: ComplaintStatus::Open,
            })
            .collect();

        Ok(records)
    }

    async fn closed_work_orders_in(&self, window: BatchWindow) -> Result<Vec<WorkOrderRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT work_order_id, asset_id, asset_age_months, resolution_code, contractor_id, completed_at
            FROM work_orders
            WHERE completed_at >= ?1 AND completed_at < ?2
            ORDER BY completed_at, work_order_id
            "#,
        )
        .bind(window.since.to_rfc3339())
        .bind(window.until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(|row| WorkOrderRecord {
                work_order_id: row.get("work_order_id"),
                asset_id: row.get("asset_id"),
                asset_age_months: row.get::<i64, _>("asset_age_months").max(0) as u32,
                resolution_code: row.get("resolution_code"),
                contractor_id: row.get("contractor_id"),
                completed_at: parse_timestamp(&row.get::<String, _>("completed_at")),
            })
            .collect();

        Ok(records)
    }
}

impl ContractorHistoryStore for SqliteStore {
    async fn rework_rate(&self, contractor_id: &str) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT rework_rate FROM contractor_history WHERE contractor_id = ?1")
            .bind(contractor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<f64, _>("rework_rate")))
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub async fn upsert_complaint(&self, record: &ComplaintRecord) -> Result<()> {
        match self {
            Store::Memory(store) => {
                store.insert_complaint(record.clone());
                Ok(())
            }
            Store::Sqlite(store) => store.upsert_complaint(record).await,
        }
    }

    pub async fn upsert_work_order(&self, record: &WorkOrderRecord) -> Result<()> {
        match self {
            Store::Memory(store) => {
                store.insert_work_order(record.clone());
                Ok(())
            }
            Store::Sqlite(store) => store.upsert_work_order(record).await,
        }
    }

    pub async fn set_rework_rate(&self, contractor_id: &str, rate: f64) -> Result<()> {
        match self {
            Store::Memory(store) => {
                store.set_rework_rate(contractor_id, rate);
                Ok(())
            }
            Store::Sqlite(store) => store.set_rework_rate(contractor_id, rate).await,
        }
    }
}

impl RecordStore for Store {
    async fn open_complaints_in(&self, window: BatchWindow) -> Result<Vec<ComplaintRecord>> {
        match self {
            Store::Memory(store) => store.open_complaints_in(window).await,
            Store::Sqlite(store) => store.open_complaints_in(window).await,
        }
    }

    async fn closed_work_orders_in(&self, window: BatchWindow) -> Result<Vec<WorkOrderRecord>> {
        match self {
            Store::Memory(store) => store.closed_work_orders_in(window).await,
            Store::Sqlite(store) => store.closed_work_orders_in(window).await,
        }
    }
}

impl ContractorHistoryStore for Store {
    async fn rework_rate(&self, contractor_id: &str) -> Result<Option<f64>> {
        match self {
            Store::Memory(store) => store.rework_rate(contractor_id).await,
            Store::Sqlite(store) => store.rework_rate(contractor_id).await,
        }
    }
}
