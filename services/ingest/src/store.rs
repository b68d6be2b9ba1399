//! Fact Store - SQLite relation `plant_data` plus the `ingest_runs` audit log
//!
//! Responsibilities:
//! - Replace the whole fact set atomically (staging table, swap, commit)
//! - Record one audit row per successful replace
//! - Serve the read queries: plant names, rows by block range, latest run
//!
//! Readers never see a half-built relation: the swap happens inside the
//! same transaction as the inserts.

use crate::error::{IngestError, IngestResult};
use crate::model::{Category, FactRow};
use crate::report::IngestReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Rows per multi-value INSERT. Eight binds each keeps a statement under
/// SQLite's default bind limit.
const INSERT_CHUNK: usize = 100;

const FACT_COLUMNS: &str =
    "time_block, time_desc, plant_name, plant_type, category, dc_mw, sg_mw, bid_price_mwh";

fn create_fact_table(name: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            time_block INTEGER NOT NULL,
            time_desc TEXT NOT NULL,
            plant_name TEXT NOT NULL,
            plant_type TEXT NOT NULL,
            category TEXT NOT NULL,
            dc_mw DOUBLE NOT NULL,
            sg_mw DOUBLE NOT NULL,
            bid_price_mwh DOUBLE NOT NULL,
            PRIMARY KEY (time_block, plant_name)
        )
        "#
    )
}

const CREATE_RUNS: &str = r#"
    CREATE TABLE IF NOT EXISTS ingest_runs (
        run_id TEXT PRIMARY KEY,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        fact_rows INTEGER NOT NULL,
        detail TEXT NOT NULL
    )
"#;

const CREATE_PLANT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_plant_data_plant ON plant_data(plant_name)";

impl<'r> FromRow<'r, SqliteRow> for FactRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let time_block: i64 = row.try_get("time_block")?;
        let category: String = row.try_get("category")?;
        Ok(FactRow {
            time_block: u8::try_from(time_block)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            time_desc: row.try_get("time_desc")?,
            plant_name: row.try_get("plant_name")?,
            plant_type: row.try_get("plant_type")?,
            category: Category::from_str(&category).map_err(|e| sqlx::Error::Decode(e.into()))?,
            dc_mw: row.try_get("dc_mw")?,
            sg_mw: row.try_get("sg_mw")?,
            bid_price_mwh: row.try_get("bid_price_mwh")?,
        })
    }
}

/// One row of `ingest_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub fact_rows: i64,
    /// Run report as JSON text.
    pub detail: String,
}

impl RunRecord {
    pub fn report(&self) -> serde_json::Value {
        serde_json::from_str(&self.detail).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct FactStore {
    pool: SqlitePool,
}

impl FactStore {
    /// Open (creating the file if needed) and make sure the schema exists.
    pub async fn connect(url: &str) -> IngestResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open an existing database for queries only.
    pub async fn open_read_only(url: &str) -> IngestResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(FactStore { pool })
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> IngestResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> IngestResult<Self> {
        let store = FactStore { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> IngestResult<()> {
        sqlx::query(&create_fact_table("plant_data"))
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_PLANT_INDEX).execute(&self.pool).await?;
        sqlx::query(CREATE_RUNS).execute(&self.pool).await?;
        Ok(())
    }

    /// Replace every fact and log the run, all in one transaction.
    pub async fn replace_all(
        &self,
        facts: &[FactRow],
        report: &IngestReport,
        started_at: DateTime<Utc>,
    ) -> IngestResult<Uuid> {
        let run_id = Uuid::new_v4();
        let detail = serde_json::to_string(report)
            .map_err(|e| IngestError::Store(sqlx::Error::Encode(Box::new(e))))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS plant_data_staging")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create_fact_table("plant_data_staging"))
            .execute(&mut *tx)
            .await?;

        for chunk in facts.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO plant_data_staging ({}) ", FACT_COLUMNS));
            builder.push_values(chunk, |mut b, fact| {
                b.push_bind(i64::from(fact.time_block))
                    .push_bind(fact.time_desc.clone())
                    .push_bind(fact.plant_name.clone())
                    .push_bind(fact.plant_type.clone())
                    .push_bind(fact.category.as_str())
                    .push_bind(fact.dc_mw)
                    .push_bind(fact.sg_mw)
                    .push_bind(fact.bid_price_mwh);
            });
            builder.build().execute(&mut *tx).await?;
        }
        debug!(rows = facts.len(), "staging table filled");

        sqlx::query("DROP TABLE IF EXISTS plant_data")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE plant_data_staging RENAME TO plant_data")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_PLANT_INDEX).execute(&mut *tx).await?;

        sqlx::query(
            r#"
            INSERT INTO ingest_runs (run_id, started_at, finished_at, fact_rows, detail)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id.to_string())
        .bind(started_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(facts.len() as i64)
        .bind(&detail)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(%run_id, rows = facts.len(), "plant_data replaced");
        Ok(run_id)
    }

    /// Distinct plant names, sorted.
    pub async fn plant_names(&self) -> IngestResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT plant_name FROM plant_data ORDER BY plant_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Rows with `start <= time_block <= end`, optionally limited to `plants`.
    pub async fn rows_between(
        &self,
        start: u8,
        end: u8,
        plants: &[String],
    ) -> IngestResult<Vec<FactRow>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM plant_data WHERE time_block BETWEEN ", FACT_COLUMNS));
        builder
            .push_bind(i64::from(start))
            .push(" AND ")
            .push_bind(i64::from(end));

        if !plants.is_empty() {
            builder.push(" AND plant_name IN (");
            let mut separated = builder.separated(", ");
            for plant in plants {
                separated.push_bind(plant.clone());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY time_block, plant_name");

        let rows = builder
            .build_query_as::<FactRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn latest_run(&self) -> IngestResult<Option<RunRecord>> {
        let run = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT run_id, started_at, finished_at, fact_rows, detail
            FROM ingest_runs
            ORDER BY finished_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    pub async fn count(&self) -> IngestResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plant_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> FactStore {
        FactStore::in_memory().await.unwrap()
    }

    fn fact(block: u8, plant: &str, dc: f64) -> FactRow {
        FactRow {
            time_block: block,
            time_desc: format!("block {}", block),
            plant_name: plant.to_string(),
            plant_type: "Thermal".to_string(),
            category: Category::Central,
            dc_mw: dc,
            sg_mw: dc / 2.0,
            bid_price_mwh: 2500.0,
        }
    }

    #[tokio::test]
    async fn test_empty_store_reads() {
        let store = memory_store().await;
        assert!(store.plant_names().await.unwrap().is_empty());
        assert!(store.rows_between(1, 96, &[]).await.unwrap().is_empty());
        assert!(store.latest_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_and_read_back() {
        let store = memory_store().await;
        let facts = vec![fact(1, "MEJA", 10.0), fact(1, "ANPARA", 20.0), fact(2, "MEJA", 11.0)];
        store
            .replace_all(&facts, &IngestReport::default(), Utc::now())
            .await
            .unwrap();

        let rows = store.rows_between(1, 96, &[]).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.time_block, r.plant_name.as_str())).collect();
        assert_eq!(keys, vec![(1, "ANPARA"), (1, "MEJA"), (2, "MEJA")]);
        assert_eq!(rows[1], facts[0]);

        assert_eq!(store.plant_names().await.unwrap(), vec!["ANPARA", "MEJA"]);
    }

    #[tokio::test]
    async fn test_replace_discards_previous_rows() {
        let store = memory_store().await;
        let report = IngestReport::default();
        store
            .replace_all(&[fact(1, "OBRA", 1.0), fact(2, "OBRA", 1.0)], &report, Utc::now())
            .await
            .unwrap();
        store
            .replace_all(&[fact(5, "MEJA", 3.0)], &report, Utc::now())
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.plant_names().await.unwrap(), vec!["MEJA"]);
    }

    #[tokio::test]
    async fn test_failed_replace_leaves_old_rows() {
        let store = memory_store().await;
        let report = IngestReport::default();
        store
            .replace_all(&[fact(1, "OBRA", 1.0)], &report, Utc::now())
            .await
            .unwrap();

        // Duplicate key violates the primary key mid-transaction.
        let bad = vec![fact(3, "MEJA", 1.0), fact(3, "MEJA", 2.0)];
        let err = store.replace_all(&bad, &report, Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "Store");

        let rows = store.rows_between(1, 96, &[]).await.unwrap();
        assert_eq!(rows, vec![fact(1, "OBRA", 1.0)]);
    }

    #[tokio::test]
    async fn test_range_and_plant_filter() {
        let store = memory_store().await;
        let facts: Vec<FactRow> = (1..=96)
            .flat_map(|b| vec![fact(b, "MEJA", b as f64), fact(b, "OBRA", 1.0), fact(b, "TANDA", 2.0)])
            .collect();
        store
            .replace_all(&facts, &IngestReport::default(), Utc::now())
            .await
            .unwrap();

        let rows = store.rows_between(10, 12, &[]).await.unwrap();
        assert_eq!(rows.len(), 9);
        assert!(rows.iter().all(|r| (10..=12).contains(&r.time_block)));

        let rows = store
            .rows_between(95, 96, &["MEJA".to_string(), "TANDA".to_string()])
            .await
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.time_block, r.plant_name.as_str())).collect();
        assert_eq!(keys, vec![(95, "MEJA"), (95, "TANDA"), (96, "MEJA"), (96, "TANDA")]);

        let rows = store.rows_between(1, 96, &["NOPE".to_string()]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_large_replace_spans_chunks() {
        let store = memory_store().await;
        let facts: Vec<FactRow> = (1..=96)
            .flat_map(|b| (0..5).map(move |p| fact(b, &format!("PLANT {}", p), 1.0)))
            .collect();
        store
            .replace_all(&facts, &IngestReport::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 480);
    }

    #[tokio::test]
    async fn test_run_is_recorded() {
        let store = memory_store().await;
        let report = IngestReport {
            fact_rows: 1,
            ..Default::default()
        };
        let run_id = store
            .replace_all(&[fact(1, "MEJA", 1.0)], &report, Utc::now())
            .await
            .unwrap();

        let run = store.latest_run().await.unwrap().unwrap();
        assert_eq!(run.run_id, run_id.to_string());
        assert_eq!(run.fact_rows, 1);
        assert_eq!(run.report()["fact_rows"], 1);
        assert!(DateTime::parse_from_rfc3339(&run.started_at).is_ok());
        assert!(run.finished_at >= run.started_at);
    }
}
