//! Rule store access
//!
//! The rule database is a single-writer SQLite file. It is opened read-only
//! and immutable with one pooled connection per worker, so rule lookups from
//! different workers never queue behind each other.

use async_trait::async_trait;
use span_common::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

use super::RuleRow;

/// Parameterized rule lookup
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Rows whose source equals `source_id` and whose mega collection or
    /// technical collection ID is one of `collections`.
    async fn find_rules(&self, source_id: &str, collections: &[String]) -> Result<Vec<RuleRow>>;
}

/// Open the rule database read-only with up to `max_connections` handles.
pub async fn connect_readonly(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::Config(format!(
            "Rule database not found: {}",
            db_path.display()
        )));
    }

    // immutable=1: no locking, no journal; the file must not change during the run
    let db_url = format!("sqlite://{}?mode=ro&immutable=1", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(&db_url)
        .await?;

    tracing::debug!(
        path = %db_path.display(),
        max_connections,
        "Opened rule database read-only"
    );
    Ok(pool)
}

/// [`RuleStore`] over the `amsl` table
pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path, max_connections: u32) -> Result<Self> {
        Ok(Self::new(connect_readonly(db_path, max_connections).await?))
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
    async fn find_rules(&self, source_id: &str, collections: &[String]) -> Result<Vec<RuleRow>> {
        if collections.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT isil, CAST(sid AS TEXT) AS sid, tcid, mc, hflink, hfeval, cflink, cfelink
             FROM amsl
             WHERE sid = ? AND (mc IN ({list}) OR tcid IN ({list}))",
            list = placeholders(collections.len())
        );

        let mut query = sqlx::query_as::<_, RuleRow>(&sql).bind(source_id);
        for collection in collections.iter().chain(collections.iter()) {
            query = query.bind(collection);
        }

        let rows = query.fetch_all(&self.pool).await?;
        tracing::debug!(
            source_id,
            collections = collections.len(),
            rows = rows.len(),
            "Queried rule store"
        );
        Ok(rows)
    }
}
