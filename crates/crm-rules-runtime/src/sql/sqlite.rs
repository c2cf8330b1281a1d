//! SQLite execution of rendered predicates

use super::{SqlDialect, SqlFragment, SqlParam, SqlRenderer};
use crate::error::{Result, RuntimeError};
use crm_rules_core::Predicate;
use sqlx::sqlite::{SqliteArguments, SqlitePool};
use sqlx::query::Query;
use sqlx::{Row, Sqlite};

/// Runs predicates against a SQLite copy of the host tables
pub struct SqlitePredicateRunner {
    pool: SqlitePool,
    renderer: SqlRenderer,
}

impl SqlitePredicateRunner {
    pub fn new(pool: SqlitePool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            renderer: SqlRenderer::new(SqlDialect::Sqlite, table_prefix),
        }
    }

    /// Connect to a database URL such as `sqlite::memory:`
    pub async fn connect(url: &str, table_prefix: impl Into<String>) -> Result<Self> {
        let pool = SqlitePool::connect(url).await.map_err(|e| {
            RuntimeError::Storage(format!("Failed to connect to SQLite database at {}: {}", url, e))
        })?;
        Ok(Self::new(pool, table_prefix))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether one contact satisfies the predicate
    pub async fn matches(&self, predicate: &Predicate, subscriber_id: u64) -> Result<bool> {
        let fragment = self.renderer.render_subject_check(predicate, subscriber_id)?;
        tracing::debug!(sql = %fragment.sql, params = fragment.params.len(), "running subject check");

        let row = bind_all(sqlx::query(&fragment.sql), &fragment)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RuntimeError::Storage(format!("subject check failed: {}", e)))?;
        let hit: i64 = row
            .try_get(0)
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;
        Ok(hit != 0)
    }

    /// Ids of all contacts satisfying the predicate, ascending
    pub async fn matching_contacts(&self, predicate: &Predicate) -> Result<Vec<u64>> {
        let mut fragment = self.renderer.render_contact_query(predicate)?;
        fragment.sql.push_str(" ORDER BY 1");

        let rows = bind_all(sqlx::query(&fragment.sql), &fragment)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RuntimeError::Storage(format!("contact query failed: {}", e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>(0)
                    .map(|id| id as u64)
                    .map_err(|e| RuntimeError::Storage(e.to_string()))
            })
            .collect()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    fragment: &SqlFragment,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in &fragment.params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
        };
    }
    query
}
