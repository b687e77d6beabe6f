//! Daily usage aggregates.

use super::{now_string, Database, StoreError};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// One increment against the `(tenant, date, metric_type, source)` key.
#[derive(Debug, Clone)]
pub struct UsageIncrement {
    pub tenant_id: i64,
    /// UTC calendar date, `YYYY-MM-DD`
    pub date: String,
    pub metric_type: String,
    pub source: String,
    pub value: i64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetricRow {
    pub tenant_id: i64,
    pub date: String,
    pub metric_type: String,
    pub source: String,
    pub value: i64,
    pub metadata: serde_json::Value,
}

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<(UsageMetricRow, String)> {
    Ok((
        UsageMetricRow {
            tenant_id: row.get(0)?,
            date: row.get(1)?,
            metric_type: row.get(2)?,
            source: row.get(3)?,
            value: row.get(4)?,
            metadata: serde_json::Value::Null,
        },
        row.get(5)?,
    ))
}

fn with_metadata((mut row, raw): (UsageMetricRow, String)) -> Result<UsageMetricRow, StoreError> {
    row.metadata = serde_json::from_str(&raw)?;
    Ok(row)
}

impl Database {
    /// Add `value` to the aggregate row, creating it if absent, in one
    /// statement. Returns the new total.
    pub async fn increment_usage(&self, increment: UsageIncrement) -> Result<i64, StoreError> {
        let metadata = serde_json::to_string(&increment.metadata)?;
        self.run(move |conn| {
            let now = now_string();
            let total = conn.query_row(
                "INSERT INTO usage_metrics
                     (tenant_id, date, metric_type, source, value, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(tenant_id, date, metric_type, source) DO UPDATE SET
                     value = value + excluded.value,
                     metadata = excluded.metadata,
                     updated_at = excluded.updated_at
                 RETURNING value",
                params![
                    increment.tenant_id,
                    increment.date,
                    increment.metric_type,
                    increment.source,
                    increment.value,
                    metadata,
                    now
                ],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
    }

    pub async fn usage_row(
        &self,
        tenant_id: i64,
        date: &str,
        metric_type: &str,
        source: &str,
    ) -> Result<Option<UsageMetricRow>, StoreError> {
        let date = date.to_string();
        let metric_type = metric_type.to_string();
        let source = source.to_string();
        self.run(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT tenant_id, date, metric_type, source, value, metadata
                     FROM usage_metrics
                     WHERE tenant_id = ?1 AND date = ?2 AND metric_type = ?3 AND source = ?4",
                    params![tenant_id, date, metric_type, source],
                    usage_from_row,
                )
                .optional()?;
            raw.map(with_metadata).transpose()
        })
        .await
    }

    /// All aggregate rows of a tenant, optionally restricted to one date.
    pub async fn usage_for_tenant(
        &self,
        tenant_id: i64,
        date: Option<&str>,
    ) -> Result<Vec<UsageMetricRow>, StoreError> {
        let date = date.map(str::to_string);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tenant_id, date, metric_type, source, value, metadata
                 FROM usage_metrics
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR date = ?2)
                 ORDER BY date DESC, metric_type, source",
            )?;
            let raw = stmt
                .query_map(params![tenant_id, date], usage_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(with_metadata).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn increment(source: &str, value: i64, model: &str) -> UsageIncrement {
        UsageIncrement {
            tenant_id: 3,
            date: "2026-01-15".to_string(),
            metric_type: "llm_tokens_used".to_string(),
            source: source.to_string(),
            value,
            metadata: json!({"provider": "openai", "model": model}),
        }
    }

    #[tokio::test]
    async fn test_increment_creates_then_accumulates() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.increment_usage(increment("chat", 100, "a")).await.unwrap(), 100);
        assert_eq!(db.increment_usage(increment("chat", 50, "b")).await.unwrap(), 150);

        let row = db
            .usage_row(3, "2026-01-15", "llm_tokens_used", "chat")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.value, 150);
        // Metadata reflects the most recent increment.
        assert_eq!(row.metadata["model"], "b");
    }

    #[tokio::test]
    async fn test_sources_are_separate_rows() {
        let db = Database::in_memory().await.unwrap();
        db.increment_usage(increment("chat", 10, "a")).await.unwrap();
        db.increment_usage(increment("embedding", 7, "a")).await.unwrap();

        let rows = db.usage_for_tenant(3, Some("2026-01-15")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "chat");
        assert_eq!(rows[1].value, 7);

        assert!(db.usage_for_tenant(3, Some("2026-01-16")).await.unwrap().is_empty());
        assert_eq!(db.usage_for_tenant(3, None).await.unwrap().len(), 2);
        assert!(db.usage_for_tenant(4, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_increments_sum() {
        let db = Database::in_memory().await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.increment_usage(increment("chat", 5, "a")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let row = db
            .usage_row(3, "2026-01-15", "llm_tokens_used", "chat")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.value, 100);
    }
}
