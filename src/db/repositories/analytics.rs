//! Analytics event repository
//!
//! Events are append-only. Aggregations that only need counting run in SQL;
//! the daily series is bucketed by the service from raw timestamps so both
//! backends agree on day boundaries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::decode_enum;
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{AnalyticsEvent, CountEntry, EventType, NewEvent};

impl_from_row!(AnalyticsEvent, |row| {
    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = metadata
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(AnalyticsEvent {
        id: row.try_get("id")?,
        event_type: decode_enum::<EventType>("event_type", row.try_get("event_type")?)?,
        path: row.try_get("path")?,
        referrer: row.try_get("referrer")?,
        visitor_hash: row.try_get("visitor_hash")?,
        user_agent: row.try_get("user_agent")?,
        metadata,
        created_at: row.try_get("created_at")?,
    })
});

/// Columns an event can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventColumn {
    Path,
    Referrer,
}

impl EventColumn {
    fn as_sql(&self) -> &'static str {
        match self {
            EventColumn::Path => "path",
            EventColumn::Referrer => "referrer",
        }
    }
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn insert(&self, event: &NewEvent) -> Result<i64>;

    /// Number of events per type since `since`
    async fn counts_by_type(&self, since: DateTime<Utc>) -> Result<BTreeMap<String, i64>>;

    /// Distinct visitor hashes among page-like events since `since`
    async fn unique_visitors(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Most frequent non-empty values of `column` for one event type
    async fn top_values(
        &self,
        column: EventColumn,
        event_type: EventType,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CountEntry>>;

    /// Timestamps of one event type since `since`
    async fn timestamps(&self, event_type: EventType, since: DateTime<Utc>)
        -> Result<Vec<DateTime<Utc>>>;

    /// Latest events, newest first
    async fn recent(&self, event_type: Option<EventType>, limit: i64) -> Result<Vec<AnalyticsEvent>>;

    /// Delete events older than `cutoff`, returning how many were removed
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn insert(&self, event: &NewEvent) -> Result<i64> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode event metadata")?;

        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO analytics_events (event_type, path, referrer, visitor_hash, user_agent,
                    metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.event_type.as_str())
            .bind(&event.path)
            .bind(&event.referrer)
            .bind(&event.visitor_hash)
            .bind(&event.user_agent)
            .bind(&metadata)
            .bind(Utc::now())
            .execute(conn)
            .await
            .context("Failed to record analytics event")?
            .insert_id()
        });
        Ok(id)
    }

    async fn counts_by_type(&self, since: DateTime<Utc>) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT event_type, COUNT(*) FROM analytics_events WHERE created_at >= ? \
                 GROUP BY event_type",
            )
            .bind(since)
            .fetch_all(conn)
            .await
            .context("Failed to count analytics events")?
        });
        Ok(rows.into_iter().collect())
    }

    async fn unique_visitors(&self, since: DateTime<Utc>) -> Result<i64> {
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(DISTINCT visitor_hash) FROM analytics_events \
                 WHERE created_at >= ? AND visitor_hash IS NOT NULL \
                 AND event_type IN ('page_view', 'project_view', 'post_view')",
            )
            .bind(since)
            .fetch_one(conn)
            .await
            .context("Failed to count unique visitors")
        })
    }

    async fn top_values(
        &self,
        column: EventColumn,
        event_type: EventType,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CountEntry>> {
        let column = column.as_sql();
        let sql = format!(
            "SELECT {col}, COUNT(*) AS hits FROM analytics_events \
             WHERE event_type = ? AND created_at >= ? AND {col} IS NOT NULL AND {col} <> '' \
             GROUP BY {col} ORDER BY hits DESC, {col} ASC LIMIT ?",
            col = column
        );

        let rows: Vec<(String, i64)> = on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, (String, i64)>(&sql)
                .bind(event_type.as_str())
                .bind(since)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to aggregate analytics events")?
        });
        Ok(rows
            .into_iter()
            .map(|(key, count)| CountEntry { key, count })
            .collect())
    }

    async fn timestamps(
        &self,
        event_type: EventType,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, DateTime<Utc>>(
                "SELECT created_at FROM analytics_events WHERE event_type = ? AND created_at >= ?",
            )
            .bind(event_type.as_str())
            .bind(since)
            .fetch_all(conn)
            .await
            .context("Failed to load event timestamps")
        })
    }

    async fn recent(
        &self,
        event_type: Option<EventType>,
        limit: i64,
    ) -> Result<Vec<AnalyticsEvent>> {
        let event_type = event_type.map(|t| t.as_str());
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, AnalyticsEvent>(
                r#"
                SELECT id, event_type, path, referrer, visitor_hash, user_agent, metadata, created_at
                FROM analytics_events
                WHERE (? IS NULL OR event_type = ?)
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(event_type)
            .bind(event_type)
            .bind(limit)
            .fetch_all(conn)
            .await
            .context("Failed to list recent analytics events")
        })
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM analytics_events WHERE created_at < ?")
                .bind(cutoff)
                .execute(conn)
                .await
                .context("Failed to purge analytics events")?
                .rows_affected()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use chrono::Duration;
    use serde_json::json;

    fn view(path: &str, visitor: &str, referrer: Option<&str>) -> NewEvent {
        let mut event = NewEvent::new(EventType::PageView, path);
        event.visitor_hash = Some(visitor.to_string());
        event.referrer = referrer.map(str::to_string);
        event
    }

    #[tokio::test]
    async fn test_aggregates() {
        let repo = SqlxAnalyticsRepository::new(migrated_pool().await);
        repo.insert(&view("/", "v1", Some("https://news.example"))).await.unwrap();
        repo.insert(&view("/", "v2", None)).await.unwrap();
        repo.insert(&view("/about", "v1", Some("https://news.example"))).await.unwrap();
        repo.insert(&NewEvent::new(EventType::ContactSubmit, "/contact")).await.unwrap();

        let since = Utc::now() - Duration::days(1);
        let totals = repo.counts_by_type(since).await.unwrap();
        assert_eq!(totals.get("page_view"), Some(&3));
        assert_eq!(totals.get("contact_submit"), Some(&1));
        assert_eq!(repo.unique_visitors(since).await.unwrap(), 2);

        let paths = repo
            .top_values(EventColumn::Path, EventType::PageView, since, 10)
            .await
            .unwrap();
        assert_eq!(paths[0], CountEntry { key: "/".into(), count: 2 });
        assert_eq!(paths.len(), 2);

        let referrers = repo
            .top_values(EventColumn::Referrer, EventType::PageView, since, 10)
            .await
            .unwrap();
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].count, 2);

        assert_eq!(repo.timestamps(EventType::PageView, since).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_recent_roundtrips_metadata() {
        let repo = SqlxAnalyticsRepository::new(migrated_pool().await);
        repo.insert(&view("/", "v1", None)).await.unwrap();
        repo.insert(
            &NewEvent::new(EventType::Audit, "project.delete")
                .with_metadata(json!({"actor": "admin", "id": 3})),
        )
        .await
        .unwrap();

        let all = repo.recent(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, EventType::Audit);
        assert_eq!(all[0].metadata, Some(json!({"actor": "admin", "id": 3})));

        let audits = repo.recent(Some(EventType::Audit), 10).await.unwrap();
        assert_eq!(audits.len(), 1);
    }

    #[tokio::test]
    async fn test_purge() {
        let repo = SqlxAnalyticsRepository::new(migrated_pool().await);
        repo.insert(&view("/", "v1", None)).await.unwrap();

        assert_eq!(repo.purge_older_than(Utc::now() - Duration::days(1)).await.unwrap(), 0);
        assert_eq!(repo.purge_older_than(Utc::now() + Duration::days(1)).await.unwrap(), 1);
        assert!(repo.recent(None, 10).await.unwrap().is_empty());
    }
}
