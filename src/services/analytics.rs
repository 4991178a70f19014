//! First-party analytics
//!
//! Events are stored with a keyed hash of the client's address and user
//! agent instead of the address itself. Summaries are computed over a
//! trailing window of whole UTC days.

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AnalyticsConfig;
use crate::db::repositories::{AnalyticsRepository, EventColumn};
use crate::models::{AnalyticsEvent, AnalyticsSummary, DailyCount, EventType, NewEvent};

type HmacSha256 = Hmac<Sha256>;

pub const MAX_PATH_LEN: usize = 512;
const MAX_FIELD_LEN: usize = 512;
const VISITOR_HASH_LEN: usize = 32;
const TOP_LIMIT: i64 = 10;
pub const MAX_SUMMARY_DAYS: u32 = 365;
pub const MAX_RECENT: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Who made a request, as far as analytics cares
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepository>, config: AnalyticsConfig) -> Self {
        Self { repo, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// `HMAC-SHA256(salt, ip | user_agent)`, hex, first 32 characters.
    /// `None` without an address.
    pub fn visitor_hash(&self, client: &ClientInfo) -> Option<String> {
        let ip = client.ip.as_deref()?;
        let mut mac = HmacSha256::new_from_slice(self.config.salt.as_bytes()).ok()?;
        mac.update(ip.as_bytes());
        mac.update(b"|");
        mac.update(client.user_agent.as_deref().unwrap_or("").as_bytes());
        let mut hex = HEXLOWER.encode(&mac.finalize().into_bytes());
        hex.truncate(VISITOR_HASH_LEN);
        Some(hex)
    }

    /// Store an event. Returns `None` when analytics are disabled, except
    /// for error and audit events, which are always stored.
    pub async fn record(&self, mut event: NewEvent) -> Result<Option<i64>, AnalyticsServiceError> {
        if !self.config.enabled && !event.event_type.is_operational() {
            return Ok(None);
        }
        event.path = truncate(&event.path, MAX_PATH_LEN);
        event.referrer = event.referrer.map(|r| truncate(&r, MAX_FIELD_LEN));
        event.user_agent = event.user_agent.map(|u| truncate(&u, MAX_FIELD_LEN));

        let id = self
            .repo
            .insert(&event)
            .await
            .context("Failed to record analytics event")?;
        Ok(Some(id))
    }

    /// Record an event attributed to `client`
    pub async fn record_for(
        &self,
        event_type: EventType,
        path: &str,
        client: &ClientInfo,
        metadata: Option<Value>,
    ) -> Result<Option<i64>, AnalyticsServiceError> {
        let mut event = NewEvent::new(event_type, path);
        event.visitor_hash = self.visitor_hash(client);
        event.user_agent = client.user_agent.clone();
        event.metadata = metadata;
        self.record(event).await
    }

    /// Best-effort variant of `record_for`; failures are only logged
    pub async fn record_quietly(
        &self,
        event_type: EventType,
        path: &str,
        client: &ClientInfo,
        metadata: Option<Value>,
    ) {
        if let Err(e) = self.record_for(event_type, path, client, metadata).await {
            tracing::warn!(event = %event_type, error = %e, "Failed to record analytics event");
        }
    }

    /// Browser beacon; only view events may be reported this way
    pub async fn track(
        &self,
        event_type: EventType,
        path: &str,
        referrer: Option<&str>,
        client: &ClientInfo,
    ) -> Result<(), AnalyticsServiceError> {
        if !event_type.is_trackable() {
            return Err(AnalyticsServiceError::ValidationError(format!(
                "{} events cannot be tracked",
                event_type
            )));
        }
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(AnalyticsServiceError::ValidationError(
                "path must start with '/'".to_string(),
            ));
        }

        let mut event = NewEvent::new(event_type, path);
        event.referrer = referrer
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        event.visitor_hash = self.visitor_hash(client);
        event.user_agent = client.user_agent.clone();
        self.record(event).await?;
        Ok(())
    }

    /// Persist an admin action
    pub async fn audit(
        &self,
        action: &str,
        actor: Option<&str>,
        metadata: Value,
    ) -> Result<(), AnalyticsServiceError> {
        let mut body = json!({ "actor": actor });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), metadata) {
            target.extend(extra);
        }
        self.repo
            .insert(&NewEvent::new(EventType::Audit, action).with_metadata(body))
            .await
            .context("Failed to record audit event")?;
        Ok(())
    }

    /// Aggregates for the last `days` days, today included
    pub async fn summary(&self, days: u32) -> Result<AnalyticsSummary, AnalyticsServiceError> {
        self.summary_at(days, Utc::now()).await
    }

    pub async fn summary_at(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsSummary, AnalyticsServiceError> {
        if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
            return Err(AnalyticsServiceError::ValidationError(format!(
                "days must be between 1 and {}",
                MAX_SUMMARY_DAYS
            )));
        }
        let first_day = now.date_naive() - Duration::days(days as i64 - 1);
        let since = first_day.and_time(NaiveTime::MIN).and_utc();

        let totals = self
            .repo
            .counts_by_type(since)
            .await
            .context("Failed to count events")?;
        let unique_visitors = self
            .repo
            .unique_visitors(since)
            .await
            .context("Failed to count visitors")?;
        let top_paths = self
            .repo
            .top_values(EventColumn::Path, EventType::PageView, since, TOP_LIMIT)
            .await
            .context("Failed to load top paths")?;
        let top_referrers = self
            .repo
            .top_values(EventColumn::Referrer, EventType::PageView, since, TOP_LIMIT)
            .await
            .context("Failed to load top referrers")?;
        let views = self
            .repo
            .timestamps(EventType::PageView, since)
            .await
            .context("Failed to load page views")?;

        Ok(AnalyticsSummary {
            days,
            totals,
            unique_visitors,
            top_paths,
            top_referrers,
            daily_page_views: daily_series(first_day, days, &views),
        })
    }

    pub async fn recent(
        &self,
        event_type: Option<EventType>,
        limit: i64,
    ) -> Result<Vec<AnalyticsEvent>, AnalyticsServiceError> {
        let events = self
            .repo
            .recent(event_type, limit.clamp(1, MAX_RECENT))
            .await
            .context("Failed to load recent events")?;
        Ok(events)
    }

    /// Delete events older than `days` days
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, AnalyticsServiceError> {
        if days < 1 {
            return Err(AnalyticsServiceError::ValidationError(
                "days must be at least 1".to_string(),
            ));
        }
        let removed = self
            .repo
            .purge_older_than(Utc::now() - Duration::days(days))
            .await
            .context("Failed to purge events")?;
        if removed > 0 {
            tracing::info!(removed, days, "Purged old analytics events");
        }
        Ok(removed)
    }

    /// Apply the configured retention
    pub async fn apply_retention(&self) -> Result<u64, AnalyticsServiceError> {
        self.purge_older_than(self.config.retention_days.max(1)).await
    }
}

/// One count per day starting at `first_day`; days without events are zero
fn daily_series(first_day: NaiveDate, days: u32, timestamps: &[DateTime<Utc>]) -> Vec<DailyCount> {
    let mut buckets: BTreeMap<NaiveDate, i64> = (0..days as i64)
        .map(|offset| (first_day + Duration::days(offset), 0))
        .collect();
    for ts in timestamps {
        if let Some(count) = buckets.get_mut(&ts.date_naive()) {
            *count += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
