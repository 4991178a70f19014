//! First-party analytics events

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

string_enum! {
    pub enum EventType {
        PageView => "page_view",
        ProjectView => "project_view",
        PostView => "post_view",
        ContactSubmit => "contact_submit",
        Subscribe => "subscribe",
        UploadRejected => "upload_rejected",
        Error => "error",
        Audit => "audit",
    }
}

impl EventType {
    /// Kinds a browser beacon may report
    pub fn is_trackable(&self) -> bool {
        matches!(
            self,
            EventType::PageView | EventType::ProjectView | EventType::PostView
        )
    }

    /// Operational records kept even with analytics switched off
    pub fn is_operational(&self) -> bool {
        matches!(self, EventType::Error | EventType::Audit)
    }
}

/// A stored analytics event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub event_type: EventType,
    pub path: String,
    pub referrer: Option<String>,
    /// Keyed hash of client identity; raw addresses are never stored
    pub visitor_hash: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An event about to be recorded
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub path: String,
    pub referrer: Option<String>,
    pub visitor_hash: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            path: path.into(),
            referrer: None,
            visitor_hash: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A key with an occurrence count (top paths, top referrers)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountEntry {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

/// Aggregated view over a trailing window of days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub days: u32,
    pub totals: BTreeMap<String, i64>,
    pub unique_visitors: i64,
    pub top_paths: Vec<CountEntry>,
    pub top_referrers: Vec<CountEntry>,
    /// One entry per day, oldest first, zero-filled
    pub daily_page_views: Vec<DailyCount>,
}
