//! Uploaded media model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub id: i64,
    /// Stored name, `<uuid>.<ext>`
    pub filename: String,
    /// Name as uploaded by the client
    pub original_name: String,
    pub content_type: String,
    pub size: i64,
    pub url: String,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
