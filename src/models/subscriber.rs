//! Newsletter subscriber model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    #[derive(Default)]
    pub enum SubscriberStatus {
        #[default]
        Pending => "pending",
        Active => "active",
        Unsubscribed => "unsubscribed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub status: SubscriberStatus,
    /// Confirmation / unsubscribe token, only ever sent by email
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}
