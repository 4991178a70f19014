//! Contact inquiry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    #[derive(Default)]
    pub enum InquiryStatus {
        #[default]
        New => "new",
        Read => "read",
        Replied => "replied",
        Archived => "archived",
        Spam => "spam",
    }
}

/// A message sent through the public contact form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInquiry {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: InquiryStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact form body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
    /// Honeypot; real visitors never see or fill it
    #[serde(default)]
    pub website: Option<String>,
}
