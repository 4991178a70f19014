//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag shared by projects and blog posts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: 0,
            slug,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Tag with usage counts for the tag cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub project_count: i64,
    pub post_count: i64,
}

impl TagWithCount {
    pub fn total(&self) -> i64 {
        self.project_count + self.post_count
    }
}
