//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, ContentStatus, Tag};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub author_id: i64,
    pub status: ContentStatus,
    pub featured: bool,
    pub cover_image: Option<String>,
    pub reading_time_minutes: i64,
    pub view_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl BlogPost {
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Generated from the content when absent
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: Option<ContentStatus>,
    pub featured: Option<bool>,
    pub cover_image: Option<String>,
}

/// Filters for post listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub status: Option<ContentStatus>,
    /// Tag slug
    pub tag: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Keyword matched against title, excerpt and content
    pub q: Option<String>,
    pub featured: Option<bool>,
}
