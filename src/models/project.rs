//! Portfolio project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

string_enum! {
    /// Publication state shared by projects and blog posts
    #[derive(Default)]
    pub enum ContentStatus {
        #[default]
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
}

/// A portfolio project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub summary: String,
    /// Markdown source
    pub description: String,
    pub description_html: String,
    pub status: ContentStatus,
    pub featured: bool,
    pub sort_order: i64,
    pub repo_url: Option<String>,
    pub live_url: Option<String>,
    pub cover_image: Option<String>,
    pub tech_stack: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub images: Vec<ProjectImage>,
}

impl Project {
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }
}

/// Gallery image attached to a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectImage {
    pub id: i64,
    pub project_id: i64,
    pub url: String,
    pub alt_text: String,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field unchanged and an empty string
/// clears an optional URL field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<ContentStatus>,
    pub featured: Option<bool>,
    pub sort_order: Option<i64>,
    pub repo_url: Option<String>,
    pub live_url: Option<String>,
    pub cover_image: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImageInput {
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Filters for project listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<ContentStatus>,
    pub featured: Option<bool>,
    /// Tag slug
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in ContentStatus::ALL {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), *status);
        }
        assert_eq!(
            serde_json::to_string(&ContentStatus::Published).unwrap(),
            "\"published\""
        );
    }

    #[test]
    fn test_create_input_defaults() {
        let input: CreateProjectInput = serde_json::from_str(r#"{"title": "Folio"}"#).unwrap();
        assert_eq!(input.status, ContentStatus::Draft);
        assert!(input.slug.is_none());
        assert!(input.tech_stack.is_empty());
    }
}
