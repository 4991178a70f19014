//! Site profile settings stored as key/value pairs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Public profile of the site owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub owner_name: String,
    pub headline: String,
    pub bio: String,
    pub location: String,
    pub avatar_url: String,
    pub resume_url: String,
    pub github_url: String,
    pub linkedin_url: String,
    pub twitter_url: String,
    pub contact_email: String,
    pub meta_description: String,
    pub posts_per_page: u32,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            owner_name: String::new(),
            headline: String::new(),
            bio: String::new(),
            location: String::new(),
            avatar_url: String::new(),
            resume_url: String::new(),
            github_url: String::new(),
            linkedin_url: String::new(),
            twitter_url: String::new(),
            contact_email: String::new(),
            meta_description: String::new(),
            posts_per_page: 10,
        }
    }
}

impl SiteSettings {
    pub const KEYS: &'static [&'static str] = &[
        "owner_name",
        "headline",
        "bio",
        "location",
        "avatar_url",
        "resume_url",
        "github_url",
        "linkedin_url",
        "twitter_url",
        "contact_email",
        "meta_description",
        "posts_per_page",
    ];

    /// Build from stored pairs; unknown keys are ignored and missing or
    /// unparsable values fall back to defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();
        let text = |key: &str, field: &mut String| {
            if let Some(value) = map.get(key) {
                *field = value.clone();
            }
        };
        text("owner_name", &mut settings.owner_name);
        text("headline", &mut settings.headline);
        text("bio", &mut settings.bio);
        text("location", &mut settings.location);
        text("avatar_url", &mut settings.avatar_url);
        text("resume_url", &mut settings.resume_url);
        text("github_url", &mut settings.github_url);
        text("linkedin_url", &mut settings.linkedin_url);
        text("twitter_url", &mut settings.twitter_url);
        text("contact_email", &mut settings.contact_email);
        text("meta_description", &mut settings.meta_description);
        if let Some(value) = map.get("posts_per_page").and_then(|v| v.parse().ok()) {
            settings.posts_per_page = value;
        }
        settings
    }

    /// Flatten into storable pairs
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("owner_name", self.owner_name.clone()),
            ("headline", self.headline.clone()),
            ("bio", self.bio.clone()),
            ("location", self.location.clone()),
            ("avatar_url", self.avatar_url.clone()),
            ("resume_url", self.resume_url.clone()),
            ("github_url", self.github_url.clone()),
            ("linkedin_url", self.linkedin_url.clone()),
            ("twitter_url", self.twitter_url.clone()),
            ("contact_email", self.contact_email.clone()),
            ("meta_description", self.meta_description.clone()),
            ("posts_per_page", self.posts_per_page.to_string()),
        ]
    }
}
