//! Settings service
//!
//! The owner's public profile, stored as key/value pairs.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::Cache;
use crate::db::repositories::SettingsRepository;
use crate::models::SiteSettings;
use crate::services::validation;

const CACHE_KEY_SITE: &str = "site:settings";
const SITE_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const MAX_POSTS_PER_PAGE: u32 = 50;
const MAX_TEXT_LEN: usize = 200;
const MAX_BIO_LEN: usize = 5000;

/// Settings service errors
#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Invalid setting value: {0}")]
    InvalidValue(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// Current profile; keys never saved fall back to defaults
    pub async fn get_site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        self.cache
            .get_or_load(CACHE_KEY_SITE, SITE_CACHE_TTL, || async {
                let map = self
                    .repo
                    .get_many(SiteSettings::KEYS)
                    .await
                    .context("Failed to load site settings")?;
                Ok::<_, SettingsServiceError>(SiteSettings::from_map(&map))
            })
            .await
    }

    /// Validate and store the whole profile
    pub async fn update_site_settings(
        &self,
        settings: SiteSettings,
    ) -> Result<SiteSettings, SettingsServiceError> {
        let settings = validate(settings)?;
        self.repo
            .set_many(&settings.to_pairs())
            .await
            .context("Failed to save site settings")?;
        self.cache.invalidate("site:*").await;
        Ok(settings)
    }
}

fn validate(mut s: SiteSettings) -> Result<SiteSettings, SettingsServiceError> {
    let invalid = SettingsServiceError::InvalidValue;

    if !(1..=MAX_POSTS_PER_PAGE).contains(&s.posts_per_page) {
        return Err(invalid(format!(
            "posts_per_page must be between 1 and {}",
            MAX_POSTS_PER_PAGE
        )));
    }

    for (field, value) in [
        ("owner_name", &mut s.owner_name),
        ("headline", &mut s.headline),
        ("location", &mut s.location),
        ("meta_description", &mut s.meta_description),
    ] {
        *value = value.trim().to_string();
        validation::check_length(field, value, 0, MAX_TEXT_LEN).map_err(invalid)?;
    }
    s.bio = s.bio.trim().to_string();
    validation::check_length("bio", &s.bio, 0, MAX_BIO_LEN).map_err(invalid)?;

    for (field, value) in [
        ("avatar_url", &mut s.avatar_url),
        ("resume_url", &mut s.resume_url),
        ("github_url", &mut s.github_url),
        ("linkedin_url", &mut s.linkedin_url),
        ("twitter_url", &mut s.twitter_url),
    ] {
        *value = validation::clean_url(field, Some(std::mem::take(value)))
            .map_err(invalid)?
            .unwrap_or_default();
    }

    s.contact_email = validation::normalize_email(&s.contact_email);
    if !s.contact_email.is_empty() && !validation::is_valid_email(&s.contact_email) {
        return Err(invalid("contact_email must be a valid email address".to_string()));
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxSettingsRepository;

    async fn setup_service() -> SettingsService {
        SettingsService::new(SqlxSettingsRepository::boxed(migrated_pool().await), Cache::memory())
    }

    #[tokio::test]
    async fn test_defaults_then_update() {
        let service = setup_service().await;
        assert_eq!(service.get_site_settings().await.unwrap(), SiteSettings::default());

        let saved = service
            .update_site_settings(SiteSettings {
                owner_name: "  Jane Doe ".into(),
                github_url: "https://github.com/jane".into(),
                contact_email: "Jane@Example.com".into(),
                posts_per_page: 20,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(saved.owner_name, "Jane Doe");
        assert_eq!(saved.contact_email, "jane@example.com");

        let loaded = service.get_site_settings().await.unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_rejects_invalid_values() {
        let service = setup_service().await;
        for bad in [
            SiteSettings {
                posts_per_page: 0,
                ..Default::default()
            },
            SiteSettings {
                posts_per_page: 51,
                ..Default::default()
            },
            SiteSettings {
                github_url: "javascript:alert(1)".into(),
                ..Default::default()
            },
            SiteSettings {
                contact_email: "not-an-email".into(),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                service.update_site_settings(bad).await,
                Err(SettingsServiceError::InvalidValue(_))
            ));
        }
    }
}
