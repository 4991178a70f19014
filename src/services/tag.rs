//! Tag service
//!
//! Tags are shared by projects and posts. They are created on demand by
//! name, and the public tag cloud counts published usage only.

use crate::cache::Cache;
use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use crate::services::slug::generate_slug;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const MAX_TAG_NAME_LEN: usize = 50;
const TAG_CLOUD_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tag already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// Existing tag with this name, or a new one with a generated slug
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;

        if let Some(existing) = self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check existing tag")?
        {
            return Ok(existing);
        }

        let slug = self.available_slug(&name, None).await?;
        let created = self
            .repo
            .create(&Tag::new(slug, name))
            .await
            .context("Failed to create tag")?;

        self.cache.invalidate("tags:*").await;
        Ok(created)
    }

    /// Resolve a list of names, skipping blanks and duplicates
    /// Check a tag list before anything is written; blank names are skipped
    pub fn validate_names(names: &[String]) -> Result<(), TagServiceError> {
        names
            .iter()
            .filter(|name| !name.trim().is_empty())
            .try_for_each(|name| validate_name(name).map(|_| ()))
    }

    pub async fn create_or_get_many(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags: Vec<Tag> = Vec::with_capacity(names.len());
        for name in names {
            if name.trim().is_empty() {
                continue;
            }
            let tag = self.create_or_get(name).await?;
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag by ID")?
            .ok_or_else(|| TagServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>, TagServiceError> {
        let tag = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag by slug")?;
        Ok(tag)
    }

    pub async fn list(&self) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.repo.list().await.context("Failed to list tags")?;
        Ok(tags)
    }

    /// Tag cloud: most used first, then by name
    pub async fn list_with_counts(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<TagWithCount>, TagServiceError> {
        let key = format!("tags:cloud:{}", limit.map_or("all".to_string(), |l| l.to_string()));
        self.cache
            .get_or_load(&key, TAG_CLOUD_TTL, || async {
                let mut tags = self
                    .repo
                    .list_with_counts()
                    .await
                    .context("Failed to list tag counts")?;
                sort_by_usage(&mut tags);
                if let Some(limit) = limit {
                    tags.truncate(limit);
                }
                Ok::<_, TagServiceError>(tags)
            })
            .await
    }

    /// Rename a tag; the slug follows the new name
    pub async fn rename(&self, id: i64, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        let tag = self.get_by_id(id).await?;

        if let Some(other) = self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check tag name")?
        {
            if other.id != id {
                return Err(TagServiceError::Conflict(name));
            }
        }

        let renamed = Tag {
            slug: self.available_slug(&name, Some(id)).await?,
            name,
            ..tag
        };
        self.repo
            .update(&renamed)
            .await
            .context("Failed to rename tag")?;

        self.invalidate_content().await;
        Ok(renamed)
    }

    /// Delete a tag; project and post links go with it
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete tag")?;
        if !deleted {
            return Err(TagServiceError::NotFound(id.to_string()));
        }
        self.invalidate_content().await;
        Ok(())
    }

    pub async fn for_project(&self, project_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self
            .repo
            .list_for_project(project_id)
            .await
            .context("Failed to load project tags")?;
        Ok(tags)
    }

    pub async fn for_post(&self, post_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to load post tags")?;
        Ok(tags)
    }

    /// Replace a project's tags by name
    pub async fn set_for_project(
        &self,
        project_id: i64,
        names: &[String],
    ) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.create_or_get_many(names).await?;
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_for_project(project_id, &ids)
            .await
            .context("Failed to set project tags")?;
        self.cache.invalidate("tags:*").await;
        self.for_project(project_id).await
    }

    /// Replace a post's tags by name
    pub async fn set_for_post(
        &self,
        post_id: i64,
        names: &[String],
    ) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.create_or_get_many(names).await?;
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_for_post(post_id, &ids)
            .await
            .context("Failed to set post tags")?;
        self.cache.invalidate("tags:*").await;
        self.for_post(post_id).await
    }

    /// Generated slug for `name`, suffixed `-2`, `-3`, ... when taken by
    /// another tag
    async fn available_slug(&self, name: &str, own_id: Option<i64>) -> Result<String, TagServiceError> {
        let base = match generate_slug(name) {
            s if s.is_empty() => "tag".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut n = 2;
        loop {
            match self
                .repo
                .get_by_slug(&candidate)
                .await
                .context("Failed to check tag slug")?
            {
                Some(existing) if Some(existing.id) != own_id => {
                    candidate = format!("{}-{}", base, n);
                    n += 1;
                }
                _ => return Ok(candidate),
            }
        }
    }

    /// Tag changes show up in every cached project and post
    async fn invalidate_content(&self) {
        self.cache.invalidate("tags:*").await;
        self.cache.invalidate("project:*").await;
        self.cache.invalidate("post:*").await;
    }
}

fn validate_name(name: &str) -> Result<String, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::ValidationError(
            "Tag name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_TAG_NAME_LEN {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name must be at most {} characters",
            MAX_TAG_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn sort_by_usage(tags: &mut [TagWithCount]) {
    tags.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| a.tag.name.to_lowercase().cmp(&b.tag.name.to_lowercase()))
    });
}
