//! Blog category service

use crate::cache::Cache;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
use crate::services::slug::{self, normalize_slug};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_KEY_CATEGORY_LIST: &str = "category:list";
const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        self.ensure_slug_free(&slug, None).await?;

        let category = Category {
            id: 0,
            slug,
            name,
            description: clean_description(input.description)?,
            created_at: Utc::now(),
        };
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        self.invalidate().await;
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self.get_by_id(id).await?;

        if let Some(name) = input.name {
            category.name = validate_name(&name)?;
        }
        if let Some(slug) = input.slug {
            let slug = resolve_slug(Some(&slug), &category.name)?;
            self.ensure_slug_free(&slug, Some(id)).await?;
            category.slug = slug;
        }
        if input.description.is_some() {
            category.description = clean_description(input.description)?;
        }

        self.repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        self.invalidate().await;
        Ok(category)
    }

    /// Delete a category; posts keep existing without it
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !deleted {
            return Err(CategoryServiceError::NotFound(id.to_string()));
        }
        self.invalidate().await;
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(&normalize_slug(slug))
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    /// All categories with their published post counts, by name
    pub async fn list(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        self.cache
            .get_or_load(CACHE_KEY_CATEGORY_LIST, CATEGORY_CACHE_TTL, || async {
                let categories = self
                    .repo
                    .list_with_counts()
                    .await
                    .context("Failed to list categories")?;
                Ok::<_, CategoryServiceError>(categories)
            })
            .await
    }

    /// Fail with a validation error unless every id names a category
    pub async fn ensure_exist(&self, ids: &[i64]) -> Result<(), CategoryServiceError> {
        for id in ids {
            let found = self
                .repo
                .get_by_id(*id)
                .await
                .context("Failed to check category")?;
            if found.is_none() {
                return Err(CategoryServiceError::ValidationError(format!(
                    "Unknown category id {}",
                    id
                )));
            }
        }
        Ok(())
    }

    pub async fn for_post(&self, post_id: i64) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to load post categories")?;
        Ok(categories)
    }

    pub async fn set_for_post(
        &self,
        post_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Category>, CategoryServiceError> {
        self.ensure_exist(ids).await?;
        self.repo
            .set_for_post(post_id, ids)
            .await
            .context("Failed to set post categories")?;
        self.invalidate().await;
        self.for_post(post_id).await
    }

    async fn ensure_slug_free(&self, slug: &str, own_id: Option<i64>) -> Result<(), CategoryServiceError> {
        if let Some(existing) = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to check category slug")?
        {
            if Some(existing.id) != own_id {
                return Err(CategoryServiceError::DuplicateSlug(slug.to_string()));
            }
        }
        Ok(())
    }

    async fn invalidate(&self) {
        self.cache.invalidate("category:*").await;
        self.cache.invalidate("post:*").await;
    }
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn resolve_slug(explicit: Option<&str>, name: &str) -> Result<String, CategoryServiceError> {
    slug::resolve_slug(explicit, name).map_err(CategoryServiceError::ValidationError)
}

fn clean_description(description: Option<String>) -> Result<Option<String>, CategoryServiceError> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if let Some(d) = &description {
        if d.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CategoryServiceError::ValidationError(format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxCategoryRepository;

    async fn setup_service() -> CategoryService {
        CategoryService::new(SqlxCategoryRepository::boxed(migrated_pool().await), Cache::memory())
    }

    fn input(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            slug: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let service = setup_service().await;
        let category = service.create(input("Systems Programming")).await.unwrap();
        assert_eq!(category.slug, "systems-programming");
        assert_eq!(service.get_by_slug("Systems-Programming").await.unwrap().id, category.id);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let service = setup_service().await;
        service.create(input("Notes")).await.unwrap();
        assert!(matches!(
            service.create(input("notes")).await,
            Err(CategoryServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let service = setup_service().await;
        assert!(matches!(
            service.create(input("  ")).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
        let bad_slug = CreateCategoryInput {
            slug: Some("no spaces!".into()),
            ..input("Notes")
        };
        assert!(matches!(
            service.create(bad_slug).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_list_cache() {
        let service = setup_service().await;
        let category = service.create(input("Notes")).await.unwrap();
        assert_eq!(service.list().await.unwrap()[0].category.name, "Notes");

        let updated = service
            .update(
                category.id,
                UpdateCategoryInput {
                    name: Some("Field Notes".into()),
                    description: Some("Short posts".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "notes");
        assert_eq!(updated.description.as_deref(), Some("Short posts"));

        let listed = service.list().await.unwrap();
        assert_eq!(listed[0].category.name, "Field Notes");
        assert_eq!(listed[0].post_count, 0);
    }

    #[tokio::test]
    async fn test_delete_and_ensure_exist() {
        let service = setup_service().await;
        let category = service.create(input("Notes")).await.unwrap();
        service.ensure_exist(&[category.id]).await.unwrap();

        service.delete(category.id).await.unwrap();
        assert!(matches!(
            service.ensure_exist(&[category.id]).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.delete(category.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }
}
