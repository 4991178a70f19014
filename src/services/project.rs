//! Project service
//!
//! Portfolio projects with their tags and image gallery. Public reads are
//! cached under `project:*` and every write drops those keys.

use crate::cache::Cache;
use crate::db::repositories::ProjectRepository;
use crate::models::{
    ContentStatus, CreateImageInput, CreateProjectInput, ListParams, PagedResult, Project,
    ProjectFilter, ProjectImage, UpdateProjectInput,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::slug::{self, normalize_slug};
use crate::services::tag::{TagService, TagServiceError};
use crate::services::validation;
use anyhow::Context;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const PROJECT_CACHE_TTL: Duration = Duration::from_secs(600);
const MAX_TITLE_LEN: usize = 200;
const MAX_SUMMARY_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 100_000;
const MAX_TECH_STACK: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum ProjectServiceError {
    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Project slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for ProjectServiceError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::ValidationError(msg) => ProjectServiceError::ValidationError(msg),
            TagServiceError::InternalError(e) => ProjectServiceError::InternalError(e),
            other => ProjectServiceError::InternalError(anyhow::anyhow!(other)),
        }
    }
}

pub struct ProjectService {
    repo: Arc<dyn ProjectRepository>,
    tags: Arc<TagService>,
    cache: Arc<Cache>,
    markdown: Arc<MarkdownRenderer>,
}

impl ProjectService {
    pub fn new(
        repo: Arc<dyn ProjectRepository>,
        tags: Arc<TagService>,
        cache: Arc<Cache>,
        markdown: Arc<MarkdownRenderer>,
    ) -> Self {
        Self {
            repo,
            tags,
            cache,
            markdown,
        }
    }

    pub async fn create(
        &self,
        input: CreateProjectInput,
        tag_names: &[String],
    ) -> Result<Project, ProjectServiceError> {
        let title = validate_title(&input.title)?;
        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        if self
            .repo
            .slug_exists(&slug, None)
            .await
            .context("Failed to check project slug")?
        {
            return Err(ProjectServiceError::DuplicateSlug(slug));
        }
        let summary = validate_summary(&input.summary)?;
        validate_description(&input.description)?;
        TagService::validate_names(tag_names)?;

        let now = Utc::now();
        let project = Project {
            id: 0,
            slug,
            title,
            summary,
            description_html: self.markdown.render(&input.description),
            description: input.description,
            status: input.status,
            featured: input.featured,
            sort_order: input.sort_order,
            repo_url: clean_url("repo_url", input.repo_url)?,
            live_url: clean_url("live_url", input.live_url)?,
            cover_image: clean_url("cover_image", input.cover_image)?,
            tech_stack: clean_tech_stack(input.tech_stack)?,
            started_at: input.started_at,
            completed_at: input.completed_at,
            published_at: (input.status == ContentStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            images: Vec::new(),
        };
        validate_dates(&project)?;

        let mut created = self
            .repo
            .create(&project)
            .await
            .context("Failed to create project")?;
        created.tags = self.tags.set_for_project(created.id, tag_names).await?;

        tracing::info!(project_id = created.id, slug = %created.slug, "Project created");
        self.invalidate().await;
        Ok(created)
    }

    /// Project with tags and images
    pub async fn get_by_id(&self, id: i64) -> Result<Project, ProjectServiceError> {
        let project = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get project")?
            .ok_or_else(|| ProjectServiceError::NotFound(id.to_string()))?;
        self.with_relations(project).await
    }

    /// Project with tags and images, any status
    pub async fn get_by_slug(&self, slug: &str) -> Result<Project, ProjectServiceError> {
        let slug = normalize_slug(slug);
        let key = format!("project:slug:{}", slug);
        let project: Option<Project> = self
            .cache
            .get_or_load(&key, PROJECT_CACHE_TTL, || async {
                match self
                    .repo
                    .get_by_slug(&slug)
                    .await
                    .context("Failed to get project by slug")?
                {
                    Some(p) => Ok::<_, ProjectServiceError>(Some(self.with_relations(p).await?)),
                    None => Ok(None),
                }
            })
            .await?;
        project.ok_or(ProjectServiceError::NotFound(slug))
    }

    /// Public lookup; drafts and archived projects are not found
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Project, ProjectServiceError> {
        let project = self.get_by_slug(slug).await?;
        if !project.is_published() {
            return Err(ProjectServiceError::NotFound(slug.to_string()));
        }
        Ok(project)
    }

    /// Admin listing, every status unless filtered
    pub async fn list(
        &self,
        filter: &ProjectFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Project>, ProjectServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list projects")?;
        let items = self.with_tags(items).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Public listing: published only, featured first, then `sort_order`,
    /// then newest
    pub async fn list_published(
        &self,
        filter: &ProjectFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Project>, ProjectServiceError> {
        let filter = ProjectFilter {
            status: Some(ContentStatus::Published),
            featured: filter.featured,
            tag: filter.tag.as_deref().map(normalize_slug),
        };
        let key = format!(
            "project:list:{}:{}:{}:{}",
            filter.featured.map_or("any".to_string(), |f| f.to_string()),
            filter.tag.as_deref().unwrap_or("-"),
            params.page,
            params.per_page
        );
        self.cache
            .get_or_load(&key, PROJECT_CACHE_TTL, || self.list(&filter, params))
            .await
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateProjectInput,
        tag_names: Option<&[String]>,
    ) -> Result<Project, ProjectServiceError> {
        let mut project = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get project")?
            .ok_or_else(|| ProjectServiceError::NotFound(id.to_string()))?;

        if let Some(title) = input.title {
            project.title = validate_title(&title)?;
        }
        if let Some(slug) = input.slug {
            let slug = resolve_slug(Some(&slug), &project.title)?;
            if self
                .repo
                .slug_exists(&slug, Some(id))
                .await
                .context("Failed to check project slug")?
            {
                return Err(ProjectServiceError::DuplicateSlug(slug));
            }
            project.slug = slug;
        }
        if let Some(summary) = input.summary {
            project.summary = validate_summary(&summary)?;
        }
        if let Some(description) = input.description {
            validate_description(&description)?;
            project.description_html = self.markdown.render(&description);
            project.description = description;
        }
        if let Some(status) = input.status {
            project.published_at = next_published_at(project.status, status, project.published_at);
            project.status = status;
        }
        if let Some(featured) = input.featured {
            project.featured = featured;
        }
        if let Some(sort_order) = input.sort_order {
            project.sort_order = sort_order;
        }
        if input.repo_url.is_some() {
            project.repo_url = clean_url("repo_url", input.repo_url)?;
        }
        if input.live_url.is_some() {
            project.live_url = clean_url("live_url", input.live_url)?;
        }
        if input.cover_image.is_some() {
            project.cover_image = clean_url("cover_image", input.cover_image)?;
        }
        if let Some(stack) = input.tech_stack {
            project.tech_stack = clean_tech_stack(stack)?;
        }
        if input.started_at.is_some() {
            project.started_at = input.started_at;
        }
        if input.completed_at.is_some() {
            project.completed_at = input.completed_at;
        }
        validate_dates(&project)?;
        if let Some(names) = tag_names {
            TagService::validate_names(names)?;
        }

        let updated = self
            .repo
            .update(&project)
            .await
            .context("Failed to update project")?;
        if let Some(names) = tag_names {
            self.tags.set_for_project(id, names).await?;
        }

        self.invalidate().await;
        self.with_relations(updated).await
    }

    /// Delete a project; its images and tag links cascade
    pub async fn delete(&self, id: i64) -> Result<(), ProjectServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete project")?;
        if !deleted {
            return Err(ProjectServiceError::NotFound(id.to_string()));
        }
        tracing::info!(project_id = id, "Project deleted");
        self.invalidate().await;
        Ok(())
    }

    /// Set `sort_order` to each id's position in `ids`
    pub async fn reorder(&self, ids: &[i64]) -> Result<(), ProjectServiceError> {
        ensure_unique(ids)?;
        for id in ids {
            if self
                .repo
                .get_by_id(*id)
                .await
                .context("Failed to get project")?
                .is_none()
            {
                return Err(ProjectServiceError::NotFound(id.to_string()));
            }
        }
        self.repo
            .reorder(ids)
            .await
            .context("Failed to reorder projects")?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, ProjectServiceError> {
        let count = self.repo.count(None).await.context("Failed to count projects")?;
        Ok(count)
    }

    pub async fn count_published(&self) -> Result<i64, ProjectServiceError> {
        let count = self
            .repo
            .count(Some(ContentStatus::Published))
            .await
            .context("Failed to count published projects")?;
        Ok(count)
    }

    pub async fn list_images(&self, project_id: i64) -> Result<Vec<ProjectImage>, ProjectServiceError> {
        self.ensure_exists(project_id).await?;
        let images = self
            .repo
            .list_images(project_id)
            .await
            .context("Failed to list project images")?;
        Ok(images)
    }

    /// Append an image to the end of the gallery
    pub async fn add_image(
        &self,
        project_id: i64,
        input: CreateImageInput,
    ) -> Result<ProjectImage, ProjectServiceError> {
        let existing = self.list_images(project_id).await?;
        let url = clean_url("url", Some(input.url))?
            .ok_or_else(|| ProjectServiceError::ValidationError("url is required".to_string()))?;
        if input.alt_text.chars().count() > 300 {
            return Err(ProjectServiceError::ValidationError(
                "alt_text must be at most 300 characters".to_string(),
            ));
        }

        let image = ProjectImage {
            id: 0,
            project_id,
            url,
            alt_text: input.alt_text.trim().to_string(),
            caption: input
                .caption
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            sort_order: existing.iter().map(|i| i.sort_order + 1).max().unwrap_or(0),
            created_at: Utc::now(),
        };
        let created = self
            .repo
            .add_image(&image)
            .await
            .context("Failed to add project image")?;

        self.invalidate().await;
        Ok(created)
    }

    /// Remove an image; it must belong to `project_id`
    pub async fn remove_image(&self, project_id: i64, image_id: i64) -> Result<(), ProjectServiceError> {
        let deleted = self
            .repo
            .delete_image(project_id, image_id)
            .await
            .context("Failed to delete project image")?;
        if !deleted {
            return Err(ProjectServiceError::NotFound(format!(
                "image {} of project {}",
                image_id, project_id
            )));
        }
        self.invalidate().await;
        Ok(())
    }

    /// `ids` must be exactly the project's image ids, in the new order
    pub async fn reorder_images(
        &self,
        project_id: i64,
        ids: &[i64],
    ) -> Result<Vec<ProjectImage>, ProjectServiceError> {
        ensure_unique(ids)?;
        let current: HashSet<i64> = self
            .list_images(project_id)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        let requested: HashSet<i64> = ids.iter().copied().collect();
        if current != requested {
            return Err(ProjectServiceError::ValidationError(
                "Image order must list every image of the project exactly once".to_string(),
            ));
        }

        self.repo
            .reorder_images(project_id, ids)
            .await
            .context("Failed to reorder project images")?;
        self.invalidate().await;
        self.list_images(project_id).await
    }

    async fn ensure_exists(&self, id: i64) -> Result<(), ProjectServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get project")?
            .map(|_| ())
            .ok_or_else(|| ProjectServiceError::NotFound(id.to_string()))
    }

    async fn with_relations(&self, mut project: Project) -> Result<Project, ProjectServiceError> {
        project.tags = self.tags.for_project(project.id).await?;
        project.images = self
            .repo
            .list_images(project.id)
            .await
            .context("Failed to list project images")?;
        Ok(project)
    }

    async fn with_tags(&self, projects: Vec<Project>) -> Result<Vec<Project>, ProjectServiceError> {
        let mut out = Vec::with_capacity(projects.len());
        for mut project in projects {
            project.tags = self.tags.for_project(project.id).await?;
            out.push(project);
        }
        Ok(out)
    }

    async fn invalidate(&self) {
        self.cache.invalidate("project:*").await;
        self.cache.invalidate("tags:*").await;
    }
}

/// `published_at` after a status change: stamped when entering published,
/// cleared when leaving it
pub(crate) fn next_published_at(
    from: ContentStatus,
    to: ContentStatus,
    current: Option<chrono::DateTime<Utc>>,
) -> Option<chrono::DateTime<Utc>> {
    match (from == ContentStatus::Published, to == ContentStatus::Published) {
        (false, true) => Some(current.unwrap_or_else(Utc::now)),
        (true, false) => None,
        _ => current,
    }
}

fn validate_title(title: &str) -> Result<String, ProjectServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ProjectServiceError::ValidationError(
            "Title is required".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ProjectServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_summary(summary: &str) -> Result<String, ProjectServiceError> {
    let summary = summary.trim();
    if summary.chars().count() > MAX_SUMMARY_LEN {
        return Err(ProjectServiceError::ValidationError(format!(
            "Summary must be at most {} characters",
            MAX_SUMMARY_LEN
        )));
    }
    Ok(summary.to_string())
}

fn validate_description(description: &str) -> Result<(), ProjectServiceError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ProjectServiceError::ValidationError(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

fn validate_dates(project: &Project) -> Result<(), ProjectServiceError> {
    if let (Some(started), Some(completed)) = (project.started_at, project.completed_at) {
        if completed < started {
            return Err(ProjectServiceError::ValidationError(
                "completed_at must not be before started_at".to_string(),
            ));
        }
    }
    Ok(())
}

fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, ProjectServiceError> {
    slug::resolve_slug(explicit, title).map_err(ProjectServiceError::ValidationError)
}

fn clean_url(field: &str, value: Option<String>) -> Result<Option<String>, ProjectServiceError> {
    validation::clean_url(field, value).map_err(ProjectServiceError::ValidationError)
}

fn clean_tech_stack(stack: Vec<String>) -> Result<Vec<String>, ProjectServiceError> {
    let mut cleaned: Vec<String> = Vec::new();
    for item in stack {
        let item = item.trim().replace(',', " ");
        if !item.is_empty() && !cleaned.contains(&item) {
            cleaned.push(item);
        }
    }
    if cleaned.len() > MAX_TECH_STACK {
        return Err(ProjectServiceError::ValidationError(format!(
            "At most {} tech stack entries",
            MAX_TECH_STACK
        )));
    }
    Ok(cleaned)
}

fn ensure_unique(ids: &[i64]) -> Result<(), ProjectServiceError> {
    let mut seen = HashSet::new();
    if ids.iter().all(|id| seen.insert(*id)) {
        Ok(())
    } else {
        Err(ProjectServiceError::ValidationError(
            "Duplicate id in order list".to_string(),
        ))
    }
}
