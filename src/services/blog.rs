//! Blog service
//!
//! Posts are written in markdown. On every save the HTML, the excerpt
//! (unless given) and the reading time are derived from the content.

use crate::cache::Cache;
use crate::db::repositories::BlogPostRepository;
use crate::models::{
    BlogPost, ContentStatus, CreatePostInput, ListParams, PagedResult, PostFilter, UpdatePostInput,
};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::markdown::{html_escape, MarkdownRenderer};
use crate::services::project::next_published_at;
use crate::services::slug::{self, normalize_slug};
use crate::services::tag::{TagService, TagServiceError};
use crate::services::validation;
use anyhow::Context;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

const POST_CACHE_TTL: Duration = Duration::from_secs(600);
const MAX_TITLE_LEN: usize = 200;
const MAX_EXCERPT_LEN: usize = 500;
const MAX_CONTENT_LEN: usize = 200_000;

pub const EXCERPT_CHARS: usize = 160;
pub const WORDS_PER_MINUTE: usize = 200;
pub const MAX_FEED_ITEMS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for BlogServiceError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::ValidationError(msg) => BlogServiceError::ValidationError(msg),
            TagServiceError::InternalError(e) => BlogServiceError::InternalError(e),
            other => BlogServiceError::InternalError(anyhow::anyhow!(other)),
        }
    }
}

impl From<CategoryServiceError> for BlogServiceError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::ValidationError(msg) => BlogServiceError::ValidationError(msg),
            CategoryServiceError::NotFound(what) => {
                BlogServiceError::ValidationError(format!("Unknown category: {}", what))
            }
            CategoryServiceError::InternalError(e) => BlogServiceError::InternalError(e),
            other => BlogServiceError::InternalError(anyhow::anyhow!(other)),
        }
    }
}

/// Channel metadata for the RSS feed
#[derive(Debug, Clone)]
pub struct FeedChannel {
    pub title: String,
    pub description: String,
    /// Absolute site URL without a trailing slash
    pub link: String,
}

pub struct BlogService {
    repo: Arc<dyn BlogPostRepository>,
    tags: Arc<TagService>,
    categories: Arc<CategoryService>,
    cache: Arc<Cache>,
    markdown: Arc<MarkdownRenderer>,
}

impl BlogService {
    pub fn new(
        repo: Arc<dyn BlogPostRepository>,
        tags: Arc<TagService>,
        categories: Arc<CategoryService>,
        cache: Arc<Cache>,
        markdown: Arc<MarkdownRenderer>,
    ) -> Self {
        Self {
            repo,
            tags,
            categories,
            cache,
            markdown,
        }
    }

    pub async fn create(
        &self,
        author_id: i64,
        input: CreatePostInput,
        tag_names: &[String],
        category_ids: &[i64],
    ) -> Result<BlogPost, BlogServiceError> {
        let title = validate_title(&input.title)?;
        validate_content(&input.content)?;
        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        if self
            .repo
            .slug_exists(&slug, None)
            .await
            .context("Failed to check post slug")?
        {
            return Err(BlogServiceError::DuplicateSlug(slug));
        }
        self.categories.ensure_exist(category_ids).await?;
        TagService::validate_names(tag_names)?;

        let derived = self.derive(&input.content);
        let now = Utc::now();
        let post = BlogPost {
            id: 0,
            slug,
            title,
            excerpt: resolve_excerpt(input.excerpt, &derived.excerpt)?,
            content: input.content,
            content_html: derived.html,
            author_id,
            status: input.status,
            featured: input.featured,
            cover_image: clean_url(input.cover_image)?,
            reading_time_minutes: derived.reading_time,
            view_count: 0,
            published_at: (input.status == ContentStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            categories: Vec::new(),
        };

        let mut created = self
            .repo
            .create(&post)
            .await
            .context("Failed to create post")?;
        created.tags = self.tags.set_for_post(created.id, tag_names).await?;
        created.categories = self.categories.set_for_post(created.id, category_ids).await?;

        tracing::info!(post_id = created.id, slug = %created.slug, "Post created");
        self.invalidate().await;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<BlogPost, BlogServiceError> {
        let post = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))?;
        self.with_relations(post).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<BlogPost, BlogServiceError> {
        let slug = normalize_slug(slug);
        let key = format!("post:slug:{}", slug);
        let post: Option<BlogPost> = self
            .cache
            .get_or_load(&key, POST_CACHE_TTL, || async {
                match self
                    .repo
                    .get_by_slug(&slug)
                    .await
                    .context("Failed to get post by slug")?
                {
                    Some(p) => Ok::<_, BlogServiceError>(Some(self.with_relations(p).await?)),
                    None => Ok(None),
                }
            })
            .await?;
        post.ok_or(BlogServiceError::NotFound(slug))
    }

    /// Public lookup; only published posts are found
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<BlogPost, BlogServiceError> {
        let post = self.get_by_slug(slug).await?;
        if !post.is_published() {
            return Err(BlogServiceError::NotFound(slug.to_string()));
        }
        Ok(post)
    }

    pub async fn list(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, BlogServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list posts")?;
        let mut out = Vec::with_capacity(items.len());
        for post in items {
            out.push(self.with_relations(post).await?);
        }
        Ok(PagedResult::new(out, total, params))
    }

    /// Published posts, newest first
    pub async fn list_published(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, BlogServiceError> {
        let filter = PostFilter {
            status: Some(ContentStatus::Published),
            tag: filter.tag.as_deref().map(normalize_slug),
            category: filter.category.as_deref().map(normalize_slug),
            q: filter
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            featured: filter.featured,
        };

        // Keyword searches are not cached; their key space is unbounded.
        if filter.q.is_some() {
            return self.list(&filter, params).await;
        }

        let key = format!(
            "post:list:{}:{}:{}:{}:{}",
            filter.featured.map_or("any".to_string(), |f| f.to_string()),
            filter.tag.as_deref().unwrap_or("-"),
            filter.category.as_deref().unwrap_or("-"),
            params.page,
            params.per_page
        );
        self.cache
            .get_or_load(&key, POST_CACHE_TTL, || self.list(&filter, params))
            .await
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdatePostInput,
        tag_names: Option<&[String]>,
        category_ids: Option<&[i64]>,
    ) -> Result<BlogPost, BlogServiceError> {
        let mut post = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))?;

        if let Some(title) = input.title {
            post.title = validate_title(&title)?;
        }
        if let Some(slug) = input.slug {
            let slug = resolve_slug(Some(&slug), &post.title)?;
            if self
                .repo
                .slug_exists(&slug, Some(id))
                .await
                .context("Failed to check post slug")?
            {
                return Err(BlogServiceError::DuplicateSlug(slug));
            }
            post.slug = slug;
        }

        let content_changed = input.content.is_some();
        if let Some(content) = input.content {
            validate_content(&content)?;
            post.content = content;
        }
        let derived = self.derive(&post.content);
        if content_changed {
            post.content_html = derived.html;
            post.reading_time_minutes = derived.reading_time;
        }
        match input.excerpt {
            Some(excerpt) => post.excerpt = resolve_excerpt(Some(excerpt), &derived.excerpt)?,
            None if content_changed => post.excerpt = derived.excerpt,
            None => {}
        }

        if let Some(status) = input.status {
            post.published_at = next_published_at(post.status, status, post.published_at);
            post.status = status;
        }
        if let Some(featured) = input.featured {
            post.featured = featured;
        }
        if input.cover_image.is_some() {
            post.cover_image = clean_url(input.cover_image)?;
        }
        if let Some(ids) = category_ids {
            self.categories.ensure_exist(ids).await?;
        }
        if let Some(names) = tag_names {
            TagService::validate_names(names)?;
        }

        let updated = self
            .repo
            .update(&post)
            .await
            .context("Failed to update post")?;
        if let Some(names) = tag_names {
            self.tags.set_for_post(id, names).await?;
        }
        if let Some(ids) = category_ids {
            self.categories.set_for_post(id, ids).await?;
        }

        self.invalidate().await;
        self.with_relations(updated).await
    }

    /// Delete a post; tag and category links cascade
    pub async fn delete(&self, id: i64) -> Result<(), BlogServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete post")?;
        if !deleted {
            return Err(BlogServiceError::NotFound(id.to_string()));
        }
        tracing::info!(post_id = id, "Post deleted");
        self.invalidate().await;
        Ok(())
    }

    /// Count a view. Cached copies keep their old count until the next write.
    pub async fn increment_views(&self, id: i64) -> Result<(), BlogServiceError> {
        self.repo
            .increment_views(id)
            .await
            .context("Failed to increment post views")?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, BlogServiceError> {
        let count = self.repo.count(None).await.context("Failed to count posts")?;
        Ok(count)
    }

    pub async fn count_published(&self) -> Result<i64, BlogServiceError> {
        let count = self
            .repo
            .count(Some(ContentStatus::Published))
            .await
            .context("Failed to count published posts")?;
        Ok(count)
    }

    /// RSS 2.0 document of the newest published posts
    pub async fn feed(&self, channel: &FeedChannel, limit: usize) -> Result<String, BlogServiceError> {
        let params = ListParams::new(1, limit.clamp(1, MAX_FEED_ITEMS) as u32);
        let posts = self
            .list_published(&PostFilter::default(), &params)
            .await?
            .items;
        Ok(render_rss(channel, &posts))
    }

    fn derive(&self, content: &str) -> Derived {
        let text = self.markdown.plain_text(content);
        Derived {
            html: self.markdown.render(content),
            excerpt: make_excerpt(&text, EXCERPT_CHARS),
            reading_time: reading_time_minutes(&text),
        }
    }

    async fn with_relations(&self, mut post: BlogPost) -> Result<BlogPost, BlogServiceError> {
        post.tags = self.tags.for_post(post.id).await?;
        post.categories = self.categories.for_post(post.id).await?;
        Ok(post)
    }

    async fn invalidate(&self) {
        self.cache.invalidate("post:*").await;
        self.cache.invalidate("tags:*").await;
        self.cache.invalidate("category:*").await;
    }
}

struct Derived {
    html: String,
    excerpt: String,
    reading_time: i64,
}

/// First `max` characters of `text`, cut back to a word boundary, with
/// "…" appended when anything was dropped
pub fn make_excerpt(text: &str, max: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max {
        return text;
    }

    let cut: String = text.chars().take(max).collect();
    let next_is_space = text.chars().nth(max).is_some_and(char::is_whitespace);
    let kept = if next_is_space {
        cut.as_str()
    } else {
        match cut.rfind(' ') {
            Some(pos) if pos > 0 => &cut[..pos],
            _ => cut.as_str(),
        }
    };
    format!("{}…", kept.trim_end())
}

/// Whole minutes at `WORDS_PER_MINUTE`, never less than one
pub fn reading_time_minutes(text: &str) -> i64 {
    let words = text.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}

fn render_rss(channel: &FeedChannel, posts: &[BlogPost]) -> String {
    let link = channel.link.trim_end_matches('/');
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n<channel>\n");
    let _ = writeln!(xml, "<title>{}</title>", html_escape(&channel.title));
    let _ = writeln!(xml, "<link>{}</link>", html_escape(link));
    let _ = writeln!(xml, "<description>{}</description>", html_escape(&channel.description));
    let _ = writeln!(
        xml,
        "<atom:link href=\"{}/api/v1/feed.xml\" rel=\"self\" type=\"application/rss+xml\"/>",
        html_escape(link)
    );
    if let Some(latest) = posts.iter().filter_map(|p| p.published_at).max() {
        let _ = writeln!(xml, "<lastBuildDate>{}</lastBuildDate>", latest.to_rfc2822());
    }

    for post in posts {
        let url = format!("{}/blog/{}", link, post.slug);
        xml.push_str("<item>\n");
        let _ = writeln!(xml, "<title>{}</title>", html_escape(&post.title));
        let _ = writeln!(xml, "<link>{}</link>", html_escape(&url));
        let _ = writeln!(xml, "<guid isPermaLink=\"true\">{}</guid>", html_escape(&url));
        let _ = writeln!(xml, "<description>{}</description>", html_escape(&post.excerpt));
        if let Some(published) = post.published_at {
            let _ = writeln!(xml, "<pubDate>{}</pubDate>", published.to_rfc2822());
        }
        for category in &post.categories {
            let _ = writeln!(xml, "<category>{}</category>", html_escape(&category.name));
        }
        xml.push_str("</item>\n");
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

fn validate_title(title: &str) -> Result<String, BlogServiceError> {
    let title = title.trim();
    validation::check_length("Title", title, 1, MAX_TITLE_LEN)
        .map_err(BlogServiceError::ValidationError)?;
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<(), BlogServiceError> {
    if content.trim().is_empty() {
        return Err(BlogServiceError::ValidationError(
            "Content is required".to_string(),
        ));
    }
    validation::check_length("Content", content, 1, MAX_CONTENT_LEN)
        .map_err(BlogServiceError::ValidationError)
}

fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, BlogServiceError> {
    slug::resolve_slug(explicit, title).map_err(BlogServiceError::ValidationError)
}

/// An explicit non-blank excerpt wins over the generated one
fn resolve_excerpt(explicit: Option<String>, generated: &str) -> Result<String, BlogServiceError> {
    match explicit.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
        Some(excerpt) => {
            validation::check_length("Excerpt", &excerpt, 1, MAX_EXCERPT_LEN)
                .map_err(BlogServiceError::ValidationError)?;
            Ok(excerpt)
        }
        None => Ok(generated.to_string()),
    }
}

fn clean_url(value: Option<String>) -> Result<Option<String>, BlogServiceError> {
    validation::clean_url("cover_image", value).map_err(BlogServiceError::ValidationError)
}
