//! Admin dashboard figures

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::services::analytics::AnalyticsService;
use crate::services::blog::BlogService;
use crate::services::contact::ContactService;
use crate::services::project::ProjectService;
use crate::services::subscriber::SubscriberService;

/// Window of the traffic figures, in days
pub const TRAFFIC_DAYS: u32 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct ContentCounts {
    pub total: i64,
    pub published: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub projects: ContentCounts,
    pub posts: ContentCounts,
    pub inquiries: BTreeMap<String, i64>,
    pub active_subscribers: i64,
    pub page_views: i64,
    pub unique_visitors: i64,
    pub traffic_days: u32,
}

pub struct DashboardService {
    projects: Arc<ProjectService>,
    posts: Arc<BlogService>,
    contact: Arc<ContactService>,
    subscribers: Arc<SubscriberService>,
    analytics: Arc<AnalyticsService>,
}

impl DashboardService {
    pub fn new(
        projects: Arc<ProjectService>,
        posts: Arc<BlogService>,
        contact: Arc<ContactService>,
        subscribers: Arc<SubscriberService>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            projects,
            posts,
            contact,
            subscribers,
            analytics,
        }
    }

    pub async fn stats(&self) -> anyhow::Result<DashboardStats> {
        let traffic = self.analytics.summary(TRAFFIC_DAYS).await?;

        Ok(DashboardStats {
            projects: ContentCounts {
                total: self.projects.count().await?,
                published: self.projects.count_published().await?,
            },
            posts: ContentCounts {
                total: self.posts.count().await?,
                published: self.posts.count_published().await?,
            },
            inquiries: self.contact.counts_by_status().await?,
            active_subscribers: self.subscribers.count_active().await?,
            page_views: traffic.totals.get("page_view").copied().unwrap_or(0),
            unique_visitors: traffic.unique_visitors,
            traffic_days: TRAFFIC_DAYS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::{AnalyticsConfig, EmailConfig};
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{
        SqlxAnalyticsRepository, SqlxBlogPostRepository, SqlxCategoryRepository,
        SqlxInquiryRepository, SqlxProjectRepository, SqlxSubscriberRepository, SqlxTagRepository,
    };
    use crate::models::{ContactInput, ContentStatus, CreatePostInput, CreateProjectInput, EventType, UserRole};
    use crate::services::analytics::ClientInfo;
    use crate::services::category::CategoryService;
    use crate::services::email::EmailService;
    use crate::services::markdown::MarkdownRenderer;
    use crate::services::tag::TagService;

    #[tokio::test]
    async fn test_stats() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "writer", UserRole::Admin).await;
        let cache = Cache::memory();
        let markdown = MarkdownRenderer::shared();
        let tags = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone()), cache.clone()));
        let categories = Arc::new(CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let analytics = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            AnalyticsConfig::default(),
        ));
        let email = Arc::new(EmailService::new(EmailConfig::default()).unwrap());
        let projects = Arc::new(ProjectService::new(
            SqlxProjectRepository::boxed(pool.clone()),
            tags.clone(),
            cache.clone(),
            markdown.clone(),
        ));
        let posts = Arc::new(BlogService::new(
            SqlxBlogPostRepository::boxed(pool.clone()),
            tags,
            categories,
            cache,
            markdown,
        ));
        let contact = Arc::new(ContactService::new(
            SqlxInquiryRepository::boxed(pool.clone()),
            analytics.clone(),
            email.clone(),
            "https://jane.example",
        ));
        let subscribers = Arc::new(SubscriberService::new(
            SqlxSubscriberRepository::boxed(pool),
            analytics.clone(),
            email,
            "https://jane.example",
        ));

        projects
            .create(
                CreateProjectInput {
                    title: "Folio".into(),
                    status: ContentStatus::Published,
                    ..Default::default()
                },
                &[],
            )
            .await
            .unwrap();
        posts
            .create(
                author.id,
                CreatePostInput {
                    title: "Draft".into(),
                    content: "Not yet".into(),
                    ..Default::default()
                },
                &[],
                &[],
            )
            .await
            .unwrap();
        let client = ClientInfo::new(Some("203.0.113.1".into()), None);
        contact
            .submit(
                ContactInput {
                    name: "Sam".into(),
                    email: "sam@example.com".into(),
                    message: "Hello there, nice site.".into(),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap();
        let sub = subscribers.subscribe("r@example.com", None, &client).await.unwrap();
        subscribers.confirm(&sub.token).await.unwrap();
        analytics.track(EventType::PageView, "/", None, &client).await.unwrap();

        let dashboard = DashboardService::new(projects, posts, contact, subscribers, analytics);
        let stats = dashboard.stats().await.unwrap();
        assert_eq!(stats.projects.total, 1);
        assert_eq!(stats.projects.published, 1);
        assert_eq!(stats.posts.total, 1);
        assert_eq!(stats.posts.published, 0);
        assert_eq!(stats.inquiries.get("new"), Some(&1));
        assert_eq!(stats.active_subscribers, 1);
        assert_eq!(stats.page_views, 1);
        assert_eq!(stats.unique_visitors, 1);
    }
}
