//! GitHub repository import
//!
//! Lists the configured user's public repositories and turns one into a
//! draft project.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::GithubConfig;
use crate::models::{ContentStatus, CreateProjectInput, Project};
use crate::services::project::{ProjectService, ProjectServiceError};

const REPOS_CACHE_TTL: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum GithubServiceError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Project already exists: {0}")]
    Conflict(String),

    #[error("GitHub request failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ProjectServiceError> for GithubServiceError {
    fn from(e: ProjectServiceError) -> Self {
        match e {
            ProjectServiceError::DuplicateSlug(slug) => GithubServiceError::Conflict(slug),
            ProjectServiceError::ValidationError(msg) => GithubServiceError::ValidationError(msg),
            ProjectServiceError::InternalError(e) => GithubServiceError::InternalError(e),
            other => GithubServiceError::InternalError(anyhow!(other)),
        }
    }
}

/// The subset of the GitHub repository payload we use
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GithubRepo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

pub struct GithubService {
    config: GithubConfig,
    client: reqwest::Client,
    projects: Arc<ProjectService>,
    cache: Arc<Cache>,
}

impl GithubService {
    pub fn new(
        config: GithubConfig,
        projects: Arc<ProjectService>,
        cache: Arc<Cache>,
    ) -> Result<Self, GithubServiceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            client,
            projects,
            cache,
        })
    }

    fn username(&self) -> Result<&str, GithubServiceError> {
        self.config
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                GithubServiceError::ValidationError("github.username is not configured".to_string())
            })
    }

    /// Public, non-fork, non-archived repositories, most recently updated first
    pub async fn list_repos(&self) -> Result<Vec<GithubRepo>, GithubServiceError> {
        let username = self.username()?;
        let key = format!("github:repos:{}", username.to_lowercase());
        self.cache
            .get_or_load(&key, REPOS_CACHE_TTL, || self.fetch_repos(username))
            .await
    }

    async fn fetch_repos(&self, username: &str) -> Result<Vec<GithubRepo>, GithubServiceError> {
        let url = format!(
            "{}/users/{}/repos?per_page=100&sort=updated&type=owner",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(username)
        );
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GithubServiceError::Upstream(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GithubServiceError::NotFound(username.to_string()));
        }
        if !status.is_success() {
            return Err(GithubServiceError::Upstream(format!("GitHub returned {}", status)));
        }

        let repos: Vec<GithubRepo> = response
            .json()
            .await
            .map_err(|e| GithubServiceError::Upstream(format!("Invalid response: {}", e)))?;
        tracing::debug!(username, count = repos.len(), "Fetched GitHub repositories");
        Ok(visible_repos(repos))
    }

    /// Create a draft project from one of the user's repositories
    pub async fn import(&self, repo_name: &str) -> Result<Project, GithubServiceError> {
        let wanted = repo_name.trim();
        if wanted.is_empty() {
            return Err(GithubServiceError::ValidationError(
                "Repository name is required".to_string(),
            ));
        }
        let repo = self
            .list_repos()
            .await?
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GithubServiceError::NotFound(wanted.to_string()))?;

        let (input, tags) = project_from_repo(&repo);
        let project = self.projects.create(input, &tags).await?;
        tracing::info!(project_id = project.id, repo = %repo.name, "Imported GitHub repository");
        Ok(project)
    }
}

fn visible_repos(repos: Vec<GithubRepo>) -> Vec<GithubRepo> {
    repos.into_iter().filter(|r| !r.fork && !r.archived).collect()
}

/// Draft project input plus tag names (topics, then the language)
fn project_from_repo(repo: &GithubRepo) -> (CreateProjectInput, Vec<String>) {
    let mut tags = repo.topics.clone();
    if let Some(language) = &repo.language {
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(language)) {
            tags.push(language.clone());
        }
    }
    let input = CreateProjectInput {
        title: repo.name.clone(),
        summary: repo
            .description
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(500)
            .collect(),
        status: ContentStatus::Draft,
        repo_url: Some(repo.html_url.clone()),
        live_url: repo.homepage.clone().filter(|h| !h.trim().is_empty()),
        tech_stack: repo.language.iter().cloned().collect(),
        ..Default::default()
    };
    (input, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxProjectRepository, SqlxTagRepository};
    use crate::services::markdown::MarkdownRenderer;
    use crate::services::tag::TagService;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    fn repo(name: &str) -> GithubRepo {
        GithubRepo {
            name: name.to_string(),
            description: Some("A thing".into()),
            html_url: format!("https://github.com/jane/{}", name),
            homepage: Some("".into()),
            language: Some("Rust".into()),
            topics: vec!["cli".into(), "rust".into()],
            stargazers_count: 3,
            fork: false,
            archived: false,
            updated_at: None,
        }
    }

    /// Serve a canned repository list on a local port
    async fn fake_github() -> String {
        let body = json!([
            {"name": "folio", "description": "Portfolio CMS", "html_url": "https://github.com/jane/folio",
             "homepage": "https://jane.example", "language": "Rust", "topics": ["cms"]},
            {"name": "forked", "html_url": "https://github.com/jane/forked", "fork": true},
            {"name": "old", "html_url": "https://github.com/jane/old", "archived": true}
        ]);
        let app = Router::new().route(
            "/users/{user}/repos",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn setup(config: GithubConfig) -> GithubService {
        let pool = migrated_pool().await;
        let cache = Cache::memory();
        let tags = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone()), cache.clone()));
        let projects = Arc::new(ProjectService::new(
            SqlxProjectRepository::boxed(pool),
            tags,
            cache.clone(),
            MarkdownRenderer::shared(),
        ));
        GithubService::new(config, projects, cache).unwrap()
    }

    #[test]
    fn test_project_from_repo() {
        let (input, tags) = project_from_repo(&repo("folio"));
        assert_eq!(input.title, "folio");
        assert_eq!(input.summary, "A thing");
        assert_eq!(input.status, ContentStatus::Draft);
        assert_eq!(input.live_url, None);
        assert_eq!(input.tech_stack, vec!["Rust".to_string()]);
        assert_eq!(tags, vec!["cli".to_string(), "rust".to_string()]);
    }

    #[test]
    fn test_visible_repos() {
        let repos = vec![
            repo("a"),
            GithubRepo {
                fork: true,
                ..repo("b")
            },
            GithubRepo {
                archived: true,
                ..repo("c")
            },
        ];
        let names: Vec<String> = visible_repos(repos).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_username() {
        let service = setup(GithubConfig::default()).await;
        assert!(matches!(
            service.list_repos().await,
            Err(GithubServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_import() {
        let api_base = fake_github().await;
        let service = setup(GithubConfig {
            username: Some("jane".into()),
            token: None,
            api_base,
        })
        .await;

        let repos = service.list_repos().await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "folio");

        let project = service.import("FOLIO").await.unwrap();
        assert_eq!(project.slug, "folio");
        assert_eq!(project.status, ContentStatus::Draft);
        assert_eq!(project.live_url.as_deref(), Some("https://jane.example"));
        let tag_names: Vec<&str> = project.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tag_names.len(), 2);
        assert!(tag_names.contains(&"cms"));

        assert!(matches!(
            service.import("folio").await,
            Err(GithubServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.import("forked").await,
            Err(GithubServiceError::NotFound(_))
        ));
    }
}
