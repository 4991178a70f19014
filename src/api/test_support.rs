//! Router fixtures for handler tests

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::build_router;
use crate::api::middleware::{AppState, CSRF_HEADER};
use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::test_support::migrated_pool;
use crate::models::{CreateUserInput, UserRole};
use crate::services::user::LoginInput;

pub const PASSWORD: &str = "correct-horse-battery";

/// How a test request authenticates
#[derive(Debug, Clone)]
pub enum Auth {
    Bearer(String),
    Cookie { token: String, csrf: Option<String> },
}

#[derive(Debug, Clone)]
pub struct TestSession {
    pub token: String,
    pub csrf: String,
}

impl TestSession {
    pub fn bearer(&self) -> Auth {
        Auth::Bearer(self.token.clone())
    }

    pub fn cookie(&self) -> Auth {
        Auth::Cookie {
            token: self.token.clone(),
            csrf: Some(self.csrf.clone()),
        }
    }

    pub fn cookie_without_csrf(&self) -> Auth {
        Auth::Cookie {
            token: self.token.clone(),
            csrf: None,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upload.path = dir.path().join("uploads");
    configure(&mut config);

    let state = AppState::new(config, migrated_pool().await, Cache::memory()).unwrap();
    TestApp {
        router: build_router(state.clone()),
        state,
        dir,
    }
}

impl TestApp {
    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    pub fn request(method: Method, uri: &str, body: Option<&Value>, auth: Option<&Auth>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        match auth {
            Some(Auth::Bearer(token)) => {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            Some(Auth::Cookie { token, csrf }) => {
                builder = builder.header(header::COOKIE, format!("session={}", token));
                if let Some(csrf) = csrf {
                    builder = builder.header(CSRF_HEADER, csrf);
                }
            }
            None => {}
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// Send a JSON request; an empty body reads as `Value::Null`
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        auth: Option<&Auth>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self
            .raw(Self::request(method, uri, body.as_ref(), auth))
            .await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, auth: Option<&Auth>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, auth).await
    }

    /// Create a user directly and open a session with a CSRF token
    pub async fn session(&self, username: &str, role: UserRole) -> TestSession {
        let users = &self.state.user_service;
        users
            .create_user(
                CreateUserInput {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    password: PASSWORD.to_string(),
                    display_name: None,
                },
                role,
            )
            .await
            .unwrap();
        let (session, _) = users.login(LoginInput::new(username, PASSWORD)).await.unwrap();
        let csrf = self.state.csrf.issue(&session.id).await.unwrap();
        TestSession {
            token: session.id,
            csrf,
        }
    }

    pub async fn admin(&self) -> TestSession {
        self.session("admin", UserRole::Admin).await
    }

    pub async fn editor(&self) -> TestSession {
        self.session("editor", UserRole::Editor).await
    }
}
