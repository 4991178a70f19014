//! User service
//!
//! Dashboard accounts and login sessions:
//! - one-time setup of the first admin
//! - admin-managed editor/admin accounts
//! - login with per-username failure throttling, logout
//! - session validation (expired sessions are deleted on sight)
//! - password changes

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, User, UserRole};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::validation::{check_length, is_valid_email, normalize_email};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in days
const DEFAULT_SESSION_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or session
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    /// `setup_admin` after the first account exists
    #[error("Setup has already been completed")]
    SetupCompleted,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
    login_limiter: LoginRateLimiter,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_days(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_days,
            login_limiter: LoginRateLimiter::new(),
        }
    }

    pub fn login_limiter(&self) -> &LoginRateLimiter {
        &self.login_limiter
    }

    /// True while no account exists
    pub async fn setup_required(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Create the first account as admin. Refused once any user exists.
    pub async fn setup_admin(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        if !self.setup_required().await? {
            return Err(UserServiceError::SetupCompleted);
        }
        self.create_user(input, UserRole::Admin).await
    }

    pub async fn create_user(
        &self,
        input: CreateUserInput,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = normalize_email(&input.email);
        validate_username(&username)?;
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }
        check_password_policy(&input.password).map_err(UserServiceError::ValidationError)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(username, email, password_hash, role);
        user.display_name = input
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, username = %created.username, role = %created.role, "User created");
        Ok(created)
    }

    /// Verify credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let login = input.username_or_email.trim();
        if self.login_limiter.is_limited(login).await {
            tracing::warn!(login, "Login throttled after repeated failures");
            return Err(UserServiceError::TooManyAttempts);
        }

        let user = match self.find_user_by_username_or_email(login).await? {
            Some(user) => user,
            None => {
                self.login_limiter.record_failure(login).await;
                return Err(invalid_credentials());
            }
        };

        if !verify_password(&input.password, &user.password_hash)? {
            self.login_limiter.record_failure(login).await;
            tracing::warn!(user_id = user.id, "Failed login");
            return Err(invalid_credentials());
        }

        self.login_limiter.clear(login).await;
        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The session's user, or `None` for unknown or expired tokens
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if !verify_password(current, &user.password_hash)? {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_policy(new_password).map_err(UserServiceError::ValidationError)?;

        let updated = User {
            password_hash: hash_password(new_password)?,
            ..user.clone()
        };
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to update password")?;
        tracing::info!(user_id = user.id, "Password changed");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        let users = self.user_repo.list().await.context("Failed to list users")?;
        Ok(users)
    }

    /// Delete another account; sessions go with it
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), UserServiceError> {
        if actor.id == id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }
        let deleted = self
            .user_repo
            .delete(id)
            .await
            .context("Failed to delete user")?;
        if !deleted {
            return Err(UserServiceError::NotFound);
        }
        tracing::info!(user_id = id, actor = actor.id, "User deleted");
        Ok(())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(&normalize_email(username_or_email))
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(
            Uuid::new_v4().simple().to_string(),
            user_id,
            Duration::days(self.session_days),
        );

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    check_length("Username", username, 3, 50).map_err(UserServiceError::ValidationError)?;
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}
