//! Newsletter subscriptions with double opt-in

use anyhow::{anyhow, Context};
use chrono::Utc;
use data_encoding::HEXLOWER;
use std::sync::Arc;

use crate::db::repositories::SubscriberRepository;
use crate::models::{EventType, ListParams, PagedResult, Subscriber, SubscriberStatus};
use crate::services::analytics::{AnalyticsService, ClientInfo};
use crate::services::email::{templates, EmailService};
use crate::services::validation;

const TOKEN_BYTES: usize = 32;
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SubscriberServiceError {
    #[error("Subscriber not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SubscriberService {
    repo: Arc<dyn SubscriberRepository>,
    analytics: Arc<AnalyticsService>,
    email: Arc<EmailService>,
    public_url: String,
}

impl SubscriberService {
    pub fn new(
        repo: Arc<dyn SubscriberRepository>,
        analytics: Arc<AnalyticsService>,
        email: Arc<EmailService>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            analytics,
            email,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start (or restart) a subscription and mail the confirmation link.
    ///
    /// An active subscriber is returned unchanged and gets no mail.
    pub async fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
        client: &ClientInfo,
    ) -> Result<Subscriber, SubscriberServiceError> {
        let email = validation::normalize_email(email);
        if !validation::is_valid_email(&email) {
            return Err(SubscriberServiceError::ValidationError(
                "A valid email address is required".to_string(),
            ));
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        if let Some(n) = &name {
            validation::check_length("Name", n, 1, MAX_NAME_LEN)
                .map_err(SubscriberServiceError::ValidationError)?;
        }

        let existing = self
            .repo
            .get_by_email(&email)
            .await
            .context("Failed to look up subscriber")?;

        let subscriber = match existing {
            Some(sub) if sub.status == SubscriberStatus::Active => return Ok(sub),
            Some(sub) if sub.status == SubscriberStatus::Pending => {
                let sub = Subscriber {
                    name: name.or(sub.name),
                    ..sub
                };
                self.repo.update(&sub).await.context("Failed to update subscriber")?;
                sub
            }
            Some(sub) => {
                let sub = Subscriber {
                    name: name.or(sub.name),
                    status: SubscriberStatus::Pending,
                    token: new_token()?,
                    unsubscribed_at: None,
                    ..sub
                };
                self.repo.update(&sub).await.context("Failed to update subscriber")?;
                sub
            }
            None => {
                let sub = Subscriber {
                    id: 0,
                    email,
                    name,
                    status: SubscriberStatus::Pending,
                    token: new_token()?,
                    created_at: Utc::now(),
                    confirmed_at: None,
                    unsubscribed_at: None,
                };
                self.repo.create(&sub).await.context("Failed to create subscriber")?
            }
        };

        self.analytics
            .record_quietly(EventType::Subscribe, "/subscribe", client, None)
            .await;

        let mut ctx = tera::Context::new();
        ctx.insert("name", &subscriber.name.clone().unwrap_or_default());
        ctx.insert("confirm_url", &self.link("confirm", &subscriber.token));
        self.email
            .send(&subscriber.email, templates::SUBSCRIPTION_CONFIRM, &ctx)
            .await
            .context("Failed to send confirmation email")?;

        tracing::info!(subscriber_id = subscriber.id, "Subscription pending confirmation");
        Ok(subscriber)
    }

    /// Activate the subscription owning `token` and send the welcome mail
    pub async fn confirm(&self, token: &str) -> Result<Subscriber, SubscriberServiceError> {
        let mut subscriber = self.by_token(token).await?;
        if subscriber.status == SubscriberStatus::Active {
            return Ok(subscriber);
        }

        subscriber.status = SubscriberStatus::Active;
        subscriber.confirmed_at = Some(Utc::now());
        subscriber.unsubscribed_at = None;
        self.repo
            .update(&subscriber)
            .await
            .context("Failed to confirm subscriber")?;

        let mut ctx = tera::Context::new();
        ctx.insert("name", &subscriber.name.clone().unwrap_or_default());
        ctx.insert("unsubscribe_url", &self.link("unsubscribe", &subscriber.token));
        if let Err(e) = self
            .email
            .send(&subscriber.email, templates::SUBSCRIPTION_WELCOME, &ctx)
            .await
        {
            tracing::warn!(subscriber_id = subscriber.id, error = %e, "Failed to send welcome email");
        }

        tracing::info!(subscriber_id = subscriber.id, "Subscription confirmed");
        Ok(subscriber)
    }

    pub async fn unsubscribe(&self, token: &str) -> Result<Subscriber, SubscriberServiceError> {
        let mut subscriber = self.by_token(token).await?;
        if subscriber.status != SubscriberStatus::Unsubscribed {
            subscriber.status = SubscriberStatus::Unsubscribed;
            subscriber.unsubscribed_at = Some(Utc::now());
            self.repo
                .update(&subscriber)
                .await
                .context("Failed to unsubscribe")?;
            tracing::info!(subscriber_id = subscriber.id, "Unsubscribed");
        }
        Ok(subscriber)
    }

    pub async fn list(
        &self,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Subscriber>, SubscriberServiceError> {
        let (items, total) = self
            .repo
            .list(status, params)
            .await
            .context("Failed to list subscribers")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn delete(&self, id: i64) -> Result<(), SubscriberServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete subscriber")?;
        if !deleted {
            return Err(SubscriberServiceError::NotFound);
        }
        Ok(())
    }

    pub async fn count_active(&self) -> Result<i64, SubscriberServiceError> {
        let count = self
            .repo
            .count(Some(SubscriberStatus::Active))
            .await
            .context("Failed to count subscribers")?;
        Ok(count)
    }

    /// Every subscriber as CSV, oldest first
    pub async fn export_csv(&self) -> Result<String, SubscriberServiceError> {
        let subscribers = self
            .repo
            .list_all()
            .await
            .context("Failed to load subscribers")?;

        let mut csv = String::from("email,name,status,created_at,confirmed_at,unsubscribed_at\n");
        for s in &subscribers {
            let row = [
                csv_field(&s.email),
                csv_field(s.name.as_deref().unwrap_or("")),
                s.status.to_string(),
                s.created_at.to_rfc3339(),
                s.confirmed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                s.unsubscribed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ];
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        Ok(csv)
    }

    async fn by_token(&self, token: &str) -> Result<Subscriber, SubscriberServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SubscriberServiceError::NotFound);
        }
        self.repo
            .get_by_token(token)
            .await
            .context("Failed to look up subscription token")?
            .ok_or(SubscriberServiceError::NotFound)
    }

    fn link(&self, action: &str, token: &str) -> String {
        format!(
            "{}/newsletter/{}?token={}",
            self.public_url,
            action,
            urlencoding::encode(token)
        )
    }
}

fn new_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| anyhow!("Failed to generate token: {}", e))?;
    Ok(HEXLOWER.encode(&bytes))
}

/// Quote a CSV field when needed; a leading formula character is
/// neutralised for spreadsheet imports
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{}", value)
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, EmailConfig};
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxSubscriberRepository};

    struct Fixture {
        service: SubscriberService,
        email: Arc<EmailService>,
    }

    async fn setup() -> Fixture {
        let pool = migrated_pool().await;
        let analytics = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            AnalyticsConfig::default(),
        ));
        let email = Arc::new(EmailService::new(EmailConfig::default()).unwrap());
        let service = SubscriberService::new(
            SqlxSubscriberRepository::boxed(pool),
            analytics,
            email.clone(),
            "https://jane.example/",
        );
        Fixture { service, email }
    }

    fn token_from(url_text: &str) -> String {
        let start = url_text.find("token=").unwrap() + "token=".len();
        url_text[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect()
    }

    #[tokio::test]
    async fn test_double_opt_in() {
        let f = setup().await;
        let client = ClientInfo::default();
        let sub = f
            .service
            .subscribe(" Reader@Example.com ", Some("Reader"), &client)
            .await
            .unwrap();
        assert_eq!(sub.email, "reader@example.com");
        assert_eq!(sub.status, SubscriberStatus::Pending);
        assert_eq!(f.service.count_active().await.unwrap(), 0);

        let outbox = f.email.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert!(outbox[0]
            .email
            .text
            .contains("https://jane.example/newsletter/confirm?token="));
        let token = token_from(&outbox[0].email.text);
        assert_eq!(token, sub.token);

        let active = f.service.confirm(&token).await.unwrap();
        assert_eq!(active.status, SubscriberStatus::Active);
        assert!(active.confirmed_at.is_some());
        assert_eq!(f.service.count_active().await.unwrap(), 1);
        assert_eq!(f.email.outbox().await.len(), 2);

        let again = f.service.subscribe("reader@example.com", None, &client).await.unwrap();
        assert_eq!(again.status, SubscriberStatus::Active);
        assert_eq!(f.email.outbox().await.len(), 2);
    }

    #[tokio::test]
    async fn test_pending_resubscribe_resends_same_token() {
        let f = setup().await;
        let client = ClientInfo::default();
        let first = f.service.subscribe("a@example.com", None, &client).await.unwrap();
        let second = f.service.subscribe("a@example.com", Some("A"), &client).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.token, second.token);
        assert_eq!(second.name.as_deref(), Some("A"));
        assert_eq!(f.email.outbox().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_then_resubscribe_gets_new_token() {
        let f = setup().await;
        let client = ClientInfo::default();
        let sub = f.service.subscribe("a@example.com", None, &client).await.unwrap();
        f.service.confirm(&sub.token).await.unwrap();

        let gone = f.service.unsubscribe(&sub.token).await.unwrap();
        assert_eq!(gone.status, SubscriberStatus::Unsubscribed);
        assert!(gone.unsubscribed_at.is_some());

        let back = f.service.subscribe("a@example.com", None, &client).await.unwrap();
        assert_eq!(back.status, SubscriberStatus::Pending);
        assert_ne!(back.token, sub.token);
        assert!(back.unsubscribed_at.is_none());
        assert!(matches!(
            f.service.confirm(&sub.token).await,
            Err(SubscriberServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_and_invalid_email() {
        let f = setup().await;
        assert!(matches!(
            f.service.confirm("nope").await,
            Err(SubscriberServiceError::NotFound)
        ));
        assert!(matches!(
            f.service.unsubscribe("").await,
            Err(SubscriberServiceError::NotFound)
        ));
        assert!(matches!(
            f.service.subscribe("not-an-email", None, &ClientInfo::default()).await,
            Err(SubscriberServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_export_and_delete() {
        let f = setup().await;
        let client = ClientInfo::default();
        let sub = f
            .service
            .subscribe("a@example.com", Some("Doe, \"Jane\""), &client)
            .await
            .unwrap();
        f.service.subscribe("b@example.com", Some("=HYPERLINK()"), &client).await.unwrap();

        let csv = f.service.export_csv().await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("email,name,status"));
        assert!(lines[1].starts_with("a@example.com,\"Doe, \"\"Jane\"\"\",pending,"));
        assert!(lines[2].starts_with("b@example.com,'=HYPERLINK(),pending,"));

        f.service.delete(sub.id).await.unwrap();
        assert_eq!(f.service.list(None, &ListParams::default()).await.unwrap().total, 1);
        assert!(matches!(
            f.service.delete(sub.id).await,
            Err(SubscriberServiceError::NotFound)
        ));
    }

    #[test]
    fn test_csv_field() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("-1"), "'-1");
    }
}
