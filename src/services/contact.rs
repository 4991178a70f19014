//! Contact form handling

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::repositories::InquiryRepository;
use crate::models::{ContactInput, ContactInquiry, EventType, InquiryStatus, ListParams, PagedResult};
use crate::services::analytics::{AnalyticsService, ClientInfo};
use crate::services::email::{templates, EmailService};
use crate::services::validation;

const MAX_NAME_LEN: usize = 100;
const MAX_SUBJECT_LEN: usize = 200;
const MIN_MESSAGE_LEN: usize = 10;
const MAX_MESSAGE_LEN: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ContactServiceError {
    #[error("Inquiry not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ContactService {
    repo: Arc<dyn InquiryRepository>,
    analytics: Arc<AnalyticsService>,
    email: Arc<EmailService>,
    public_url: String,
}

impl ContactService {
    pub fn new(
        repo: Arc<dyn InquiryRepository>,
        analytics: Arc<AnalyticsService>,
        email: Arc<EmailService>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            analytics,
            email,
            public_url: public_url.into(),
        }
    }

    /// Store a contact form submission.
    ///
    /// A filled honeypot stores the inquiry as spam and skips the
    /// notification; the caller sees the same success either way.
    pub async fn submit(
        &self,
        input: ContactInput,
        client: &ClientInfo,
    ) -> Result<ContactInquiry, ContactServiceError> {
        let is_spam = input
            .website
            .as_deref()
            .is_some_and(|w| !w.trim().is_empty());
        // Honeypot hits skip validation so bots never see a rejection.
        let input = if is_spam { clip(input) } else { validate(input)? };

        let now = Utc::now();
        let inquiry = ContactInquiry {
            id: 0,
            name: input.name,
            email: input.email,
            subject: input.subject,
            message: input.message,
            status: if is_spam {
                InquiryStatus::Spam
            } else {
                InquiryStatus::New
            },
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now,
            updated_at: now,
        };
        let created = self
            .repo
            .create(&inquiry)
            .await
            .context("Failed to store inquiry")?;

        if is_spam {
            tracing::warn!(inquiry_id = created.id, "Contact honeypot triggered");
            return Ok(created);
        }

        tracing::info!(inquiry_id = created.id, "Contact inquiry received");
        self.analytics
            .record_quietly(
                EventType::ContactSubmit,
                "/contact",
                client,
                Some(json!({ "inquiry_id": created.id })),
            )
            .await;
        self.notify_admin(&created).await;
        Ok(created)
    }

    async fn notify_admin(&self, inquiry: &ContactInquiry) {
        let Some(admin) = self.email.admin_address() else {
            return;
        };
        let mut ctx = tera::Context::new();
        ctx.insert("name", &inquiry.name);
        ctx.insert("email", &inquiry.email);
        ctx.insert("subject", &inquiry.subject);
        ctx.insert("message", &inquiry.message);
        ctx.insert("site_url", &self.public_url);

        if let Err(e) = self
            .email
            .send(admin, templates::CONTACT_NOTIFICATION, &ctx)
            .await
        {
            tracing::error!(inquiry_id = inquiry.id, error = %e, "Failed to send contact notification");
        }
    }

    pub async fn list(
        &self,
        status: Option<InquiryStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<ContactInquiry>, ContactServiceError> {
        let (items, total) = self
            .repo
            .list(status, params)
            .await
            .context("Failed to list inquiries")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Fetch an inquiry; opening a new one marks it read
    pub async fn get(&self, id: i64) -> Result<ContactInquiry, ContactServiceError> {
        let mut inquiry = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get inquiry")?
            .ok_or(ContactServiceError::NotFound(id))?;

        if inquiry.status == InquiryStatus::New {
            self.repo
                .update_status(id, InquiryStatus::Read)
                .await
                .context("Failed to mark inquiry read")?;
            inquiry.status = InquiryStatus::Read;
        }
        Ok(inquiry)
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: InquiryStatus,
    ) -> Result<(), ContactServiceError> {
        let updated = self
            .repo
            .update_status(id, status)
            .await
            .context("Failed to update inquiry")?;
        if !updated {
            return Err(ContactServiceError::NotFound(id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContactServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete inquiry")?;
        if !deleted {
            return Err(ContactServiceError::NotFound(id));
        }
        Ok(())
    }

    /// Count per status, every status present
    pub async fn counts_by_status(&self) -> Result<BTreeMap<String, i64>, ContactServiceError> {
        let stored = self
            .repo
            .counts_by_status()
            .await
            .context("Failed to count inquiries")?;
        Ok(InquiryStatus::ALL
            .iter()
            .map(|s| (s.to_string(), stored.get(s.as_str()).copied().unwrap_or(0)))
            .collect())
    }
}

fn validate(input: ContactInput) -> Result<ContactInput, ContactServiceError> {
    let invalid = ContactServiceError::ValidationError;

    let name = input.name.trim().to_string();
    validation::check_length("Name", &name, 1, MAX_NAME_LEN).map_err(invalid)?;

    let email = validation::normalize_email(&input.email);
    if !validation::is_valid_email(&email) {
        return Err(invalid("A valid email address is required".to_string()));
    }

    let subject = input.subject.trim().to_string();
    validation::check_length("Subject", &subject, 0, MAX_SUBJECT_LEN).map_err(invalid)?;

    let message = input.message.trim().to_string();
    validation::check_length("Message", &message, MIN_MESSAGE_LEN, MAX_MESSAGE_LEN)
        .map_err(invalid)?;

    Ok(ContactInput {
        name,
        email,
        subject,
        message,
        website: input.website,
    })
}

/// Trim and cut every field to its column limit without rejecting anything
fn clip(input: ContactInput) -> ContactInput {
    let cut = |value: &str, max: usize| value.trim().chars().take(max).collect::<String>();
    ContactInput {
        name: cut(&input.name, MAX_NAME_LEN),
        email: cut(&input.email, MAX_NAME_LEN * 2),
        subject: cut(&input.subject, MAX_SUBJECT_LEN),
        message: cut(&input.message, MAX_MESSAGE_LEN),
        website: input.website,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, EmailConfig};
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxInquiryRepository};

    struct Fixture {
        service: ContactService,
        analytics: Arc<AnalyticsService>,
        email: Arc<EmailService>,
    }

    async fn setup(admin: Option<&str>) -> Fixture {
        let pool = migrated_pool().await;
        let analytics = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            AnalyticsConfig::default(),
        ));
        let email = Arc::new(
            EmailService::new(EmailConfig {
                admin_address: admin.map(str::to_string),
                ..Default::default()
            })
            .unwrap(),
        );
        let service = ContactService::new(
            SqlxInquiryRepository::boxed(pool),
            analytics.clone(),
            email.clone(),
            "https://jane.example",
        );
        Fixture {
            service,
            analytics,
            email,
        }
    }

    fn input() -> ContactInput {
        ContactInput {
            name: " Sam ".into(),
            email: "Sam@Example.com".into(),
            subject: "Hello".into(),
            message: "I would like to work with you.".into(),
            website: None,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo::new(Some("203.0.113.9".into()), Some("Firefox".into()))
    }

    #[tokio::test]
    async fn test_submit_stores_notifies_and_tracks() {
        let f = setup(Some("owner@jane.example")).await;
        let inquiry = f.service.submit(input(), &client()).await.unwrap();

        assert_eq!(inquiry.name, "Sam");
        assert_eq!(inquiry.email, "sam@example.com");
        assert_eq!(inquiry.status, InquiryStatus::New);
        assert_eq!(inquiry.ip_address.as_deref(), Some("203.0.113.9"));

        let outbox = f.email.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "owner@jane.example");
        assert!(outbox[0].email.text.contains("I would like to work with you."));

        let events = f.analytics.recent(Some(EventType::ContactSubmit), 10).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_honeypot_is_stored_as_spam_silently() {
        let f = setup(Some("owner@jane.example")).await;
        let spam = ContactInput {
            website: Some("http://spam.example".into()),
            ..input()
        };
        let inquiry = f.service.submit(spam, &client()).await.unwrap();

        assert_eq!(inquiry.status, InquiryStatus::Spam);
        assert!(f.email.outbox().await.is_empty());
        assert!(f.analytics.recent(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_honeypot_skips_validation() {
        let f = setup(Some("owner@jane.example")).await;
        let spam = ContactInput {
            name: String::new(),
            email: "not-an-address".into(),
            message: "x".repeat(MAX_MESSAGE_LEN + 100),
            website: Some("http://spam.example".into()),
            ..input()
        };
        let inquiry = f.service.submit(spam, &client()).await.unwrap();

        assert_eq!(inquiry.status, InquiryStatus::Spam);
        assert_eq!(inquiry.message.chars().count(), MAX_MESSAGE_LEN);
        assert!(f.email.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_admin_address_skips_email() {
        let f = setup(None).await;
        f.service.submit(input(), &client()).await.unwrap();
        assert!(f.email.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation() {
        let f = setup(None).await;
        let cases = [
            ContactInput {
                name: "  ".into(),
                ..input()
            },
            ContactInput {
                email: "not-an-email".into(),
                ..input()
            },
            ContactInput {
                message: "too short".into(),
                ..input()
            },
            ContactInput {
                message: "x".repeat(5001),
                ..input()
            },
            ContactInput {
                subject: "s".repeat(201),
                ..input()
            },
        ];
        for case in cases {
            assert!(matches!(
                f.service.submit(case, &client()).await,
                Err(ContactServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_admin_workflow() {
        let f = setup(None).await;
        let inquiry = f.service.submit(input(), &client()).await.unwrap();

        let counts = f.service.counts_by_status().await.unwrap();
        assert_eq!(counts.get("new"), Some(&1));
        assert_eq!(counts.get("spam"), Some(&0));

        assert_eq!(f.service.get(inquiry.id).await.unwrap().status, InquiryStatus::Read);
        f.service
            .update_status(inquiry.id, InquiryStatus::Replied)
            .await
            .unwrap();
        let replied = f
            .service
            .list(Some(InquiryStatus::Replied), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(replied.total, 1);

        f.service.delete(inquiry.id).await.unwrap();
        assert!(matches!(
            f.service.get(inquiry.id).await,
            Err(ContactServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.update_status(inquiry.id, InquiryStatus::Read).await,
            Err(ContactServiceError::NotFound(_))
        ));
    }
}
