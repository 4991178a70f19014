//! Outgoing email
//!
//! Messages are rendered from tera templates compiled into the binary, each
//! template having a `.subject`, a `.txt` and an `.html` part. Delivery goes
//! through SMTP (lettre) or, with the `log` provider, to the log and an
//! in-memory outbox.

use anyhow::{anyhow, Context, Result};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tera::Tera;
use tokio::sync::RwLock;

use crate::config::{EmailConfig, EmailProvider};

/// Messages the `log` provider keeps; older ones are dropped
pub const OUTBOX_CAPACITY: usize = 100;

pub mod templates {
    pub const CONTACT_NOTIFICATION: &str = "contact_notification";
    pub const SUBSCRIPTION_CONFIRM: &str = "subscription_confirm";
    pub const SUBSCRIPTION_WELCOME: &str = "subscription_welcome";
}

const TEMPLATE_SOURCES: &[(&str, &str)] = &[
    (
        "contact_notification.subject",
        "New inquiry from {{ name }}{% if subject %}: {{ subject }}{% endif %}",
    ),
    (
        "contact_notification.txt",
        "{{ name }} <{{ email }}> wrote via {{ site_url }}:\n\n{{ message }}\n",
    ),
    (
        "contact_notification.html",
        "<p><strong>{{ name }}</strong> &lt;{{ email }}&gt; wrote via \
         <a href=\"{{ site_url }}\">{{ site_url }}</a>:</p>\n\
         <blockquote>{{ message | escape | linebreaksbr | safe }}</blockquote>\n",
    ),
    (
        "subscription_confirm.subject",
        "Please confirm your subscription",
    ),
    (
        "subscription_confirm.txt",
        "Hi{% if name %} {{ name }}{% endif %},\n\nConfirm your subscription by opening:\n\
         {{ confirm_url }}\n\nIf you did not ask for this, ignore this message.\n",
    ),
    (
        "subscription_confirm.html",
        "<p>Hi{% if name %} {{ name }}{% endif %},</p>\n\
         <p><a href=\"{{ confirm_url }}\">Confirm your subscription</a></p>\n\
         <p>If you did not ask for this, ignore this message.</p>\n",
    ),
    ("subscription_welcome.subject", "You're subscribed"),
    (
        "subscription_welcome.txt",
        "Thanks for subscribing{% if name %}, {{ name }}{% endif %}!\n\n\
         Unsubscribe at any time: {{ unsubscribe_url }}\n",
    ),
    (
        "subscription_welcome.html",
        "<p>Thanks for subscribing{% if name %}, {{ name }}{% endif %}!</p>\n\
         <p><a href=\"{{ unsubscribe_url }}\">Unsubscribe</a> at any time.</p>\n",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// A message accepted by the `log` provider
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub template: String,
    pub email: RenderedEmail,
}

pub struct EmailService {
    config: EmailConfig,
    templates: Tera,
    outbox: Arc<RwLock<VecDeque<OutgoingEmail>>>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let mut templates = Tera::default();
        templates
            .add_raw_templates(TEMPLATE_SOURCES.iter().copied())
            .context("Failed to compile email templates")?;

        Ok(Self {
            config,
            templates,
            outbox: Arc::new(RwLock::new(VecDeque::with_capacity(OUTBOX_CAPACITY))),
        })
    }

    pub fn admin_address(&self) -> Option<&str> {
        self.config.admin_address.as_deref().filter(|a| !a.is_empty())
    }

    pub fn render(&self, template: &str, context: &tera::Context) -> Result<RenderedEmail> {
        let part = |suffix: &str| {
            let name = format!("{}.{}", template, suffix);
            self.templates
                .render(&name, context)
                .with_context(|| format!("Failed to render email template {}", name))
        };

        Ok(RenderedEmail {
            subject: part("subject")?.trim().to_string(),
            text: part("txt")?,
            html: part("html")?,
        })
    }

    /// Render `template` and deliver it to `to`
    pub async fn send(&self, to: &str, template: &str, context: &tera::Context) -> Result<()> {
        let recipient: Address = to
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address {}: {}", to, e))?;
        let email = self.render(template, context)?;

        match self.config.provider {
            EmailProvider::Log => {
                tracing::info!(to = %recipient, template, subject = %email.subject, "Email (log provider)");
                let mut outbox = self.outbox.write().await;
                if outbox.len() == OUTBOX_CAPACITY {
                    outbox.pop_front();
                }
                outbox.push_back(OutgoingEmail {
                    to: recipient.to_string(),
                    template: template.to_string(),
                    email,
                });
                Ok(())
            }
            EmailProvider::Smtp => self.send_smtp(recipient, email).await,
        }
    }

    async fn send_smtp(&self, to: Address, email: RenderedEmail) -> Result<()> {
        let host = self
            .config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("SMTP provider selected but email.smtp_host is not set"))?;

        let from_address: Address = self
            .config
            .from_address
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;
        let from = Mailbox::new(Some(self.config.from_name.clone()), from_address);

        let message = Message::builder()
            .from(from)
            .to(Mailbox::new(None, to))
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let builder = if self.config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        builder
            .build()
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }

    /// The most recent messages accepted by the `log` provider, oldest first
    pub async fn outbox(&self) -> Vec<OutgoingEmail> {
        self.outbox.read().await.iter().cloned().collect()
    }
}
