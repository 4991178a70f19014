//! Contact inquiry repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::decode_enum;
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ContactInquiry, InquiryStatus, ListParams};

impl_from_row!(ContactInquiry, |row| {
    Ok(ContactInquiry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        status: decode_enum::<InquiryStatus>("status", row.try_get("status")?)?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
});

const INQUIRY_COLUMNS: &str = "id, name, email, subject, message, status, ip_address, \
    user_agent, created_at, updated_at";

#[async_trait]
pub trait InquiryRepository: Send + Sync {
    async fn create(&self, inquiry: &ContactInquiry) -> Result<ContactInquiry>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactInquiry>>;

    /// Newest first, optionally restricted to one status
    async fn list(
        &self,
        status: Option<InquiryStatus>,
        params: &ListParams,
    ) -> Result<(Vec<ContactInquiry>, i64)>;

    async fn update_status(&self, id: i64, status: InquiryStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Count per status; statuses without rows are absent
    async fn counts_by_status(&self) -> Result<BTreeMap<String, i64>>;
}

pub struct SqlxInquiryRepository {
    pool: DynDatabasePool,
}

impl SqlxInquiryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn InquiryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl InquiryRepository for SqlxInquiryRepository {
    async fn create(&self, inquiry: &ContactInquiry) -> Result<ContactInquiry> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO contact_inquiries (name, email, subject, message, status, ip_address,
                    user_agent, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&inquiry.name)
            .bind(&inquiry.email)
            .bind(&inquiry.subject)
            .bind(&inquiry.message)
            .bind(inquiry.status.as_str())
            .bind(&inquiry.ip_address)
            .bind(&inquiry.user_agent)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create contact inquiry")?
            .insert_id()
        });

        Ok(ContactInquiry {
            id,
            created_at: now,
            updated_at: now,
            ..inquiry.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactInquiry>> {
        let sql = format!("SELECT {} FROM contact_inquiries WHERE id = ?", INQUIRY_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, ContactInquiry>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get contact inquiry")
        })
    }

    async fn list(
        &self,
        status: Option<InquiryStatus>,
        params: &ListParams,
    ) -> Result<(Vec<ContactInquiry>, i64)> {
        let status = status.map(|s| s.as_str());
        let sql = format!(
            "SELECT {} FROM contact_inquiries WHERE (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            INQUIRY_COLUMNS
        );

        on_pool!(self.pool, |conn| {
            let items = sqlx::query_as::<_, ContactInquiry>(&sql)
                .bind(status)
                .bind(status)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list contact inquiries")?;
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM contact_inquiries WHERE (? IS NULL OR status = ?)",
            )
            .bind(status)
            .bind(status)
            .fetch_one(conn)
            .await
            .context("Failed to count contact inquiries")?;
            Ok((items, total))
        })
    }

    async fn update_status(&self, id: i64, status: InquiryStatus) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE contact_inquiries SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update inquiry status")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM contact_inquiries WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete contact inquiry")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn counts_by_status(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM contact_inquiries GROUP BY status",
            )
            .fetch_all(conn)
            .await
            .context("Failed to count inquiries by status")?
        });
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    fn sample(name: &str, status: InquiryStatus) -> ContactInquiry {
        let now = Utc::now();
        ContactInquiry {
            id: 0,
            name: name.to_string(),
            email: format!("{}@example.com", name),
            subject: "Hello".to_string(),
            message: "I would like to talk about a project.".to_string(),
            status,
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_and_counts() {
        let repo = SqlxInquiryRepository::new(migrated_pool().await);
        repo.create(&sample("a", InquiryStatus::New)).await.unwrap();
        repo.create(&sample("b", InquiryStatus::New)).await.unwrap();
        repo.create(&sample("c", InquiryStatus::Spam)).await.unwrap();

        let (items, total) = repo
            .list(Some(InquiryStatus::New), &ListParams::new(1, 1))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(total, 2);

        let counts = repo.counts_by_status().await.unwrap();
        assert_eq!(counts.get("new"), Some(&2));
        assert_eq!(counts.get("spam"), Some(&1));
        assert!(counts.get("read").is_none());
    }

    #[tokio::test]
    async fn test_update_status_and_delete() {
        let repo = SqlxInquiryRepository::new(migrated_pool().await);
        let inquiry = repo.create(&sample("a", InquiryStatus::New)).await.unwrap();

        assert!(repo.update_status(inquiry.id, InquiryStatus::Replied).await.unwrap());
        let stored = repo.get_by_id(inquiry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InquiryStatus::Replied);

        assert!(repo.delete(inquiry.id).await.unwrap());
        assert!(!repo.update_status(inquiry.id, InquiryStatus::Read).await.unwrap());
    }
}
