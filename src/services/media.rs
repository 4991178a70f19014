//! Media library
//!
//! Uploads are checked against the configured types and size, scanned,
//! written under the upload directory as `<uuid>.<ext>` and recorded in
//! the `media` table.

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::repositories::MediaRepository;
use crate::models::{EventType, ListParams, Media, PagedResult};
use crate::services::analytics::{AnalyticsService, ClientInfo};
use crate::services::upload_scanner::{Finding, ScanReport, UploadScanner};

const MAX_ORIGINAL_NAME_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    #[error("Media not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Upload rejected")]
    Rejected(Vec<Finding>),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A file as received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    analytics: Arc<AnalyticsService>,
    scanner: UploadScanner,
    config: UploadConfig,
}

impl MediaService {
    pub fn new(
        repo: Arc<dyn MediaRepository>,
        analytics: Arc<AnalyticsService>,
        config: UploadConfig,
    ) -> Self {
        Self {
            repo,
            analytics,
            scanner: UploadScanner::new(),
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub async fn upload(
        &self,
        file: UploadedFile,
        uploaded_by: Option<i64>,
        client: &ClientInfo,
    ) -> Result<Media, MediaServiceError> {
        let content_type = file.content_type.trim().to_ascii_lowercase();
        if !self.config.is_type_allowed(&content_type) {
            return Err(MediaServiceError::ValidationError(format!(
                "File type {} is not allowed",
                content_type
            )));
        }
        let size = file.bytes.len() as u64;
        if size == 0 {
            return Err(MediaServiceError::ValidationError("File is empty".to_string()));
        }
        if size > self.config.max_file_size {
            return Err(MediaServiceError::TooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        if let ScanReport::Rejected(findings) =
            self.scanner.scan(&file.original_name, &content_type, &file.bytes)
        {
            let reasons: Vec<String> = findings.iter().map(ToString::to_string).collect();
            tracing::warn!(
                filename = %file.original_name,
                content_type = %content_type,
                findings = ?reasons,
                "Upload rejected by scanner"
            );
            self.analytics
                .record_quietly(
                    EventType::UploadRejected,
                    "/admin/media",
                    client,
                    Some(json!({
                        "filename": file.original_name,
                        "content_type": content_type,
                        "findings": reasons,
                    })),
                )
                .await;
            return Err(MediaServiceError::Rejected(findings));
        }

        fs::create_dir_all(&self.config.path)
            .await
            .context("Failed to create upload directory")?;
        let filename = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            UploadConfig::extension_for(&content_type)
        );
        let file_path = self.config.path.join(&filename);
        fs::write(&file_path, &file.bytes)
            .await
            .with_context(|| format!("Failed to write {}", file_path.display()))?;

        let media = Media {
            id: 0,
            url: format!("/uploads/{}", filename),
            filename,
            original_name: clean_original_name(&file.original_name),
            content_type,
            size: size as i64,
            uploaded_by,
            created_at: Utc::now(),
        };
        let created = match self.repo.create(&media).await {
            Ok(created) => created,
            Err(e) => {
                // Keep the directory in step with the table.
                let _ = fs::remove_file(&file_path).await;
                return Err(MediaServiceError::InternalError(e.context("Failed to record media")));
            }
        };

        tracing::info!(media_id = created.id, filename = %created.filename, size, "Media uploaded");
        Ok(created)
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Media>, MediaServiceError> {
        let (items, total) = self.repo.list(params).await.context("Failed to list media")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> Result<Media, MediaServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get media")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    /// Remove the row and the stored file. A file already gone is only logged.
    pub async fn delete(&self, id: i64) -> Result<(), MediaServiceError> {
        let media = self.get(id).await?;
        self.repo.delete(id).await.context("Failed to delete media")?;

        let path = self.config.path.join(&media.filename);
        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove media file");
        }
        tracing::info!(media_id = id, "Media deleted");
        Ok(())
    }
}

/// Display name only: directory parts and control characters removed
fn clean_original_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_ORIGINAL_NAME_LEN)
        .collect();
    if cleaned.trim().is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxMediaRepository};
    use tempfile::TempDir;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    struct Fixture {
        service: MediaService,
        analytics: Arc<AnalyticsService>,
        dir: TempDir,
    }

    async fn setup(max_file_size: u64) -> Fixture {
        let pool = migrated_pool().await;
        let dir = TempDir::new().unwrap();
        let analytics = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            AnalyticsConfig::default(),
        ));
        let config = UploadConfig {
            path: dir.path().join("uploads"),
            max_file_size,
            ..Default::default()
        };
        let service = MediaService::new(SqlxMediaRepository::boxed(pool), analytics.clone(), config);
        Fixture {
            service,
            analytics,
            dir,
        }
    }

    fn file(name: &str, content_type: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            original_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_row() {
        let f = setup(1024).await;
        let media = f
            .service
            .upload(file("logo.png", "image/png", PNG), None, &ClientInfo::default())
            .await
            .unwrap();

        assert!(media.filename.ends_with(".png"));
        assert_eq!(media.url, format!("/uploads/{}", media.filename));
        assert_eq!(media.original_name, "logo.png");
        assert_eq!(media.size, PNG.len() as i64);

        let stored = f.dir.path().join("uploads").join(&media.filename);
        assert_eq!(std::fs::read(&stored).unwrap(), PNG);
        assert_eq!(f.service.list(&ListParams::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_type_and_size_limits() {
        let f = setup(8).await;
        let client = ClientInfo::default();
        assert!(matches!(
            f.service.upload(file("a.txt", "text/plain", b"hello"), None, &client).await,
            Err(MediaServiceError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.upload(file("a.png", "image/png", PNG), None, &client).await,
            Err(MediaServiceError::TooLarge { size: 12, limit: 8 })
        ));
        assert!(matches!(
            f.service.upload(file("a.png", "image/png", b""), None, &client).await,
            Err(MediaServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_scanner_rejection_is_recorded() {
        let f = setup(1024).await;
        let result = f
            .service
            .upload(file("photo.php.png", "image/png", PNG), None, &ClientInfo::default())
            .await;
        match result {
            Err(MediaServiceError::Rejected(findings)) => {
                assert!(findings.contains(&Finding::DangerousExtension("php".into())));
            }
            other => panic!("expected rejection, got {:?}", other.map(|m| m.id)),
        }

        let events = f
            .analytics
            .recent(Some(EventType::UploadRejected), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(!f.dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let f = setup(1024).await;
        let media = f
            .service
            .upload(file("logo.png", "image/png", PNG), None, &ClientInfo::default())
            .await
            .unwrap();
        let stored = f.dir.path().join("uploads").join(&media.filename);

        f.service.delete(media.id).await.unwrap();
        assert!(!stored.exists());
        assert!(matches!(
            f.service.get(media.id).await,
            Err(MediaServiceError::NotFound(_))
        ));

        let again = f
            .service
            .upload(file("logo.png", "image/png", PNG), None, &ClientInfo::default())
            .await
            .unwrap();
        std::fs::remove_file(f.dir.path().join("uploads").join(&again.filename)).unwrap();
        f.service.delete(again.id).await.unwrap();
    }

    #[test]
    fn test_clean_original_name() {
        assert_eq!(clean_original_name("C:\\Users\\me\\cv.pdf"), "cv.pdf");
        assert_eq!(clean_original_name("a/b/logo.png"), "logo.png");
        assert_eq!(clean_original_name("bad\u{0}name.png"), "badname.png");
        assert_eq!(clean_original_name(""), "upload");
    }
}
