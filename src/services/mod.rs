//! Services layer - Business logic
//!
//! Services apply validation and business rules on top of the
//! repositories, keep the cache in step with writes, and report failures
//! through one `thiserror` enum each.

pub mod analytics;
pub mod blog;
pub mod category;
pub mod contact;
pub mod csrf;
pub mod dashboard;
pub mod email;
pub mod github;
pub mod markdown;
pub mod media;
pub mod password;
pub mod project;
pub mod rate_limiter;
pub mod settings;
pub mod slug;
pub mod subscriber;
pub mod tag;
pub mod theme;
pub mod upload_scanner;
pub mod user;
pub mod validation;

pub use analytics::{AnalyticsService, AnalyticsServiceError, ClientInfo};
pub use blog::{BlogService, BlogServiceError, FeedChannel};
pub use category::{CategoryService, CategoryServiceError};
pub use contact::{ContactService, ContactServiceError};
pub use csrf::CsrfStore;
pub use dashboard::{DashboardService, DashboardStats};
pub use email::EmailService;
pub use github::{GithubRepo, GithubService, GithubServiceError};
pub use markdown::MarkdownRenderer;
pub use media::{MediaService, MediaServiceError, UploadedFile};
pub use password::{hash_password, verify_password};
pub use project::{ProjectService, ProjectServiceError};
pub use rate_limiter::{FixedWindowLimiter, LoginRateLimiter, RateDecision};
pub use settings::{SettingsService, SettingsServiceError};
pub use slug::generate_slug;
pub use subscriber::{SubscriberService, SubscriberServiceError};
pub use tag::{TagService, TagServiceError};
pub use theme::{ThemeService, ThemeServiceError};
pub use upload_scanner::{ScanReport, UploadScanner};
pub use user::{LoginInput, UserService, UserServiceError};
