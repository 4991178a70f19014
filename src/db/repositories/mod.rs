//! Database repositories
//!
//! One repository per entity. Each exposes an async trait plus a
//! `Sqlx*Repository` implementation that works against SQLite and MySQL.
//!
//! Most queries are written once in the SQL dialect both backends accept;
//! `on_pool!` runs the same block against whichever concrete pool is
//! configured, and `impl_from_row!` derives row decoding for both. Queries
//! whose syntax differs (upserts, insert-ignore) keep separate
//! `_sqlite`/`_mysql` functions.

/// Run `$body` with `$conn` bound to the concrete pool of `$pool`.
macro_rules! on_pool {
    ($pool:expr, |$conn:ident| $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool.sqlite()?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool.mysql()?;
                $body
            }
        }
    };
}

/// Implement `sqlx::FromRow` for both SQLite and MySQL rows from one body.
macro_rules! impl_from_row {
    ($ty:ty, |$row:ident| $body:block) => {
        impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for $ty {
            fn from_row($row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
                #[allow(unused_imports)]
                use sqlx::Row;
                $body
            }
        }

        impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for $ty {
            fn from_row($row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
                #[allow(unused_imports)]
                use sqlx::Row;
                $body
            }
        }
    };
}

pub mod analytics;
pub mod blog_post;
pub mod category;
pub mod inquiry;
pub mod media;
pub mod project;
pub mod session;
pub mod settings;
pub mod subscriber;
pub mod tag;
pub mod theme;
pub mod user;

pub use analytics::{AnalyticsRepository, EventColumn, SqlxAnalyticsRepository};
pub use blog_post::{BlogPostRepository, SqlxBlogPostRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use inquiry::{InquiryRepository, SqlxInquiryRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use project::{ProjectRepository, SqlxProjectRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use subscriber::{SqlxSubscriberRepository, SubscriberRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use theme::{SqlxThemeRepository, ThemeRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Decode a text column into one of the string enums
pub(crate) fn decode_enum<T: std::str::FromStr>(column: &str, raw: String) -> Result<T, sqlx::Error> {
    raw.parse()
        .map_err(|_| sqlx::Error::Decode(format!("invalid {} value: {}", column, raw).into()))
}

/// Comma-separated list column
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim().replace(',', " "))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Substring LIKE pattern; use with `ESCAPE '!'`, which both backends
/// read the same way.
pub(crate) fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{}%", escaped)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{User, UserRole};

    use super::{SqlxUserRepository, UserRepository};

    /// In-memory SQLite with the full schema applied
    pub async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    pub async fn insert_user(pool: &DynDatabasePool, username: &str, role: UserRole) -> User {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                username.to_string(),
                format!("{}@example.com", username),
                "hash".to_string(),
                role,
            ))
            .await
            .expect("Failed to create user")
    }
}
