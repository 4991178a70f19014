//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! backend, and tracked in the `_migrations` table.
//!
//! ```ignore
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Every join row (project tags, project images, post tags, post
//! categories) references its parent with `ON DELETE CASCADE`, so deleting a
//! project or post never leaves orphans behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{DatabasePool, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, applied in ascending order)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                display_name VARCHAR(100),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                display_name VARCHAR(100),
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_settings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS settings (
                setting_key VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                setting_key VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_tags_and_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at DATETIME(6) NOT NULL
            );
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at DATETIME(6) NOT NULL
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_projects",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                description_html TEXT NOT NULL DEFAULT '',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                repo_url VARCHAR(500),
                live_url VARCHAR(500),
                cover_image VARCHAR(500),
                tech_stack TEXT NOT NULL DEFAULT '',
                started_at TIMESTAMP,
                completed_at TIMESTAMP,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);
            CREATE TABLE IF NOT EXISTS project_tags (
                project_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (project_id, tag_id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_project_tags_tag_id ON project_tags(tag_id);
            CREATE TABLE IF NOT EXISTS project_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                url VARCHAR(500) NOT NULL,
                alt_text VARCHAR(300) NOT NULL DEFAULT '',
                caption TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_project_images_project_id ON project_images(project_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                summary TEXT NOT NULL,
                description MEDIUMTEXT NOT NULL,
                description_html MEDIUMTEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                sort_order BIGINT NOT NULL DEFAULT 0,
                repo_url VARCHAR(500),
                live_url VARCHAR(500),
                cover_image VARCHAR(500),
                tech_stack TEXT NOT NULL,
                started_at DATETIME(6) NULL,
                completed_at DATETIME(6) NULL,
                published_at DATETIME(6) NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
            CREATE INDEX idx_projects_status ON projects(status);
            CREATE TABLE IF NOT EXISTS project_tags (
                project_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (project_id, tag_id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS project_images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                project_id BIGINT NOT NULL,
                url VARCHAR(500) NOT NULL,
                alt_text VARCHAR(300) NOT NULL DEFAULT '',
                caption TEXT,
                sort_order BIGINT NOT NULL DEFAULT 0,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_blog_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                excerpt TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT 0,
                cover_image VARCHAR(500),
                reading_time_minutes INTEGER NOT NULL DEFAULT 1,
                view_count INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_status ON blog_posts(status);
            CREATE INDEX IF NOT EXISTS idx_blog_posts_published_at ON blog_posts(published_at);
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id);
            CREATE TABLE IF NOT EXISTS post_categories (
                post_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_post_categories_category_id ON post_categories(category_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                excerpt TEXT NOT NULL,
                content MEDIUMTEXT NOT NULL,
                content_html MEDIUMTEXT NOT NULL,
                author_id BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                cover_image VARCHAR(500),
                reading_time_minutes BIGINT NOT NULL DEFAULT 1,
                view_count BIGINT NOT NULL DEFAULT 0,
                published_at DATETIME(6) NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_blog_posts_status ON blog_posts(status);
            CREATE INDEX idx_blog_posts_published_at ON blog_posts(published_at);
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS post_categories (
                post_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 7,
        name: "create_contact_inquiries",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS contact_inquiries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL,
                subject VARCHAR(200) NOT NULL DEFAULT '',
                message TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'new',
                ip_address VARCHAR(45),
                user_agent VARCHAR(500),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contact_inquiries_status ON contact_inquiries(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS contact_inquiries (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL,
                subject VARCHAR(200) NOT NULL DEFAULT '',
                message TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'new',
                ip_address VARCHAR(45),
                user_agent VARCHAR(500),
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
            CREATE INDEX idx_contact_inquiries_status ON contact_inquiries(status);
        "#,
    },
    Migration {
        version: 8,
        name: "create_subscribers",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100),
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                token VARCHAR(64) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL,
                confirmed_at TIMESTAMP,
                unsubscribed_at TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100),
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                token VARCHAR(64) NOT NULL UNIQUE,
                created_at DATETIME(6) NOT NULL,
                confirmed_at DATETIME(6) NULL,
                unsubscribed_at DATETIME(6) NULL
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_analytics_events",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type VARCHAR(32) NOT NULL,
                path VARCHAR(512) NOT NULL DEFAULT '',
                referrer VARCHAR(512),
                visitor_hash VARCHAR(64),
                user_agent VARCHAR(500),
                metadata TEXT,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analytics_events_type_created ON analytics_events(event_type, created_at);
            CREATE INDEX IF NOT EXISTS idx_analytics_events_created ON analytics_events(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                event_type VARCHAR(32) NOT NULL,
                path VARCHAR(512) NOT NULL DEFAULT '',
                referrer VARCHAR(512),
                visitor_hash VARCHAR(64),
                user_agent VARCHAR(500),
                metadata TEXT,
                created_at DATETIME(6) NOT NULL
            );
            CREATE INDEX idx_analytics_events_type_created ON analytics_events(event_type, created_at);
            CREATE INDEX idx_analytics_events_created ON analytics_events(created_at);
        "#,
    },
    Migration {
        version: 10,
        name: "create_theme_settings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS theme_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                preset VARCHAR(50) NOT NULL,
                primary_color VARCHAR(7) NOT NULL,
                secondary_color VARCHAR(7) NOT NULL,
                accent_color VARCHAR(7) NOT NULL,
                background_color VARCHAR(7) NOT NULL,
                text_color VARCHAR(7) NOT NULL,
                heading_font VARCHAR(100) NOT NULL,
                body_font VARCHAR(100) NOT NULL,
                border_radius INTEGER NOT NULL,
                color_mode VARCHAR(10) NOT NULL,
                animations_enabled BOOLEAN NOT NULL,
                animation_duration_ms INTEGER NOT NULL,
                custom_css TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS theme_settings (
                id BIGINT PRIMARY KEY,
                preset VARCHAR(50) NOT NULL,
                primary_color VARCHAR(7) NOT NULL,
                secondary_color VARCHAR(7) NOT NULL,
                accent_color VARCHAR(7) NOT NULL,
                background_color VARCHAR(7) NOT NULL,
                text_color VARCHAR(7) NOT NULL,
                heading_font VARCHAR(100) NOT NULL,
                body_font VARCHAR(100) NOT NULL,
                border_radius BIGINT NOT NULL,
                color_mode VARCHAR(10) NOT NULL,
                animations_enabled BOOLEAN NOT NULL,
                animation_duration_ms BIGINT NOT NULL,
                custom_css TEXT NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
        "#,
    },
    Migration {
        version: 11,
        name: "create_media",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename VARCHAR(255) NOT NULL UNIQUE,
                original_name VARCHAR(255) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                size INTEGER NOT NULL,
                url VARCHAR(500) NOT NULL,
                uploaded_by INTEGER,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (uploaded_by) REFERENCES users(id) ON DELETE SET NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS media (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                filename VARCHAR(255) NOT NULL UNIQUE,
                original_name VARCHAR(255) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                size BIGINT NOT NULL,
                url VARCHAR(500) NOT NULL,
                uploaded_by BIGINT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (uploaded_by) REFERENCES users(id) ON DELETE SET NULL
            );
        "#,
    },
];

/// Run all pending migrations in version order.
///
/// Returns the number of migrations applied; calling it again is a no-op.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool.as_ref()).await?;

    let applied = get_applied_migrations(pool.as_ref()).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied_versions.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        apply_migration(pool.as_ref(), migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &dyn DatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME(6) NOT NULL
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &dyn DatabasePool) -> Result<Vec<MigrationRecord>> {
    const SQL: &str = "SELECT version, name, applied_at FROM _migrations ORDER BY version";

    macro_rules! collect_records {
        ($conn:expr) => {{
            let rows = sqlx::query(SQL)
                .fetch_all($conn)
                .await
                .context("Failed to read applied migrations")?;
            rows.iter()
                .map(|row| {
                    Ok(MigrationRecord {
                        version: row.try_get("version")?,
                        name: row.try_get("name")?,
                        applied_at: row.try_get("applied_at")?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        }};
    }

    match pool.driver() {
        DatabaseDriver::Sqlite => collect_records!(pool.sqlite()?),
        DatabaseDriver::Mysql => collect_records!(pool.mysql()?),
    }
}

async fn apply_migration(pool: &dyn DatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    let now = Utc::now();
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
                .bind(migration.version as i64)
                .bind(migration.name)
                .bind(now)
                .execute(pool.sqlite()?)
                .await?;
        }
        DatabaseDriver::Mysql => {
            sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
                .bind(migration.version as i64)
                .bind(migration.name)
                .bind(now)
                .execute(pool.mysql()?)
                .await?;
        }
    }

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Check if every migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool.as_ref()).await?;
    let applied = get_applied_migrations(pool.as_ref()).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}
