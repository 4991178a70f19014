//! Theme settings repository
//!
//! The theme is a single row with `id = 1`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::decode_enum;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ColorMode, ThemeSettings};

impl_from_row!(ThemeSettings, |row| {
    Ok(ThemeSettings {
        preset: row.try_get("preset")?,
        primary_color: row.try_get("primary_color")?,
        secondary_color: row.try_get("secondary_color")?,
        accent_color: row.try_get("accent_color")?,
        background_color: row.try_get("background_color")?,
        text_color: row.try_get("text_color")?,
        heading_font: row.try_get("heading_font")?,
        body_font: row.try_get("body_font")?,
        border_radius: row.try_get("border_radius")?,
        color_mode: decode_enum::<ColorMode>("color_mode", row.try_get("color_mode")?)?,
        animations_enabled: row.try_get("animations_enabled")?,
        animation_duration_ms: row.try_get("animation_duration_ms")?,
        custom_css: row.try_get("custom_css")?,
        updated_at: row.try_get("updated_at")?,
    })
});

#[async_trait]
pub trait ThemeRepository: Send + Sync {
    /// The stored theme, if it was ever saved
    async fn get(&self) -> Result<Option<ThemeSettings>>;

    async fn save(&self, theme: &ThemeSettings) -> Result<()>;
}

pub struct SqlxThemeRepository {
    pool: DynDatabasePool,
}

impl SqlxThemeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ThemeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ThemeRepository for SqlxThemeRepository {
    async fn get(&self) -> Result<Option<ThemeSettings>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, ThemeSettings>(
                r#"
                SELECT preset, primary_color, secondary_color, accent_color, background_color,
                       text_color, heading_font, body_font, border_radius, color_mode,
                       animations_enabled, animation_duration_ms, custom_css, updated_at
                FROM theme_settings WHERE id = 1
                "#,
            )
            .fetch_optional(conn)
            .await
            .context("Failed to load theme settings")
        })
    }

    async fn save(&self, theme: &ThemeSettings) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => save_sqlite(self.pool.sqlite()?, theme).await,
            DatabaseDriver::Mysql => save_mysql(self.pool.mysql()?, theme).await,
        }
    }
}

const INSERT_THEME: &str = r#"
    INSERT INTO theme_settings (id, preset, primary_color, secondary_color, accent_color,
        background_color, text_color, heading_font, body_font, border_radius, color_mode,
        animations_enabled, animation_duration_ms, custom_css, updated_at)
    VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Bind every column of `INSERT_THEME` in order
macro_rules! bind_theme {
    ($query:expr, $theme:expr) => {
        $query
            .bind(&$theme.preset)
            .bind(&$theme.primary_color)
            .bind(&$theme.secondary_color)
            .bind(&$theme.accent_color)
            .bind(&$theme.background_color)
            .bind(&$theme.text_color)
            .bind(&$theme.heading_font)
            .bind(&$theme.body_font)
            .bind($theme.border_radius)
            .bind($theme.color_mode.as_str())
            .bind($theme.animations_enabled)
            .bind($theme.animation_duration_ms)
            .bind(&$theme.custom_css)
            .bind($theme.updated_at)
    };
}

async fn save_sqlite(pool: &SqlitePool, theme: &ThemeSettings) -> Result<()> {
    let sql = format!(
        "{} ON CONFLICT(id) DO UPDATE SET preset = excluded.preset, \
         primary_color = excluded.primary_color, secondary_color = excluded.secondary_color, \
         accent_color = excluded.accent_color, background_color = excluded.background_color, \
         text_color = excluded.text_color, heading_font = excluded.heading_font, \
         body_font = excluded.body_font, border_radius = excluded.border_radius, \
         color_mode = excluded.color_mode, animations_enabled = excluded.animations_enabled, \
         animation_duration_ms = excluded.animation_duration_ms, \
         custom_css = excluded.custom_css, updated_at = excluded.updated_at",
        INSERT_THEME
    );
    bind_theme!(sqlx::query(&sql), theme)
        .execute(pool)
        .await
        .context("Failed to save theme settings")?;
    Ok(())
}

async fn save_mysql(pool: &MySqlPool, theme: &ThemeSettings) -> Result<()> {
    let sql = format!(
        "{} ON DUPLICATE KEY UPDATE preset = VALUES(preset), \
         primary_color = VALUES(primary_color), secondary_color = VALUES(secondary_color), \
         accent_color = VALUES(accent_color), background_color = VALUES(background_color), \
         text_color = VALUES(text_color), heading_font = VALUES(heading_font), \
         body_font = VALUES(body_font), border_radius = VALUES(border_radius), \
         color_mode = VALUES(color_mode), animations_enabled = VALUES(animations_enabled), \
         animation_duration_ms = VALUES(animation_duration_ms), \
         custom_css = VALUES(custom_css), updated_at = VALUES(updated_at)",
        INSERT_THEME
    );
    bind_theme!(sqlx::query(&sql), theme)
        .execute(pool)
        .await
        .context("Failed to save theme settings")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    #[tokio::test]
    async fn test_get_before_save_is_none() {
        let repo = SqlxThemeRepository::new(migrated_pool().await);
        assert!(repo.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let pool = migrated_pool().await;
        let repo = SqlxThemeRepository::new(pool.clone());

        repo.save(&ThemeSettings::default()).await.unwrap();

        let mut theme = ThemeSettings::default();
        theme.preset = "custom".to_string();
        theme.primary_color = "#112233".to_string();
        theme.color_mode = ColorMode::Dark;
        theme.animations_enabled = false;
        repo.save(&theme).await.unwrap();

        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.primary_color, "#112233");
        assert_eq!(stored.color_mode, ColorMode::Dark);
        assert!(!stored.animations_enabled);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM theme_settings")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
