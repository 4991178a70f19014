//! Theme customizer settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    #[derive(Default)]
    pub enum ColorMode {
        Light => "light",
        Dark => "dark",
        #[default]
        System => "system",
    }
}

/// The site theme; a single row in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSettings {
    /// Preset the palette was last taken from, or "custom"
    pub preset: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub text_color: String,
    pub heading_font: String,
    pub body_font: String,
    /// Pixels
    pub border_radius: i64,
    pub color_mode: ColorMode,
    pub animations_enabled: bool,
    pub animation_duration_ms: i64,
    pub custom_css: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            preset: "default".to_string(),
            primary_color: "#2563eb".to_string(),
            secondary_color: "#64748b".to_string(),
            accent_color: "#f59e0b".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#0f172a".to_string(),
            heading_font: "Inter, sans-serif".to_string(),
            body_font: "Inter, sans-serif".to_string(),
            border_radius: 8,
            color_mode: ColorMode::System,
            animations_enabled: true,
            animation_duration_ms: 200,
            custom_css: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial theme update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemePatch {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub accent_color: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub heading_font: Option<String>,
    pub body_font: Option<String>,
    pub border_radius: Option<i64>,
    pub color_mode: Option<ColorMode>,
    pub animations_enabled: Option<bool>,
    pub animation_duration_ms: Option<i64>,
    pub custom_css: Option<String>,
}

impl ThemePatch {
    /// Whether the patch changes any palette or font field
    pub fn touches_palette(&self) -> bool {
        self.primary_color.is_some()
            || self.secondary_color.is_some()
            || self.accent_color.is_some()
            || self.background_color.is_some()
            || self.text_color.is_some()
            || self.heading_font.is_some()
            || self.body_font.is_some()
    }
}
