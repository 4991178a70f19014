//! Theme customizer
//!
//! One stored theme drives the public site's CSS variables. Presets
//! overwrite the palette and fonts; everything else is edited field by
//! field and validated before it is saved.

use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::db::repositories::ThemeRepository;
use crate::models::{ColorMode, ThemePatch, ThemeSettings};

const CACHE_KEY_THEME: &str = "theme:current";
const THEME_CACHE_TTL: Duration = Duration::from_secs(3600);

pub const MAX_FONT_LEN: usize = 100;
pub const MAX_BORDER_RADIUS: i64 = 48;
pub const MAX_ANIMATION_MS: i64 = 5000;
pub const MAX_CUSTOM_CSS_LEN: usize = 20_000;

/// Fragments that would let custom CSS escape its `<style>` block or run code
const FORBIDDEN_CSS: &[&str] = &["</style", "<script", "javascript:", "expression(", "@import"];

static COLOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("color pattern is valid"));

static FONT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9 ,'"-]+$"#).expect("font pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum ThemeServiceError {
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A named palette and font pairing
#[derive(Debug, Clone, Serialize)]
pub struct ThemePreset {
    pub name: &'static str,
    pub label: &'static str,
    pub primary_color: &'static str,
    pub secondary_color: &'static str,
    pub accent_color: &'static str,
    pub background_color: &'static str,
    pub text_color: &'static str,
    pub heading_font: &'static str,
    pub body_font: &'static str,
}

pub const PRESETS: &[ThemePreset] = &[
    ThemePreset {
        name: "default",
        label: "Default",
        primary_color: "#2563eb",
        secondary_color: "#64748b",
        accent_color: "#f59e0b",
        background_color: "#ffffff",
        text_color: "#0f172a",
        heading_font: "Inter, sans-serif",
        body_font: "Inter, sans-serif",
    },
    ThemePreset {
        name: "ocean",
        label: "Ocean",
        primary_color: "#0e7490",
        secondary_color: "#155e75",
        accent_color: "#22d3ee",
        background_color: "#f0f9ff",
        text_color: "#082f49",
        heading_font: "Poppins, sans-serif",
        body_font: "Open Sans, sans-serif",
    },
    ThemePreset {
        name: "forest",
        label: "Forest",
        primary_color: "#15803d",
        secondary_color: "#3f6212",
        accent_color: "#ca8a04",
        background_color: "#f7fee7",
        text_color: "#1a2e05",
        heading_font: "Merriweather, serif",
        body_font: "Source Sans Pro, sans-serif",
    },
    ThemePreset {
        name: "sunset",
        label: "Sunset",
        primary_color: "#ea580c",
        secondary_color: "#be123c",
        accent_color: "#facc15",
        background_color: "#fff7ed",
        text_color: "#431407",
        heading_font: "Playfair Display, serif",
        body_font: "Lato, sans-serif",
    },
    ThemePreset {
        name: "monochrome",
        label: "Monochrome",
        primary_color: "#111827",
        secondary_color: "#4b5563",
        accent_color: "#9ca3af",
        background_color: "#ffffff",
        text_color: "#000000",
        heading_font: "IBM Plex Mono, monospace",
        body_font: "IBM Plex Sans, sans-serif",
    },
];

pub fn find_preset(name: &str) -> Option<&'static ThemePreset> {
    let name = name.trim().to_ascii_lowercase();
    PRESETS.iter().find(|p| p.name == name)
}

pub struct ThemeService {
    repo: Arc<dyn ThemeRepository>,
    cache: Arc<Cache>,
}

impl ThemeService {
    pub fn new(repo: Arc<dyn ThemeRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// The stored theme, or the default one if it was never saved
    pub async fn get(&self) -> Result<ThemeSettings, ThemeServiceError> {
        self.cache
            .get_or_load(CACHE_KEY_THEME, THEME_CACHE_TTL, || async {
                let theme = self
                    .repo
                    .get()
                    .await
                    .context("Failed to load theme")?
                    .unwrap_or_default();
                Ok::<_, ThemeServiceError>(theme)
            })
            .await
    }

    /// Apply a partial update. A palette or font change marks the preset
    /// as "custom".
    pub async fn update(&self, patch: ThemePatch) -> Result<ThemeSettings, ThemeServiceError> {
        validate_patch(&patch)?;
        let mut theme = self.get().await?;

        if patch.touches_palette() {
            theme.preset = "custom".to_string();
        }
        let ThemePatch {
            primary_color,
            secondary_color,
            accent_color,
            background_color,
            text_color,
            heading_font,
            body_font,
            border_radius,
            color_mode,
            animations_enabled,
            animation_duration_ms,
            custom_css,
        } = patch;

        for (value, field) in [
            (primary_color, &mut theme.primary_color),
            (secondary_color, &mut theme.secondary_color),
            (accent_color, &mut theme.accent_color),
            (background_color, &mut theme.background_color),
            (text_color, &mut theme.text_color),
        ] {
            if let Some(value) = value {
                *field = value.trim().to_ascii_lowercase();
            }
        }
        if let Some(font) = heading_font {
            theme.heading_font = font.trim().to_string();
        }
        if let Some(font) = body_font {
            theme.body_font = font.trim().to_string();
        }
        if let Some(radius) = border_radius {
            theme.border_radius = radius;
        }
        if let Some(mode) = color_mode {
            theme.color_mode = mode;
        }
        if let Some(enabled) = animations_enabled {
            theme.animations_enabled = enabled;
        }
        if let Some(ms) = animation_duration_ms {
            theme.animation_duration_ms = ms;
        }
        if let Some(css) = custom_css {
            theme.custom_css = css;
        }

        self.save(theme).await
    }

    pub fn presets(&self) -> &'static [ThemePreset] {
        PRESETS
    }

    /// Overwrite palette and fonts from a preset; other fields are kept
    pub async fn apply_preset(&self, name: &str) -> Result<ThemeSettings, ThemeServiceError> {
        let preset =
            find_preset(name).ok_or_else(|| ThemeServiceError::PresetNotFound(name.to_string()))?;
        let mut theme = self.get().await?;
        theme.preset = preset.name.to_string();
        theme.primary_color = preset.primary_color.to_string();
        theme.secondary_color = preset.secondary_color.to_string();
        theme.accent_color = preset.accent_color.to_string();
        theme.background_color = preset.background_color.to_string();
        theme.text_color = preset.text_color.to_string();
        theme.heading_font = preset.heading_font.to_string();
        theme.body_font = preset.body_font.to_string();
        self.save(theme).await
    }

    pub async fn reset(&self) -> Result<ThemeSettings, ThemeServiceError> {
        self.save(ThemeSettings::default()).await
    }

    async fn save(&self, mut theme: ThemeSettings) -> Result<ThemeSettings, ThemeServiceError> {
        theme.updated_at = Utc::now();
        self.repo.save(&theme).await.context("Failed to save theme")?;
        self.cache.invalidate("theme:*").await;
        tracing::info!(preset = %theme.preset, "Theme updated");
        Ok(theme)
    }
}

fn validate_patch(patch: &ThemePatch) -> Result<(), ThemeServiceError> {
    let invalid = |msg: String| Err(ThemeServiceError::ValidationError(msg));

    for (field, value) in [
        ("primary_color", &patch.primary_color),
        ("secondary_color", &patch.secondary_color),
        ("accent_color", &patch.accent_color),
        ("background_color", &patch.background_color),
        ("text_color", &patch.text_color),
    ] {
        if let Some(value) = value {
            if !is_valid_color(value.trim()) {
                return invalid(format!("{} must be a #rgb or #rrggbb color", field));
            }
        }
    }
    for (field, value) in [
        ("heading_font", &patch.heading_font),
        ("body_font", &patch.body_font),
    ] {
        if let Some(value) = value {
            if !is_valid_font(value.trim()) {
                return invalid(format!(
                    "{} must be at most {} letters, digits, spaces, commas, quotes or hyphens",
                    field, MAX_FONT_LEN
                ));
            }
        }
    }
    if let Some(radius) = patch.border_radius {
        if !(0..=MAX_BORDER_RADIUS).contains(&radius) {
            return invalid(format!("border_radius must be between 0 and {}", MAX_BORDER_RADIUS));
        }
    }
    if let Some(ms) = patch.animation_duration_ms {
        if !(0..=MAX_ANIMATION_MS).contains(&ms) {
            return invalid(format!(
                "animation_duration_ms must be between 0 and {}",
                MAX_ANIMATION_MS
            ));
        }
    }
    if let Some(css) = &patch.custom_css {
        check_custom_css(css).map_err(ThemeServiceError::ValidationError)?;
    }
    Ok(())
}

pub fn is_valid_color(value: &str) -> bool {
    COLOR_PATTERN.is_match(value)
}

pub fn is_valid_font(value: &str) -> bool {
    !value.is_empty() && value.chars().count() <= MAX_FONT_LEN && FONT_PATTERN.is_match(value)
}

fn check_custom_css(css: &str) -> Result<(), String> {
    if css.chars().count() > MAX_CUSTOM_CSS_LEN {
        return Err(format!(
            "custom_css must be at most {} characters",
            MAX_CUSTOM_CSS_LEN
        ));
    }
    let lower = normalize_css(css).to_lowercase();
    if let Some(found) = FORBIDDEN_CSS.iter().find(|f| lower.contains(*f)) {
        return Err(format!("custom_css must not contain '{}'", found));
    }
    Ok(())
}

/// Decode CSS escapes (`\69`, `\28 `, `\(`) and drop comments, so the
/// blocklist sees what the browser will parse
fn normalize_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut hex = String::new();
                while hex.len() < 6 {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if hex.is_empty() {
                    match chars.next() {
                        Some('\n') | None => {}
                        Some(other) => out.push(other),
                    }
                } else {
                    if chars.peek().is_some_and(|w| w.is_ascii_whitespace()) {
                        chars.next();
                    }
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    out.push(decoded);
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Stylesheet exposing the theme as CSS custom properties
pub fn to_css(theme: &ThemeSettings) -> String {
    let mut css = String::new();
    css.push_str(":root {\n");
    let _ = writeln!(css, "  --color-primary: {};", theme.primary_color);
    let _ = writeln!(css, "  --color-secondary: {};", theme.secondary_color);
    let _ = writeln!(css, "  --color-accent: {};", theme.accent_color);
    let _ = writeln!(css, "  --color-background: {};", theme.background_color);
    let _ = writeln!(css, "  --color-text: {};", theme.text_color);
    let _ = writeln!(css, "  --font-heading: {};", theme.heading_font);
    let _ = writeln!(css, "  --font-body: {};", theme.body_font);
    let _ = writeln!(css, "  --radius: {}px;", theme.border_radius);
    let duration = if theme.animations_enabled {
        theme.animation_duration_ms
    } else {
        0
    };
    let _ = writeln!(css, "  --animation-duration: {}ms;", duration);
    let scheme = match theme.color_mode {
        ColorMode::Light => "light",
        ColorMode::Dark => "dark",
        ColorMode::System => "light dark",
    };
    let _ = writeln!(css, "  color-scheme: {};", scheme);
    css.push_str("}\n");

    css.push_str("@media (prefers-reduced-motion: reduce) {\n");
    css.push_str("  :root {\n    --animation-duration: 0ms;\n  }\n}\n");

    if !theme.custom_css.trim().is_empty() {
        css.push('\n');
        css.push_str(theme.custom_css.trim());
        css.push('\n');
    }
    css
}

/// Strong ETag for a rendered stylesheet
pub fn css_etag(css: &str) -> String {
    format!("\"{:x}\"", md5::compute(css.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxThemeRepository;
    use proptest::prelude::*;

    async fn setup_service() -> ThemeService {
        ThemeService::new(SqlxThemeRepository::boxed(migrated_pool().await), Cache::memory())
    }

    #[tokio::test]
    async fn test_get_defaults_when_unsaved() {
        let service = setup_service().await;
        let theme = service.get().await.unwrap();
        assert_eq!(theme.preset, "default");
        assert_eq!(theme.primary_color, "#2563eb");
    }

    #[tokio::test]
    async fn test_update_partial() {
        let service = setup_service().await;
        let theme = service
            .update(ThemePatch {
                primary_color: Some("#ABC".into()),
                border_radius: Some(12),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(theme.primary_color, "#abc");
        assert_eq!(theme.border_radius, 12);
        assert_eq!(theme.preset, "custom");
        assert_eq!(theme.accent_color, ThemeSettings::default().accent_color);

        let stored = service.get().await.unwrap();
        assert_eq!(stored.primary_color, "#abc");

        let motion_only = service
            .update(ThemePatch {
                animations_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(motion_only.preset, "custom");
        assert!(!motion_only.animations_enabled);
    }

    #[tokio::test]
    async fn test_update_validation() {
        let service = setup_service().await;
        let cases = [
            ThemePatch {
                primary_color: Some("blue".into()),
                ..Default::default()
            },
            ThemePatch {
                text_color: Some("#12345".into()),
                ..Default::default()
            },
            ThemePatch {
                heading_font: Some("Inter; } body { display:none".into()),
                ..Default::default()
            },
            ThemePatch {
                border_radius: Some(49),
                ..Default::default()
            },
            ThemePatch {
                animation_duration_ms: Some(-1),
                ..Default::default()
            },
            ThemePatch {
                custom_css: Some("body{} </STYLE><script>".into()),
                ..Default::default()
            },
            ThemePatch {
                custom_css: Some("@IMPORT url(x.css);".into()),
                ..Default::default()
            },
            ThemePatch {
                custom_css: Some(r"@\69mport url(x.css);".into()),
                ..Default::default()
            },
        ];
        for patch in cases {
            assert!(matches!(
                service.update(patch).await,
                Err(ThemeServiceError::ValidationError(_))
            ));
        }
        assert_eq!(service.get().await.unwrap().preset, "default");
    }

    #[tokio::test]
    async fn test_presets_and_reset() {
        let service = setup_service().await;
        assert_eq!(service.presets().len(), 5);

        service
            .update(ThemePatch {
                border_radius: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        let ocean = service.apply_preset("Ocean").await.unwrap();
        assert_eq!(ocean.preset, "ocean");
        assert_eq!(ocean.primary_color, "#0e7490");
        assert_eq!(ocean.border_radius, 0);

        assert!(matches!(
            service.apply_preset("neon").await,
            Err(ThemeServiceError::PresetNotFound(_))
        ));

        let reset = service.reset().await.unwrap();
        assert_eq!(reset.preset, "default");
        assert_eq!(reset.border_radius, 8);
    }

    #[test]
    fn test_escaped_css_is_decoded_before_matching() {
        assert_eq!(normalize_css(r"@\69mport"), "@import");
        assert_eq!(normalize_css(r"expression\28 1)"), "expression(1)");
        assert_eq!(normalize_css(r"java\script:"), "javascript:");
        assert_eq!(normalize_css("@im/* gap */port"), "@import");
        assert!(check_custom_css(r"width: expression\28 alert(1));").is_err());
        assert!(check_custom_css(r"a { background: url(j\61vascript:x) }").is_err());
        assert!(check_custom_css(r".icon::before { content: '\2014'; }").is_ok());
    }

    #[test]
    fn test_to_css() {
        let theme = ThemeSettings {
            animations_enabled: false,
            custom_css: ".hero { margin: 0; }".into(),
            ..Default::default()
        };
        let css = to_css(&theme);
        assert!(css.starts_with(":root {"));
        assert!(css.contains("--color-primary: #2563eb;"));
        assert!(css.contains("--radius: 8px;"));
        assert!(css.contains("--animation-duration: 0ms;"));
        assert!(css.contains("prefers-reduced-motion"));
        assert!(css.trim_end().ends_with(".hero { margin: 0; }"));

        assert_eq!(css_etag(&css), css_etag(&css));
        assert_ne!(css_etag(&css), css_etag(&to_css(&ThemeSettings::default())));
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in PRESETS {
            assert!(is_valid_color(preset.primary_color), "{}", preset.name);
            assert!(is_valid_color(preset.background_color), "{}", preset.name);
            assert!(is_valid_font(preset.heading_font), "{}", preset.name);
            assert!(is_valid_font(preset.body_font), "{}", preset.name);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn six_digit_hex_is_valid(rgb in 0u32..0x1000000) {
            let color = format!("#{:06x}", rgb);
            prop_assert!(is_valid_color(&color));
        }

        #[test]
        fn forbidden_css_always_rejected(prefix in "[a-z{}:; ]{0,40}", idx in 0usize..5) {
            let css = format!("{}{}", prefix, FORBIDDEN_CSS[idx].to_uppercase());
            prop_assert!(check_custom_css(&css).is_err());
        }
    }
}
