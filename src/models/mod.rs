//! Data models
//!
//! Database entities, API input types and the shared pagination types.

/// Declares a unit-only enum stored as lowercase text.
///
/// Generates `as_str`, `Display`, `FromStr` (case-insensitive) and serde
/// support using the same snake_case spelling the database uses.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

mod analytics;
mod blog_post;
mod category;
mod inquiry;
mod media;
mod pagination;
mod project;
mod session;
mod settings;
mod subscriber;
mod tag;
mod theme;
mod user;

pub use analytics::{
    AnalyticsEvent, AnalyticsSummary, CountEntry, DailyCount, EventType, NewEvent,
};
pub use blog_post::{BlogPost, CreatePostInput, PostFilter, UpdatePostInput};
pub use category::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
pub use inquiry::{ContactInput, ContactInquiry, InquiryStatus};
pub use media::Media;
pub use pagination::{ListParams, PagedResult};
pub use project::{
    ContentStatus, CreateImageInput, CreateProjectInput, Project, ProjectFilter, ProjectImage,
    UpdateProjectInput,
};
pub use session::Session;
pub use settings::SiteSettings;
pub use subscriber::{Subscriber, SubscriberStatus};
pub use tag::{Tag, TagWithCount};
pub use theme::{ColorMode, ThemePatch, ThemeSettings};
pub use user::{CreateUserInput, User, UserRole};
