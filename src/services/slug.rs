//! URL slugs for projects, posts, tags and categories

use once_cell::sync::Lazy;
use regex::Regex;

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9\p{L}]+(-[a-z0-9\p{L}]+)*$").expect("slug pattern is valid")
});

pub const MAX_SLUG_LEN: usize = 200;

/// Derive a slug from a title.
///
/// Lowercases, keeps ASCII alphanumerics and non-ASCII letters, and
/// collapses every run of other characters into a single `-`. The result
/// never starts or ends with `-`.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphabetic()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Lowercase and trim a user-supplied slug before validation
pub fn normalize_slug(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().count() <= MAX_SLUG_LEN && SLUG_PATTERN.is_match(slug)
}

/// The explicit slug when given (normalised), otherwise one generated from
/// `title`; either must be valid
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, String> {
    let slug = match explicit.map(normalize_slug).filter(|s| !s.is_empty()) {
        Some(slug) => slug,
        None => generate_slug(title),
    };
    if !is_valid_slug(&slug) {
        return Err(format!("Invalid slug: '{}'", slug));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust & WebAssembly: 2024!  "), "rust-webassembly-2024");
        assert_eq!(generate_slug("snake_case__name"), "snake-case-name");
        assert_eq!(generate_slug("Café Menu"), "café-menu");
        assert_eq!(generate_slug("中文 标题"), "中文-标题");
        assert_eq!(generate_slug("Café — Menu"), "café-menu");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(None, "Hello World").unwrap(), "hello-world");
        assert_eq!(resolve_slug(Some(" My-Post "), "ignored").unwrap(), "my-post");
        assert_eq!(resolve_slug(Some("  "), "Fallback").unwrap(), "fallback");
        assert!(resolve_slug(Some("bad slug"), "x").is_err());
        assert!(resolve_slug(None, "???").is_err());
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("hello-world"));
        assert!(is_valid_slug("café-menu"));
        assert!(is_valid_slug("v2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug("under_score"));
        assert!(!is_valid_slug(&"a".repeat(MAX_SLUG_LEN + 1)));
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("  My-Slug "), "my-slug");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn generated_slugs_are_valid_or_empty(title in "\\PC{0,60}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            if !slug.is_empty() && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                prop_assert!(SLUG_PATTERN.is_match(&slug));
            }
        }

        #[test]
        fn generate_slug_is_idempotent(title in "[a-zA-Z0-9 _.,!-]{0,40}") {
            let once = generate_slug(&title);
            prop_assert_eq!(generate_slug(&once), once);
        }
    }
}
