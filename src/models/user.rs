//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Role of a dashboard user.
    ///
    /// Editors manage content; admins additionally manage users, the theme
    /// and site settings.
    #[derive(Default)]
    pub enum UserRole {
        Admin => "admin",
        #[default]
        Editor => "editor",
    }
}

/// A dashboard account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user; the password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            role,
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Editors and admins may both edit content
    pub fn is_editor(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Editor)
    }

    /// Name shown in the dashboard and on posts
    pub fn public_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("EDITOR".parse::<UserRole>().unwrap(), UserRole::Editor);
        assert!("author".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Editor);
    }

    #[test]
    fn test_permissions() {
        let admin = User::new("a".into(), "a@x.io".into(), "h".into(), UserRole::Admin);
        let editor = User::new("e".into(), "e@x.io".into(), "h".into(), UserRole::Editor);

        assert!(admin.is_admin() && admin.is_editor());
        assert!(!editor.is_admin() && editor.is_editor());
    }

    #[test]
    fn test_public_name_falls_back_to_username() {
        let mut user = User::new("jane".into(), "j@x.io".into(), "h".into(), UserRole::Admin);
        assert_eq!(user.public_name(), "jane");

        user.display_name = Some("  ".into());
        assert_eq!(user.public_name(), "jane");

        user.display_name = Some("Jane Doe".into());
        assert_eq!(user.public_name(), "Jane Doe");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("jane".into(), "j@x.io".into(), "secret".into(), UserRole::Admin);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"role\":\"admin\""));
    }
}
