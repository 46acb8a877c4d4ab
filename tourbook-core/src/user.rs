//! Users, credentials and password-reset tokens

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::query::{Field, FieldKind, Schema};
use crate::validation::required;
use crate::{Role, ValidationError};

pub const DEFAULT_PHOTO: &str = "default.jpg";
pub const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores everything past 72 bytes
pub const MAX_PASSWORD_LEN: usize = 72;
/// Minutes a password reset token stays valid
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid email regex")
});

/// Fields admins may filter and sort users on.
pub const USER_SCHEMA: Schema = Schema {
    fields: &[
        Field::new("name", "u.name", FieldKind::Text),
        Field::new("email", "u.email", FieldKind::Text),
        Field::new("role", "u.role", FieldKind::Text),
        Field::new("createdAt", "u.created_at", FieldKind::Timestamp),
    ],
    default_sort: "-createdAt",
};

/// A user as returned by reads. Secrets never leave the repository layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub photo: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
}

impl User {
    /// True when the password changed after a token issued at `issued_at`
    /// (unix seconds), which makes that token stale.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp() > issued_at)
            .unwrap_or(false)
    }
}

/// Client payload for signup, admin create and profile edits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub photo: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// Validated user about to be created. `password` is still plaintext; the
/// server hashes it before it reaches the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub photo: String,
    pub password: String,
}

/// Validated profile changes (never touches the password).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.photo.is_none() && self.role.is_none()
    }
}

impl UserInput {
    /// Public signup: the role is always `user`, whatever the payload says.
    pub fn into_signup(self) -> Result<NewUser, ValidationError> {
        let mut user = self.into_new_user()?;
        user.role = Role::User;
        Ok(user)
    }

    /// Admin-side create: the role may be chosen.
    pub fn into_new_user(self) -> Result<NewUser, ValidationError> {
        let name = required("name", self.name.as_deref().unwrap_or_default())
            .map_err(|_| ValidationError::custom("Please tell us your name"))?;
        let email = self
            .email
            .as_deref()
            .ok_or_else(|| ValidationError::custom("Please provide your email"))
            .and_then(normalize_email)?;
        let role = match self.role.as_deref() {
            Some(r) => Role::parse(r)?,
            None => Role::default(),
        };
        let password = validate_password(self.password, self.password_confirm)?;

        Ok(NewUser {
            name,
            email,
            role,
            photo: self
                .photo
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PHOTO.to_owned()),
            password,
        })
    }

    /// Profile update by the user themselves: name, email, photo only.
    pub fn into_profile_update(self) -> Result<ProfileUpdate, ValidationError> {
        if self.password.is_some() || self.password_confirm.is_some() {
            return Err(ValidationError::custom(
                "This route is not for password updates. Please use /change-password.",
            ));
        }
        Ok(ProfileUpdate {
            role: None,
            ..self.into_admin_update()?
        })
    }

    /// Update by an admin: may also change the role, never the password.
    pub fn into_admin_update(self) -> Result<ProfileUpdate, ValidationError> {
        let name = self
            .name
            .map(|n| required("name", &n).map_err(|_| ValidationError::custom("Please tell us your name")))
            .transpose()?;
        let email = self.email.as_deref().map(normalize_email).transpose()?;
        let role = self.role.as_deref().map(Role::parse).transpose()?;
        let photo = self.photo.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty());
        Ok(ProfileUpdate {
            name,
            email,
            photo,
            role,
        })
    }
}

/// Lowercase and check an email address.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::custom("Please provide your email"));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::custom("Please provide a valid email address"));
    }
    Ok(email)
}

/// Check a new password against its confirmation.
pub fn validate_password(
    password: Option<String>,
    confirm: Option<String>,
) -> Result<String, ValidationError> {
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ValidationError::custom("Please provide a password"))?;
    let confirm = confirm
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ValidationError::custom("Please confirm your password"))?;

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: "password",
            min: MIN_PASSWORD_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ValidationError::TooLong {
            field: "password",
            max: MAX_PASSWORD_LEN,
        });
    }
    if password != confirm {
        return Err(ValidationError::custom("Passwords are not matching"));
    }
    Ok(password)
}

/// A freshly minted password reset token.
///
/// `token` goes to the user by email; only `digest` is stored.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        Self {
            digest: digest_reset_token(&token),
            token,
            expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

/// SHA-256 hex digest under which reset tokens are stored and looked up.
pub fn digest_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> UserInput {
        UserInput {
            name: Some("Laura Wilson".into()),
            email: Some("  Laura@Example.COM ".into()),
            role: Some("admin".into()),
            photo: None,
            password: Some("pass1234".into()),
            password_confirm: Some("pass1234".into()),
        }
    }

    #[test]
    fn signup_forces_user_role() {
        let user = signup().into_signup().unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.email, "laura@example.com");
        assert_eq!(user.photo, DEFAULT_PHOTO);
    }

    #[test]
    fn admin_create_keeps_role() {
        let user = signup().into_new_user().unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn password_rules() {
        let err = UserInput { password_confirm: Some("pass12345".into()), ..signup() }
            .into_signup()
            .unwrap_err();
        assert_eq!(err.to_string(), "Passwords are not matching");

        let err = UserInput {
            password: Some("short".into()),
            password_confirm: Some("short".into()),
            ..signup()
        }
        .into_signup()
        .unwrap_err();
        assert!(matches!(err, ValidationError::TooShort { min: 8, .. }));

        let err = UserInput { password: None, ..signup() }.into_signup().unwrap_err();
        assert_eq!(err.to_string(), "Please provide a password");
    }

    #[test]
    fn email_rules() {
        let err = UserInput { email: Some("not-an-email".into()), ..signup() }
            .into_signup()
            .unwrap_err();
        assert_eq!(err.to_string(), "Please provide a valid email address");

        let err = UserInput { email: None, ..signup() }.into_signup().unwrap_err();
        assert_eq!(err.to_string(), "Please provide your email");
    }

    #[test]
    fn profile_update_refuses_passwords() {
        let err = UserInput {
            name: Some("New".into()),
            password: Some("whatever1".into()),
            ..UserInput::default()
        }
        .into_profile_update()
        .unwrap_err();
        assert!(err.to_string().contains("/change-password"));
    }

    #[test]
    fn profile_update_ignores_role() {
        let update = UserInput {
            name: Some(" Jonas ".into()),
            role: Some("admin".into()),
            ..UserInput::default()
        }
        .into_profile_update()
        .unwrap();
        assert_eq!(update.name.as_deref(), Some("Jonas"));
        assert_eq!(update.role, None);
        assert!(!update.is_empty());
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn admin_update_validates_role() {
        let err = UserInput { role: Some("root".into()), ..UserInput::default() }
            .into_admin_update()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidVariant { field: "role", .. }));
    }

    #[test]
    fn changed_password_after_iat() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            name: "Lourdes Browning".into(),
            email: "loulou@example.com".into(),
            role: Role::User,
            photo: DEFAULT_PHOTO.into(),
            created_at: now,
            password_changed_at: None,
        };
        assert!(!user.changed_password_after(now.timestamp()));

        user.password_changed_at = Some(now);
        assert!(user.changed_password_after(now.timestamp() - 60));
        assert!(!user.changed_password_after(now.timestamp()));
    }

    #[test]
    fn reset_token_stores_digest_only() {
        let token = ResetToken::generate();
        assert_eq!(token.token.len(), 64);
        assert_ne!(token.token, token.digest);
        assert_eq!(digest_reset_token(&token.token), token.digest);
        assert!(token.expires_at > Utc::now());
    }

    #[test]
    fn user_json_has_no_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Aarav Lynn".into(),
            email: "aarav@example.com".into(),
            role: Role::LeadGuide,
            photo: "user-3.jpg".into(),
            created_at: Utc::now(),
            password_changed_at: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "lead-guide");
        assert!(json.get("password").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
