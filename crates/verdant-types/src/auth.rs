//! Authentication payloads and decoded token claims.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Role name granting access to admin routes.
pub const ADMIN_ROLE: &str = "admin";

/// Role assigned to self-registered accounts.
pub const OWNER_ROLE: &str = "owner";

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Sign-up form as entered by the user.
///
/// Use [`Registration::validate`] before sending, then
/// [`Registration::to_request`] to build the wire body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: String,
}

impl Registration {
    /// Check the form rules, reporting the first violated field.
    ///
    /// ```
    /// use verdant_types::Registration;
    ///
    /// let form = Registration {
    ///     name: "Ada".into(),
    ///     email: "ada@example.com".into(),
    ///     phone: "0123456789".into(),
    ///     password: "secret1".into(),
    ///     confirm_password: "secret1".into(),
    /// };
    /// assert!(form.validate().is_ok());
    /// ```
    pub fn validate(&self) -> ParseResult<()> {
        if self.name.trim().chars().count() < 2 {
            return Err(ParseError::field(
                "name",
                "Name must be at least 2 characters long",
            ));
        }
        if !looks_like_email(&self.email) {
            return Err(ParseError::field("email", "Invalid email address"));
        }
        if self.phone.trim().chars().count() < 10 {
            return Err(ParseError::field("phone", "Phone number must be valid"));
        }
        if self.password.chars().count() < 6 {
            return Err(ParseError::field(
                "password",
                "Password must be at least 6 characters long",
            ));
        }
        if !self.password.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError::field("password", "Password must be alphanumeric"));
        }
        if self.password != self.confirm_password {
            return Err(ParseError::field("confirm_password", "Passwords do not match"));
        }
        Ok(())
    }

    /// Wire body: drops the confirmation and registers as an owner.
    #[must_use]
    pub fn to_request(&self) -> RegisterRequest {
        RegisterRequest {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            password: self.password.clone(),
            role: OWNER_ROLE.to_string(),
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Decoded JWT payload describing the signed-in user.
///
/// Claims the client does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    /// User identifier, from `sub` or `id`.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.sub.as_deref().or(self.id.as_deref())
    }

    /// Whether the user holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}
