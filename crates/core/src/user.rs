//! Users and their profiles.
//!
//! The profile holds facts the assistant should remember about a person
//! (name, company, preferences). It is created lazily and only ever patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// An account. Email is the sole login identifier.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Lowercased email, unique across users
    pub email: String,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Facts about a user injected into model context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub company_name: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    /// Free-form preferences (units, contact times, equipment on site, ...)
    #[serde(default)]
    pub preferences: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// An empty profile for a freshly registered user.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            company_name: None,
            phone: None,
            preferences: None,
            notes: None,
            updated_at: Utc::now(),
        }
    }

    /// Labelled, non-blank attributes in a fixed order.
    pub fn facts(&self) -> Vec<(&'static str, &str)> {
        [
            ("Customer name", &self.display_name),
            ("Company", &self.company_name),
            ("Phone", &self.phone),
            ("Preferences", &self.preferences),
            ("Notes", &self.notes),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label, v))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.facts().is_empty()
    }

    /// Apply a partial update. Absent fields are kept; explicit nulls clear.
    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            display_name,
            company_name,
            phone,
            preferences,
            notes,
        } = update;
        for (field, patch) in [
            (&mut self.display_name, display_name),
            (&mut self.company_name, company_name),
            (&mut self.phone, phone),
            (&mut self.preferences, preferences),
            (&mut self.notes, notes),
        ] {
            if let Some(value) = patch {
                *field = value;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// A partial profile update.
///
/// Each field is three-state: absent (`None`) leaves the value alone,
/// `null` (`Some(None)`) clears it, and a string sets it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, deserialize_with = "patch_field", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field", skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

/// A present key, `null` included, becomes `Some`; `default` covers absence.
fn patch_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
