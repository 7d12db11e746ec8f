//! Okta Management API models
//!
//! Only the fields the tooling reads are typed; everything else an Okta
//! object carries is kept in `extra` so nothing is lost on a round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A directory user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID (`00u...`); absent on create requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Lifecycle status (`ACTIVE`, `STAGED`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Profile attributes
    pub profile: UserProfile,
    /// Credentials; only sent on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<UserCredentials>,
}

/// Profile of a [`User`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Primary email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Login (usually the email)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Custom and unmapped attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// "First Last", falling back to the login
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.login.clone().unwrap_or_default(),
        }
    }
}

/// Credentials of a [`User`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Password credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordCredential>,
}

/// Password credential; the value is write-only
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PasswordCredential {
    /// Password value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl std::fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An application integration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application ID (`0oa...`)
    pub id: String,
    /// Catalog name (e.g. `oidc_client`)
    #[serde(default)]
    pub name: String,
    /// Display label
    #[serde(default)]
    pub label: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: Option<String>,
    /// Sign-on mode (`OPENID_CONNECT`, `SAML_2_0`, ...)
    #[serde(default)]
    pub sign_on_mode: Option<String>,
    /// Everything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An enrolled authentication factor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFactor {
    /// Factor ID
    pub id: String,
    /// Factor type (`push`, `token:software:totp`, `sms`, ...)
    #[serde(default)]
    pub factor_type: String,
    /// Provider (`OKTA`, `GOOGLE`, ...)
    #[serde(default)]
    pub provider: Option<String>,
    /// Enrollment status
    #[serde(default)]
    pub status: Option<String>,
}
