// Token persistence module
// Handles saving and loading the demo session's tokens to/from a local file

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Seconds subtracted from a token's expiry before it is considered stale
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Error types for token storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// File I/O error
    IoError(String),
    /// JSON serialization/deserialization error
    JsonError(String),
    /// Invalid data format
    InvalidData(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(msg) => write!(f, "IO Error: {}", msg),
            StoreError::JsonError(msg) => write!(f, "JSON Error: {}", msg),
            StoreError::InvalidData(msg) => write!(f, "Invalid Data: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Which token of a [`TokenRecord`] a caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// OAuth access token
    Access,
    /// OIDC ID token
    Id,
    /// OAuth refresh token
    Refresh,
}

impl TokenKind {
    /// The `token_type_hint` value for this kind
    pub fn as_hint(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Id => "id_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// OAuth/OIDC token record as returned by a token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Access token
    pub access_token: String,
    /// Token type (normally `Bearer`)
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// OIDC ID token, when the `openid` scope was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Refresh token, when `offline_access` was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Lifetime in seconds as reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Absolute expiry (Unix timestamp), derived when the token is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// User the token was minted for (client-credentials tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Application the token was minted for (client-credentials tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// Create a record holding only an access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            id_token: None,
            refresh_token: None,
            scope: None,
            expires_in: None,
            expires_at: None,
            user_id: None,
            app_id: None,
        }
    }

    /// Set `expires_at` from `expires_in`, relative to `now`
    pub fn stamp_expiry(&mut self, now: i64) {
        if let Some(expires_in) = self.expires_in {
            self.expires_at = Some(now + expires_in as i64);
        }
    }

    /// Get a token by kind
    pub fn get(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::Access => Some(self.access_token.as_str()),
            TokenKind::Id => self.id_token.as_deref(),
            TokenKind::Refresh => self.refresh_token.as_deref(),
        }
    }

    /// Whether the record is still usable at `now`
    ///
    /// A record without `expires_at` never expires locally.
    pub fn is_fresh_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at - EXPIRY_BUFFER_SECS,
            None => true,
        }
    }

    /// Whether `kind` is present and the record is fresh right now
    pub fn is_valid(&self, kind: TokenKind) -> bool {
        self.get(kind).is_some() && self.is_fresh_at(Utc::now().timestamp())
    }
}

/// Session data extracted from a SAML assertion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SamlSession {
    /// Subject NameID
    pub name_id: String,
    /// NameID format URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<String>,
    /// Session index from the AuthnStatement (needed for logout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// Issuer of the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Attribute name -> values
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Whether the assertion was accepted
    pub authenticated: bool,
}

/// Contents of the token file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredTokens {
    /// OAuth/OIDC tokens
    OAuth(TokenRecord),
    /// SAML session
    Saml(SamlSession),
}

/// Serializable structure for the token file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFileData {
    /// Version of the file format (for future migration support)
    version: u32,
    /// Stored tokens
    tokens: StoredTokens,
}

/// File-backed token storage
///
/// Holds a single document: whatever the last successful flow produced.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load whatever is stored
    ///
    /// # Returns
    /// * `Ok(None)` if the file does not exist
    /// * `Ok(Some(tokens))` if it was read
    /// * `Err(StoreError)` if it could not be read or parsed
    pub fn load(&self) -> Result<Option<StoredTokens>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json =
            fs::read_to_string(&self.path).map_err(|e| StoreError::IoError(e.to_string()))?;

        let data: TokenFileData =
            serde_json::from_str(&json).map_err(|e| StoreError::JsonError(e.to_string()))?;

        // Validate version (for future migration support)
        if data.version != 1 {
            return Err(StoreError::InvalidData(format!(
                "Unsupported token file version: {}",
                data.version
            )));
        }

        Ok(Some(data.tokens))
    }

    /// Replace the stored document
    pub fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        let data = TokenFileData {
            version: 1,
            tokens: tokens.clone(),
        };

        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| StoreError::JsonError(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
            }
        }

        fs::write(&self.path, json).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Delete the backing file
    ///
    /// Returns `true` if a file was removed.
    pub fn clear(&self) -> Result<bool, StoreError> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(true)
    }

    /// Load OAuth tokens, ignoring a stored SAML session
    pub fn load_oauth(&self) -> Result<Option<TokenRecord>, StoreError> {
        Ok(match self.load()? {
            Some(StoredTokens::OAuth(record)) => Some(record),
            _ => None,
        })
    }

    /// Load a SAML session, ignoring stored OAuth tokens
    pub fn load_saml(&self) -> Result<Option<SamlSession>, StoreError> {
        Ok(match self.load()? {
            Some(StoredTokens::Saml(session)) => Some(session),
            _ => None,
        })
    }

    /// Store OAuth tokens
    pub fn save_oauth(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.save(&StoredTokens::OAuth(record.clone()))
    }

    /// Store a SAML session
    pub fn save_saml(&self, session: &SamlSession) -> Result<(), StoreError> {
        self.save(&StoredTokens::Saml(session.clone()))
    }
}
