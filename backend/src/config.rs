//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults. The defaults for the Okta values are documented
//! placeholders; [`Config::placeholder_fields`] reports which ones are still
//! unset so front-ends can refuse to run against them.

use std::env;
use std::path::PathBuf;

/// Placeholder organization URL shipped in the defaults
pub const PLACEHOLDER_ORG_URL: &str = "https://your-org.okta.com";
/// Placeholder API token shipped in the defaults
pub const PLACEHOLDER_API_TOKEN: &str = "YOUR_API_TOKEN";
/// Placeholder OAuth client ID shipped in the defaults
pub const PLACEHOLDER_CLIENT_ID: &str = "YOUR_CLIENT_ID";
/// Placeholder OAuth client secret shipped in the defaults
pub const PLACEHOLDER_CLIENT_SECRET: &str = "YOUR_CLIENT_SECRET";
/// Placeholder application ID inside the default IdP metadata URL
pub const PLACEHOLDER_APP_ID: &str = "YOUR_APP_ID";
/// Setting holding the IdP metadata URL
pub const IDP_METADATA_URL_VAR: &str = "OKTA_IDP_METADATA_URL";

/// Region used when neither a tool argument nor `AWS_REGION` names one
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Okta organization and OAuth client configuration
    pub okta: OktaConfig,
    /// SAML service provider configuration
    pub saml: SamlConfig,
    /// Local callback server configuration
    pub server: ServerConfig,
    /// Token storage configuration
    pub storage: StorageConfig,
    /// AWS / Amazon Q Business / Kendra configuration
    pub aws: AwsConfig,
    /// Settings consumed only by the MCP servers
    pub mcp: McpConfig,
}

/// Okta organization settings
#[derive(Debug, Clone)]
pub struct OktaConfig {
    /// Organization URL, without a trailing slash
    pub org_url: String,
    /// API token used for the Management API (`SSWS` scheme)
    pub api_token: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret; `None` for public (PKCE-only) clients
    pub client_secret: Option<String>,
    /// Redirect URI registered with the Okta application
    pub redirect_uri: String,
    /// Scopes requested during authorization
    pub scopes: Vec<String>,
    /// Authorization server ID (`default` or a custom server)
    pub authorization_server: String,
}

/// SAML service provider settings
#[derive(Debug, Clone)]
pub struct SamlConfig {
    /// URL of the IdP metadata document
    pub idp_metadata_url: String,
    /// Entity ID of this service provider
    pub sp_entity_id: String,
    /// Assertion Consumer Service URL of this service provider
    pub sp_acs_url: String,
    /// Single logout service URL of this service provider
    pub sp_sls_url: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Token storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// File holding the most recent tokens (demo storage only)
    pub token_file: PathBuf,
    /// Timeout applied to outbound HTTP requests (in seconds)
    pub http_timeout_secs: u64,
}

/// AWS configuration for Amazon Q Business and Kendra
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// Region, when configured
    pub region: Option<String>,
    /// Amazon Q Business application ID
    pub q_application_id: Option<String>,
    /// User ID sent with Q Business conversations
    pub user_id: Option<String>,
    /// Role assumed with the Okta ID token for identity-aware calls
    pub q_role_arn: Option<String>,
    /// Default Kendra index
    pub kendra_index_id: Option<String>,
}

/// Token vending machine and plugin settings used by the MCP servers
#[derive(Debug, Clone, Default)]
pub struct McpConfig {
    /// Q Business plugin used by the ChatSync tool
    pub plugin_id: Option<String>,
    /// Access token answered to the plugin's auth challenge
    pub plugin_access_token: Option<String>,
    /// Instance URL answered to the plugin's auth challenge
    pub plugin_instance_url: Option<String>,
    /// Token vending machine, when identity-aware credentials are wanted
    pub tvm: Option<TvmConfig>,
}

/// Token vending machine settings
#[derive(Debug, Clone)]
pub struct TvmConfig {
    /// Issuer base URL (the `token` path is appended)
    pub issuer: String,
    /// Client ID for basic authentication against the issuer
    pub client_id: String,
    /// Client secret for basic authentication against the issuer
    pub client_secret: String,
    /// Role assumed with the vended ID token
    pub role_arn: String,
    /// Email the ID token is requested for
    pub email: String,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    /// The documented defaults, ignoring the environment
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_vars(var)
    }

    /// Load configuration from a variable lookup with defaults
    ///
    /// The lookup returns `None` for unset or blank variables.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let org_url = normalize_org_url(
            &var("OKTA_ORG_URL").unwrap_or_else(|| PLACEHOLDER_ORG_URL.to_string()),
        );
        let host = var("HOST").unwrap_or_else(|| "localhost".to_string());
        let port = var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080);
        let base = format!("http://{}:{}", host, port);

        let tvm = match (
            var("TVM_ISSUER"),
            var("TVM_CLIENT_ID"),
            var("TVM_CLIENT_SECRET"),
            var("TVM_ROLE_ARN"),
            var("TVM_EMAIL"),
        ) {
            (Some(issuer), Some(client_id), Some(client_secret), Some(role_arn), Some(email)) => {
                Some(TvmConfig {
                    issuer,
                    client_id,
                    client_secret,
                    role_arn,
                    email,
                })
            }
            _ => None,
        };

        Self {
            okta: OktaConfig {
                api_token: var("OKTA_API_TOKEN")
                    .unwrap_or_else(|| PLACEHOLDER_API_TOKEN.to_string()),
                client_id: var("OKTA_CLIENT_ID")
                    .unwrap_or_else(|| PLACEHOLDER_CLIENT_ID.to_string()),
                client_secret: var("OKTA_CLIENT_SECRET"),
                redirect_uri: var("OKTA_REDIRECT_URI")
                    .unwrap_or_else(|| format!("{}/authorization-code/callback", base)),
                scopes: var("OKTA_SCOPES")
                    .map(|s| parse_scopes(&s))
                    .unwrap_or_else(default_scopes),
                authorization_server: var("OKTA_AUTH_SERVER_ID")
                    .unwrap_or_else(|| "default".to_string()),
                org_url: org_url.clone(),
            },
            saml: SamlConfig {
                idp_metadata_url: var(IDP_METADATA_URL_VAR).unwrap_or_else(|| {
                    format!("{}/app/{}/sso/saml/metadata", org_url, PLACEHOLDER_APP_ID)
                }),
                sp_entity_id: var("OKTA_SP_ENTITY_ID")
                    .unwrap_or_else(|| format!("{}/saml/metadata", base)),
                sp_acs_url: var("OKTA_SP_ACS_URL")
                    .unwrap_or_else(|| format!("{}/saml/acs", base)),
                sp_sls_url: var("OKTA_SP_SLS_URL")
                    .unwrap_or_else(|| format!("{}/saml/sls", base)),
            },
            server: ServerConfig { port, host },
            storage: StorageConfig {
                token_file: var("TOKEN_STORAGE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("tokens.json")),
                http_timeout_secs: var("HTTP_TIMEOUT_SECS")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
            },
            aws: AwsConfig {
                region: var("AWS_REGION"),
                q_application_id: var("Q_BUSINESS_APP_ID"),
                user_id: var("USER_ID"),
                q_role_arn: var("Q_BUSINESS_ROLE_ARN"),
                kendra_index_id: var("KENDRA_INDEX_ID"),
            },
            mcp: McpConfig {
                plugin_id: var("Q_BUSINESS_PLUGIN_ID"),
                plugin_access_token: var("Q_BUSINESS_PLUGIN_ACCESS_TOKEN"),
                plugin_instance_url: var("Q_BUSINESS_PLUGIN_INSTANCE_URL"),
                tvm,
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Region to use, falling back to `us-east-1`
    pub fn region_or_default(&self) -> String {
        self.aws
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string())
    }

    /// Names of the Okta settings that still hold their placeholder value
    pub fn placeholder_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.okta.org_url == PLACEHOLDER_ORG_URL {
            fields.push("OKTA_ORG_URL");
        }
        if self.okta.api_token == PLACEHOLDER_API_TOKEN {
            fields.push("OKTA_API_TOKEN");
        }
        if self.okta.client_id == PLACEHOLDER_CLIENT_ID {
            fields.push("OKTA_CLIENT_ID");
        }
        if self.okta.client_secret.as_deref() == Some(PLACEHOLDER_CLIENT_SECRET) {
            fields.push("OKTA_CLIENT_SECRET");
        }
        if self.saml.idp_metadata_url.contains(PLACEHOLDER_APP_ID) {
            fields.push(IDP_METADATA_URL_VAR);
        }
        fields
    }
}

/// Strip trailing slashes from an organization URL
pub fn normalize_org_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Parse a scope list separated by spaces or commas
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "OKTA_ORG_URL",
        "OKTA_API_TOKEN",
        "OKTA_CLIENT_ID",
        "OKTA_CLIENT_SECRET",
        "OKTA_SCOPES",
        "OKTA_IDP_METADATA_URL",
        "PORT",
        "HOST",
        "TVM_ISSUER",
    ];

    fn clear_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_are_placeholders() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.okta.org_url, PLACEHOLDER_ORG_URL);
        assert_eq!(config.okta.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(
            config.okta.redirect_uri,
            "http://localhost:8080/authorization-code/callback"
        );
        assert!(config.okta.client_secret.is_none());
        assert!(config.mcp.tvm.is_none());
        assert_eq!(
            config.placeholder_fields(),
            vec![
                "OKTA_ORG_URL",
                "OKTA_API_TOKEN",
                "OKTA_CLIENT_ID",
                "OKTA_IDP_METADATA_URL"
            ]
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("OKTA_ORG_URL", "https://dev-1.okta.com/");
        env::set_var("OKTA_API_TOKEN", "token");
        env::set_var("OKTA_CLIENT_ID", "client");
        env::set_var("OKTA_SCOPES", "openid,offline_access");
        env::set_var(
            "OKTA_IDP_METADATA_URL",
            "https://dev-1.okta.com/app/exk1/sso/saml/metadata",
        );
        env::set_var("PORT", "9090");

        let config = Config::from_env();
        assert_eq!(config.okta.org_url, "https://dev-1.okta.com");
        assert_eq!(config.okta.scopes, vec!["openid", "offline_access"]);
        assert_eq!(config.server_addr(), "localhost:9090");
        assert!(config.placeholder_fields().is_empty());
        clear_env();
    }

    #[test]
    fn test_from_vars_ignores_environment() {
        let config = Config::from_vars(|name| match name {
            "OKTA_ORG_URL" => Some("https://dev-2.okta.com".to_string()),
            "USER_ID" => Some("alice".to_string()),
            _ => None,
        });
        assert_eq!(config.okta.org_url, "https://dev-2.okta.com");
        assert_eq!(
            config.saml.idp_metadata_url,
            "https://dev-2.okta.com/app/YOUR_APP_ID/sso/saml/metadata"
        );
        assert_eq!(config.aws.user_id.as_deref(), Some("alice"));
        assert!(config.placeholder_fields().contains(&"OKTA_IDP_METADATA_URL"));

        let defaults = Config::default();
        assert!(defaults.aws.user_id.is_none());
        assert!(defaults.aws.region.is_none());
        assert_eq!(defaults.okta.org_url, PLACEHOLDER_ORG_URL);
    }

    #[test]
    fn test_parse_scopes_mixed_separators() {
        assert_eq!(
            parse_scopes("openid  profile,email"),
            vec!["openid", "profile", "email"]
        );
    }
}
