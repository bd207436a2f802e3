use crate::core::config::EndpointConfig;

pub const DEFAULT_USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
pub const DEFAULT_TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Public OAuth client id of the Claude Code CLI.
pub const OAUTH_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// The usage endpoint rejects OAuth tokens without this beta marker.
pub const ANTHROPIC_BETA_HEADER: &str = "anthropic-beta";
pub const ANTHROPIC_BETA_VALUE: &str = "oauth-2025-04-20";

/// Resolved endpoint contract the pipeline talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub usage_url: String,
    pub token_url: String,
    pub client_id: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            usage_url: DEFAULT_USAGE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: OAUTH_CLIENT_ID.to_string(),
        }
    }
}

impl Endpoints {
    /// Build from config, refusing anything that would send tokens over plain HTTP.
    pub fn from_config(config: &EndpointConfig) -> anyhow::Result<Self> {
        validate_endpoint(&config.usage_url, "usage_url")?;
        validate_endpoint(&config.token_url, "token_url")?;
        Ok(Self {
            usage_url: config.usage_url.clone(),
            token_url: config.token_url.clone(),
            client_id: OAUTH_CLIENT_ID.to_string(),
        })
    }
}

/// Validate that a resolved endpoint URL uses HTTPS.
pub fn validate_endpoint(url: &str, name: &str) -> anyhow::Result<()> {
    if !url.starts_with("https://") {
        anyhow::bail!("{}: endpoint must use HTTPS, got: {}", name, url);
    }
    Ok(())
}
