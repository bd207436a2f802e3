use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::core::credentials::Credentials;
use crate::core::endpoints::Endpoints;
use crate::core::error::{truncate_body, FetchError};
use crate::core::http::Transport;

#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// seconds
    expires_in: Option<i64>,
}

/// Exchange `refresh_token` for a new token pair.
///
/// Returns `current` with the three token fields replaced; every other field of
/// the stored record is kept. Nothing is persisted here.
pub async fn refresh_credentials(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    current: &Credentials,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<Credentials, FetchError> {
    let body = json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
        "client_id": endpoints.client_id,
    });

    let response = transport.post_json(&endpoints.token_url, &body).await?;
    if response.status != 200 {
        return Err(FetchError::RefreshFailed(format!(
            "HTTP {}: {}",
            response.status,
            truncate_body(&response.body)
        )));
    }

    let token: TokenRefreshResponse = serde_json::from_str(&response.body).map_err(|_| {
        FetchError::RefreshFailed(format!(
            "invalid JSON from token endpoint: {}",
            truncate_body(&response.body)
        ))
    })?;

    let access_token = token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            FetchError::RefreshFailed(format!(
                "response missing access_token: {}",
                truncate_body(&response.body)
            ))
        })?;

    let mut refreshed = current.clone();
    refreshed.access_token = access_token;
    // Refresh tokens rotate; keep the old one only if the server sent none.
    if let Some(rotated) = token.refresh_token.filter(|t| !t.is_empty()) {
        refreshed.refresh_token = Some(rotated);
    }
    refreshed.expires_at = token
        .expires_in
        .map(|secs| now.timestamp_millis() + secs * 1000);

    tracing::info!(
        expires_in = token.expires_in,
        "Token refreshed"
    );
    Ok(refreshed)
}
