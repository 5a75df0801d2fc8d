//! OAuth2 client-credentials tokens for Resource Manager.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{AzureClientError, api_error};

/// Scope requested for Resource Manager tokens.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3599);
const REFRESH_MARGIN: Duration = Duration::from_secs(120);

/// Service principal credentials.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Directory (tenant) identifier.
    pub tenant_id: String,
    /// Application (client) identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Authority host, for example `https://login.microsoftonline.com`.
    pub authority_host: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl ClientCredentials {
    /// Token endpoint for the tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[derive(Clone, Debug)]
pub(crate) struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    pub(crate) fn new(value: String, lifetime: Duration, now: Instant) -> Self {
        Self {
            value,
            expires_at: now + lifetime,
        }
    }

    /// Tokens are refreshed a little before they expire.
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Caches one bearer token behind an async mutex so concurrent requests
/// share a single refresh.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Returns a valid bearer token, requesting a new one when the cached
    /// token is missing or close to expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AzureClientError::Auth`] when the token endpoint rejects the
    /// credentials or answers with an unreadable body.
    pub async fn bearer(
        &self,
        http: &reqwest::Client,
        credentials: &ClientCredentials,
    ) -> Result<String, AzureClientError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref()
            && token.is_fresh(Instant::now())
        {
            return Ok(token.value.clone());
        }

        debug!(tenant = %credentials.tenant_id, "requesting management token");
        let response = http
            .post(credentials.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await
            .map_err(|err| AzureClientError::Auth(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| AzureClientError::Auth(err.to_string()))?;
        if !status.is_success() {
            return Err(AzureClientError::Auth(
                api_error(status.as_u16(), &text).to_string(),
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&text)
            .map_err(|err| AzureClientError::Auth(format!("unreadable token response: {err}")))?;
        let lifetime = parsed
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
        let token = CachedToken::new(parsed.access_token, lifetime, Instant::now());
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }
}
