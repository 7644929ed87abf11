//! Upstream credentials for the gateway.
//!
//! API keys are static. OAuth access tokens are minted from a refresh token
//! and cached in the injected [`ExpiringStore`] until shortly before expiry.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::TokenResponse;
use crate::cache::ExpiringStore;
use crate::config::AuthConfig;
use crate::error::{GatewayError, GatewayResult};

/// Seconds shaved off a token's lifetime so it is never used at the edge.
const EXPIRY_SKEW_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Header carrying a credential.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthHeader {
    pub name: &'static str,
    pub value: String,
}

/// Resolves credentials for each upstream request.
#[derive(Clone)]
pub struct Authenticator {
    config: AuthConfig,
    http: Client,
    cache: Arc<dyn ExpiringStore>,
    /// Latest refresh token; providers may rotate it on every grant.
    refresh_token: Arc<RwLock<Option<String>>>,
}

impl Authenticator {
    pub fn new(config: AuthConfig, http: Client, cache: Arc<dyn ExpiringStore>) -> Self {
        let refresh_token = match &config {
            AuthConfig::OAuth { refresh_token, .. } => Some(refresh_token.clone()),
            AuthConfig::ApiKey(_) => None,
        };
        Self {
            config,
            http,
            cache,
            refresh_token: Arc::new(RwLock::new(refresh_token)),
        }
    }

    /// Whether a rejected credential can be renewed.
    pub fn is_token_based(&self) -> bool {
        matches!(self.config, AuthConfig::OAuth { .. })
    }

    fn cache_key(&self) -> String {
        match &self.config {
            AuthConfig::OAuth { client_id, .. } => format!("gateway:access_token:{}", client_id),
            AuthConfig::ApiKey(_) => "gateway:api_key".to_string(),
        }
    }

    /// Header for the next request, minting a token if none is cached.
    pub async fn header(&self) -> GatewayResult<AuthHeader> {
        match &self.config {
            AuthConfig::ApiKey(key) => Ok(AuthHeader {
                name: "x-api-key",
                value: key.clone(),
            }),
            AuthConfig::OAuth { .. } => {
                let token = match self.cache.get(&self.cache_key()).await {
                    Some(token) => token,
                    None => self.refresh().await?,
                };
                Ok(AuthHeader {
                    name: "Authorization",
                    value: format!("Bearer {}", token),
                })
            }
        }
    }

    /// Drop the cached access token so the next [`header`](Self::header) mints one.
    pub async fn invalidate(&self) {
        debug!("Invalidating cached access token");
        self.cache.remove(&self.cache_key()).await;
    }

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self) -> GatewayResult<String> {
        let (token_url, client_id) = match &self.config {
            AuthConfig::OAuth {
                token_url,
                client_id,
                ..
            } => (token_url, client_id),
            AuthConfig::ApiKey(key) => return Ok(key.clone()),
        };

        let refresh_token = self
            .refresh_token
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::AuthExpired {
                message: "No refresh token available".to_string(),
            })?;

        info!(client_id = %client_id, "Refreshing gateway access token");

        let response = self
            .http
            .post(token_url)
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "client_id": client_id,
            }))
            .send()
            .await
            .map_err(GatewayError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token refresh rejected");
            return Err(GatewayError::AuthExpired {
                message: format!("Token refresh failed ({}): {}", status.as_u16(), body),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    message: format!("Failed to parse token response: {}", e),
                })?;

        if let Some(rotated) = token.refresh_token {
            *self.refresh_token.write().await = Some(rotated);
        }

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let ttl = Duration::from_secs(lifetime.saturating_sub(EXPIRY_SKEW_SECS).max(1));
        self.cache
            .put(&self.cache_key(), token.access_token.clone(), ttl)
            .await;

        Ok(token.access_token)
    }
}
