//! Fixed-window request limiting per caller and endpoint class.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::ExpiringStore;
use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};

/// Endpoint classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Conversational turns (gateway-bound, cheap per call).
    Chat,
    /// Analysis stages and cross-analysis (gateway-bound, expensive).
    Analysis,
    /// Everything else.
    Default,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Chat => "chat",
            EndpointClass::Analysis => "analysis",
            EndpointClass::Default => "default",
        }
    }
}

/// Counts requests per (caller, class) in the injected store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ExpiringStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ExpiringStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn limit_for(&self, class: EndpointClass) -> u64 {
        match class {
            EndpointClass::Chat => self.config.chat_per_window,
            EndpointClass::Analysis => self.config.analysis_per_window,
            EndpointClass::Default => self.config.default_per_window,
        }
    }

    /// Record one request and fail once the caller exceeds the class budget.
    pub async fn check(&self, caller_key: &str, class: EndpointClass) -> AppResult<()> {
        let key = format!("rl:{}:{}", class.as_str(), caller_key);
        let window = Duration::from_secs(self.config.window_secs.max(1));
        let count = self.store.increment(&key, window).await;
        let limit = self.limit_for(class);

        if count > limit {
            warn!(
                caller = %caller_key,
                class = class.as_str(),
                count,
                limit,
                "Rate limit exceeded"
            );
            return Err(AppError::ResourceExhausted {
                message: format!(
                    "Too many {} requests; retry after {}s",
                    class.as_str(),
                    self.config.window_secs
                ),
            });
        }
        Ok(())
    }
}
