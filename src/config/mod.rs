use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::prompts::Locale;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub interview: InterviewConfig,
    pub rate_limit: RateLimitConfig,
}

/// Language-model gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    pub auth: AuthConfig,
}

/// How the gateway authenticates upstream
#[derive(Debug, Clone, PartialEq)]
pub enum AuthConfig {
    /// Static API key sent on every request.
    ApiKey(String),
    /// Short-lived bearer tokens minted from a refresh token.
    OAuth {
        token_url: String,
        client_id: String,
        refresh_token: String,
    },
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Interview policy configuration
#[derive(Debug, Clone)]
pub struct InterviewConfig {
    /// Maximum number of sessions a single owner may hold.
    pub session_quota: u32,
    pub default_locale: Locale,
}

/// Per-caller request ceilings, one per endpoint class
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub chat_per_window: u64,
    pub analysis_per_window: u64,
    pub default_per_window: u64,
    pub cache_max_entries: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let auth = match (
            env::var("LLM_OAUTH_TOKEN_URL"),
            env::var("LLM_OAUTH_CLIENT_ID"),
            env::var("LLM_OAUTH_REFRESH_TOKEN"),
        ) {
            (Ok(token_url), Ok(client_id), Ok(refresh_token)) => AuthConfig::OAuth {
                token_url,
                client_id,
                refresh_token,
            },
            _ => AuthConfig::ApiKey(env::var("LLM_API_KEY").map_err(|_| AppError::Config {
                message: "LLM_API_KEY is required when OAuth credentials are not configured"
                    .to_string(),
            })?),
        };

        let gateway = GatewayConfig {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            api_version: env::var("LLM_API_VERSION").unwrap_or_else(|_| "2023-06-01".to_string()),
            auth,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/interviews.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 120_000),
            max_retries: parse_env("MAX_RETRIES", 2),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let interview = InterviewConfig {
            session_quota: parse_env("SESSION_QUOTA", 50),
            default_locale: env::var("DEFAULT_LOCALE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        };

        let rate_limit = RateLimitConfig {
            window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 60),
            chat_per_window: parse_env("RATE_LIMIT_CHAT", 30),
            analysis_per_window: parse_env("RATE_LIMIT_ANALYSIS", 10),
            default_per_window: parse_env("RATE_LIMIT_DEFAULT", 120),
            cache_max_entries: parse_env("CACHE_MAX_ENTRIES", 10_000),
        };

        Ok(Config {
            gateway,
            database,
            logging,
            request,
            interview,
            rate_limit,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            session_quota: 50,
            default_locale: Locale::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            chat_per_window: 30,
            analysis_per_window: 10,
            default_per_window: 120,
            cache_max_entries: 10_000,
        }
    }
}
