use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingApiKey(&'static str),
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Everything needed to talk to the generation endpoint.
pub struct ChatConfig {
    api_key: String,
    pub model: String,
    pub base_url: Url,
    /// `None` leaves the request without a timeout.
    pub timeout: Option<Duration>,
}

impl ChatConfig {
    /// Reads the credential from the environment. Call after `.env` is loaded.
    pub fn from_env(model: &str, base_url: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        Self::from_parts(env::var(API_KEY_VAR).ok(), model, base_url, timeout_secs)
    }

    pub fn from_parts(
        api_key: Option<String>,
        model: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_VAR))?;

        let parsed = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: parsed,
            timeout,
        })
    }

    /// `{base}/v1beta/models/{model}:generateContent?key={api_key}`
    ///
    /// Carries the credential, so never log the result.
    pub fn endpoint(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1beta", "models", format!("{}:generateContent", self.model).as_str()]);
        }
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }
}
