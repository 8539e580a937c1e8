//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the token-authenticated API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// OAuth access token, required and non-empty
    pub access_token: String,

    /// Base URL for the REST API (default: <https://api.instagram.com/v1>)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL for the OAuth endpoints (default: <https://api.instagram.com/oauth>)
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Rate-limit and anomaly-retry pacing
    #[serde(default)]
    pub pacing: Pacing,
}

/// Configuration for the unauthenticated scraping client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Base URL of the public site (default: <https://www.instagram.com>)
    #[serde(default = "default_web_url")]
    pub base_url: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Rate-limit and anomaly-retry pacing
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_api_url() -> String {
    "https://api.instagram.com/v1".into()
}

fn default_oauth_url() -> String {
    "https://api.instagram.com/oauth".into()
}

fn default_web_url() -> String {
    "https://www.instagram.com".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Pacing policy for rate-limit cooldowns and cursor-anomaly retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pacing {
    /// Cooldown before re-issuing a rate-limited request, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Ceiling on cooldown cycles per request. `None` retries forever,
    /// matching the remote limit window's assumed reset.
    #[serde(default)]
    pub max_cooldown_cycles: Option<u32>,

    /// Lower bound of the cursor-anomaly retry delay, in seconds
    #[serde(default = "default_anomaly_min_secs")]
    pub anomaly_min_secs: u64,

    /// Upper bound of the cursor-anomaly retry delay, in seconds
    #[serde(default = "default_anomaly_max_secs")]
    pub anomaly_max_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_anomaly_min_secs() -> u64 {
    10
}

fn default_anomaly_max_secs() -> u64 {
    60
}

impl Pacing {
    /// Cooldown interval as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            max_cooldown_cycles: None,
            anomaly_min_secs: default_anomaly_min_secs(),
            anomaly_max_secs: default_anomaly_max_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_url: default_api_url(),
            oauth_url: default_oauth_url(),
            timeout: default_timeout(),
            pacing: Pacing::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            base_url: default_web_url(),
            timeout: default_timeout(),
            pacing: Pacing::default(),
        }
    }
}
