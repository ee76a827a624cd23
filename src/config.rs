//! Configuration types for sitefetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fetch pipeline configuration
///
/// Every field has a sensible default, so `Config::default()` works out of the
/// box; CLI flags override individual fields before the pipeline starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of concurrent fetches (default: 50)
    ///
    /// Also the capacity of both relay channels, so a stalled sink exerts
    /// backpressure all the way up to the URL source.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Directory where fetched responses are written (default: "./fetched")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Per-fetch timeout in seconds (default: 30)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Delay between the first interrupt and actual cancellation (default: 5s)
    ///
    /// In-flight work is allowed to keep making progress for this long after
    /// Ctrl+C before the cancellation token fires.
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            output_dir: default_output_dir(),
            fetch_timeout: default_fetch_timeout(),
            grace_period: default_grace_period(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Validate settings that have hard lower bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("max_concurrent_fetches".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    50
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./fetched")
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_user_agent() -> String {
    format!("sitefetch/{}", env!("CARGO_PKG_VERSION"))
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
