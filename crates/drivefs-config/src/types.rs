use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default interval between change-feed polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of records requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Largest page size the remote listing endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Default retry attempts for a failed poll.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between poll retries.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of incremental polls between forced full refreshes.
pub const DEFAULT_FULL_REFRESH_EVERY: u32 = 60;

/// Default attribute cache TTL handed to the kernel.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FS_NAME: &str = "drivefs";

/// Default log level when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linearly increasing delay
    Linear,
    /// Exponentially increasing delay
    #[default]
    Exponential,
}

/// Human-readable duration (e.g., "200ms", "5m", "1h").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl Default for HumanDuration {
    fn default() -> Self {
        HumanDuration(Duration::from_secs(0))
    }
}

impl HumanDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(d: Duration) -> Self {
        HumanDuration(d)
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
            (n, "ms")
        } else if let Some(n) = s.strip_suffix('s') {
            (n, "s")
        } else if let Some(n) = s.strip_suffix('m') {
            (n, "m")
        } else if let Some(n) = s.strip_suffix('h') {
            (n, "h")
        } else if let Some(n) = s.strip_suffix('d') {
            (n, "d")
        } else {
            return Err(format!("Invalid duration format: {}", s));
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num * 60),
            "h" => Duration::from_secs(num * 3600),
            "d" => Duration::from_secs(num * 86400),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let millis = self.0.as_millis();

        if millis < 1000 || millis % 1000 != 0 {
            write!(f, "{}ms", millis)
        } else if secs < 60 || secs % 60 != 0 {
            write!(f, "{}s", secs)
        } else if secs < 3600 || secs % 3600 != 0 {
            write!(f, "{}m", secs / 60)
        } else if secs < 86400 || secs % 86400 != 0 {
            write!(f, "{}h", secs / 3600)
        } else {
            write!(f, "{}d", secs / 86400)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Remote account and credential settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountConfig {
    /// Account email, used to name the credentials file.
    #[serde(default)]
    pub email: Option<String>,
    /// Where OAuth tokens are persisted.
    #[serde(default)]
    pub credentials_file: Option<String>,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Override for the API base URL (testing against a local fake).
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Metadata synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub poll_interval: Option<HumanDuration>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub include_trashed: bool,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff: Option<HumanDuration>,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Incremental polls between full refreshes; 0 disables forced refreshes.
    #[serde(default)]
    pub full_refresh_every: Option<u32>,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .as_ref()
            .map(HumanDuration::as_duration)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
            .as_ref()
            .map(HumanDuration::as_duration)
            .unwrap_or(DEFAULT_RETRY_BACKOFF)
    }

    pub fn full_refresh_every(&self) -> u32 {
        self.full_refresh_every.unwrap_or(DEFAULT_FULL_REFRESH_EVERY)
    }
}

/// FUSE mount settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MountConfig {
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub fs_name: Option<String>,
    #[serde(default)]
    pub allow_other: bool,
    #[serde(default)]
    pub attr_ttl: Option<HumanDuration>,
}

impl MountConfig {
    pub fn fs_name(&self) -> &str {
        self.fs_name.as_deref().unwrap_or(DEFAULT_FS_NAME)
    }

    pub fn attr_ttl(&self) -> Duration {
        self.attr_ttl
            .as_ref()
            .map(HumanDuration::as_duration)
            .unwrap_or(DEFAULT_ATTR_TTL)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

/// Top-level drivefs configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriveFsConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
