//! CLI configuration.
//!
//! Everything lives in one `config.toml`, by default at
//! `~/.config/icsfeed/config.toml`:
//!
//! ```toml
//! [defaults]
//! days = 7
//! floating_timezone = "Europe/Paris"
//!
//! [http]
//! timeout_secs = 30
//!
//! [[feeds]]
//! name = "team"
//! url = "https://example.com/team.ics"
//! headers = { Authorization = "env::TEAM_FEED_TOKEN" }
//! ```
//!
//! Header values support secret references, see [`crate::secret`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use icsfeed_source::SourceInput;
use icsfeed_source::ics::{ExpanderOptions, HttpTransportConfig, ICS_FORMAT};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::secret;

/// Configuration for the icsfeed CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Defaults for `icsfeed events`.
    pub defaults: DefaultSettings,
    /// HTTP client settings.
    pub http: HttpSettings,
    /// Named feeds.
    pub feeds: Vec<FeedSettings>,
}

/// Defaults applied when the command line does not say otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    /// Number of days shown, starting today.
    pub days: u32,
    /// IANA zone for floating times and unknown TZIDs (UTC when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floating_timezone: Option<String>,
    /// Cap on rule-generated dates per series and query.
    pub max_iterations: u16,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            days: 7,
            floating_timezone: None,
            max_iterations: ExpanderOptions::DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User-Agent override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: HttpTransportConfig::DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            verify_tls: true,
        }
    }
}

impl HttpSettings {
    /// Builds the transport settings.
    pub fn to_transport_config(&self) -> HttpTransportConfig {
        let mut config =
            HttpTransportConfig::default().with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(ref agent) = self.user_agent {
            config = config.with_user_agent(agent.clone());
        }
        if !self.verify_tls {
            config = config.with_insecure_tls();
        }
        config
    }
}

/// A named ICS feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Name used with `--feed`.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Extra request headers; values may be secret references.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl FeedSettings {
    /// Builds the host input for this feed, resolving secret references.
    pub fn to_source_input(&self) -> Result<SourceInput, String> {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| {
                secret::resolve(value)
                    .map(|v| (name.clone(), v))
                    .map_err(|e| format!("feed `{}`, header `{}`: {}", self.name, name, e))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(source_input(&self.url, &headers))
    }
}

/// Builds an ICS host input for `url` with already resolved headers.
pub fn source_input(url: &str, headers: &BTreeMap<String, String>) -> SourceInput {
    let input = SourceInput::new(url, ICS_FORMAT);
    if headers.is_empty() {
        return input;
    }
    let headers = headers
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect::<serde_json::Map<_, _>>();
    input.with_extra_param("headers", serde_json::Value::Object(headers))
}

impl CliConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("icsfeed")
    }

    /// Looks up a feed by name.
    pub fn find_feed(&self, name: &str) -> Option<&FeedSettings> {
        self.feeds.iter().find(|f| f.name == name)
    }

    /// Zone used for floating times.
    pub fn floating_zone(&self) -> Result<Tz, String> {
        match self.defaults.floating_timezone.as_deref() {
            Some(name) => parse_zone(name),
            None => Ok(Tz::UTC),
        }
    }

    /// Checks everything that can be checked without network access.
    ///
    /// Secret references are not resolved.
    pub fn validate(&self) -> Result<(), String> {
        if self.defaults.days == 0 {
            return Err("defaults.days must be at least 1".to_string());
        }
        if self.http.timeout_secs == 0 {
            return Err("http.timeout_secs must be at least 1".to_string());
        }
        self.floating_zone()?;

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(format!("feed with url `{}` has no name", feed.url));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(format!("feed `{}` is defined more than once", feed.name));
            }
            let url = Url::parse(&feed.url)
                .map_err(|e| format!("feed `{}` has an invalid url: {}", feed.name, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!(
                    "feed `{}` must use http or https, not `{}`",
                    feed.name,
                    url.scheme()
                ));
            }
            if let Some(name) = feed.headers.keys().find(|k| k.trim().is_empty()) {
                return Err(format!("feed `{}` has an empty header name `{}`", feed.name, name));
            }
        }
        Ok(())
    }
}

/// Parses an IANA zone name.
pub fn parse_zone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("unknown timezone `{}`", name))
}
