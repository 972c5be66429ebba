//! Resolver configuration: thresholds, weights, remote-call policy and stop-word tables.
//!
//! Configuration is plain data loaded once (from defaults or a TOML file) and
//! validated before a resolver is built. Nothing here is consulted as ambient
//! global state; every component receives what it needs at construction.

use crate::error::{ConfigError, Result};
use crate::types::EntityKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

/// Generic words that carry no identity in organization names.
const ORGANIZATION_STOP_WORDS: &[&str] = &[
    "real",
    "estate",
    "agency",
    "group",
    "realty",
    "properties",
    "property",
    "pty",
    "ltd",
    "limited",
    "the",
    "and",
    "&",
];

const MAX_SEARCH_LIMIT: usize = 200;

/// Top-level configuration for an [`EntityResolver`](crate::EntityResolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Composite scores at or below this are dropped.
    pub threshold: f64,
    /// Page size requested from the primary search. Deliberately larger than
    /// the number of results a caller wants, since ranking happens client-side.
    pub search_limit: usize,
    /// Maximum OR groups the remote filter API accepts in one search.
    pub max_filter_groups: usize,
    /// How many affiliations per candidate are fetched and scored.
    pub max_affiliations: usize,
    /// Fan-out lookups allowed in flight at once.
    pub fanout_concurrency: usize,
    /// Per-request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Minimum affiliate-name score for a candidate to pass an explicit affiliate filter.
    pub affiliate_filter_threshold: f64,
    pub retry: RetryConfig,
    pub rate_limit: Option<RateLimitConfig>,
    pub weights: WeightsConfig,
    pub stop_words: StopWordConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            search_limit: 50,
            max_filter_groups: 5,
            max_affiliations: 1,
            fanout_concurrency: 4,
            request_timeout_ms: 5_000,
            affiliate_filter_threshold: 0.5,
            retry: RetryConfig::default(),
            rate_limit: Some(RateLimitConfig::default()),
            weights: WeightsConfig::default(),
            stop_words: StopWordConfig::default(),
        }
    }
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff before the attempt following `attempt` (1-based), capped.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.max(1).saturating_sub(1).min(6);
        let base = self.base_backoff_ms.saturating_mul(1 << exp);
        Duration::from_millis(base.min(self.max_backoff_ms))
    }
}

/// Token bucket applied to the remote calls of a single resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_per_sec: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub organization: OrganizationWeights,
    pub contact: ContactWeights,
}

/// Weights for "business name + location" search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationWeights {
    pub name: f64,
    pub location: f64,
}

impl Default for OrganizationWeights {
    fn default() -> Self {
        Self {
            name: 1.0,
            location: 1.0,
        }
    }
}

/// Weights for "person name + agency + phone + suburb" search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactWeights {
    pub name: f64,
    pub affiliate: f64,
    pub location: f64,
    /// Added on top of the weighted score when the phone number matches exactly.
    pub phone_bonus: f64,
}

impl Default for ContactWeights {
    fn default() -> Self {
        Self {
            name: 1.0,
            affiliate: 1.0,
            location: 0.5,
            phone_bonus: 0.5,
        }
    }
}

/// Stop words per entity kind. Person names use none by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopWordConfig {
    pub organization: Vec<String>,
    pub contact: Vec<String>,
}

impl Default for StopWordConfig {
    fn default() -> Self {
        Self {
            organization: ORGANIZATION_STOP_WORDS
                .iter()
                .map(|word| (*word).to_string())
                .collect(),
            contact: Vec::new(),
        }
    }
}

impl StopWordConfig {
    pub fn for_kind(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Organization => &self.organization,
            EntityKind::Contact => &self.contact,
        }
    }
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.threshold.is_finite() || !(0.0..1.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }

        let org = &self.weights.organization;
        let contact = &self.weights.contact;
        let weights = [
            ("weights.organization.name", org.name),
            ("weights.organization.location", org.location),
            ("weights.contact.name", contact.name),
            ("weights.contact.affiliate", contact.affiliate),
            ("weights.contact.location", contact.location),
            ("weights.contact.phone_bonus", contact.phone_bonus),
            ("affiliate_filter_threshold", self.affiliate_filter_threshold),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Weight { name, value });
            }
        }
        if org.name == 0.0 {
            return Err(ConfigError::ZeroPrimaryWeight("weights.organization.name"));
        }
        if contact.name == 0.0 {
            return Err(ConfigError::ZeroPrimaryWeight("weights.contact.name"));
        }

        let minimums = [
            ("search_limit", self.search_limit as u64),
            ("max_filter_groups", self.max_filter_groups as u64),
            ("max_affiliations", self.max_affiliations as u64),
            ("fanout_concurrency", self.fanout_concurrency as u64),
            ("request_timeout_ms", self.request_timeout_ms),
            ("retry.max_attempts", u64::from(self.retry.max_attempts)),
        ];
        for (name, value) in minimums {
            if value < 1 {
                return Err(ConfigError::TooSmall {
                    name,
                    min: 1,
                    value,
                });
            }
        }
        if self.search_limit > MAX_SEARCH_LIMIT {
            return Err(ConfigError::TooLarge {
                name: "search_limit",
                max: MAX_SEARCH_LIMIT as u64,
                value: self.search_limit as u64,
            });
        }
        // Contacts need one group per search field, so two fields must fit at least once.
        if self.max_filter_groups < 2 {
            return Err(ConfigError::TooSmall {
                name: "max_filter_groups",
                min: 2,
                value: self.max_filter_groups as u64,
            });
        }

        if let Some(rate) = &self.rate_limit {
            if !rate.capacity.is_finite() || rate.capacity < 1.0 {
                return Err(ConfigError::RateLimit("rate_limit.capacity"));
            }
            if !rate.refill_per_sec.is_finite() || rate.refill_per_sec <= 0.0 {
                return Err(ConfigError::RateLimit("rate_limit.refill_per_sec"));
            }
        }

        let lists = [
            ("stop_words.organization", &self.stop_words.organization),
            ("stop_words.contact", &self.stop_words.contact),
        ];
        for (name, words) in lists {
            if words
                .iter()
                .any(|word| word.trim().is_empty() || word.split_whitespace().count() > 1)
            {
                return Err(ConfigError::StopWord(name));
            }
        }

        Ok(())
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to parse resolver config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file. A leading `~` is expanded.
    pub fn load(path: &str) -> Result<Self> {
        let path = expand_tilde(path);
        let source = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read resolver config at {}", path))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("Invalid resolver config at {}", path))?;
        tracing::debug!("Loaded resolver config from {}", path);
        Ok(config)
    }

    /// Load the config at [`default_config_path`], or the defaults when it does not exist.
    pub fn load_or_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path.display().to_string()),
            _ => Ok(Self::default()),
        }
    }
}

/// `<user config dir>/entity-resolve/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("entity-resolve").join("config.toml"))
}

/// Expands tilde (`~`) in a path to the user's home directory.
///
/// Returns `Cow::Borrowed` if no expansion needed, `Cow::Owned` if expanded.
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped).display().to_string());
        }
    } else if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return Cow::Owned(home.display().to_string());
    }
    Cow::Borrowed(path)
}
