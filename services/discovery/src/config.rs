//! Discovery Configuration
//!
//! Defaults are one hour TTLs over six Dialogflow CX locations. Every
//! field can be overridden with a `DISCOVERY_*` environment variable.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::discovery::error::ConfigError;
use crate::discovery::regions::{DEFAULT_ENDPOINT_TEMPLATE, DEFAULT_REGIONS, GLOBAL_ENDPOINT};
use crate::discovery::types::REGION_PLACEHOLDER;

/// Configuration for the discovery core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Region codes queried on every discovery
    pub regions: Vec<String>,
    /// Endpoint template for regional locations
    pub endpoint_template: String,
    /// Endpoint used for the "global" location
    pub global_endpoint: String,
    /// Resource list cache TTL in seconds
    pub resource_ttl_secs: u64,
    /// Access flag cache TTL in seconds
    pub access_ttl_secs: u64,
    /// Max concurrent region list calls (None = unbounded)
    pub list_concurrency: Option<usize>,
    /// Max concurrent access probes (None = unbounded)
    pub probe_concurrency: Option<usize>,
    /// Budget for one region list call in seconds
    pub list_timeout_secs: u64,
    /// Budget for one access probe in seconds
    pub probe_timeout_secs: u64,
    /// Request timeout of the shared HTTP client in seconds
    pub http_timeout_secs: u64,
    /// Agents requested per list page
    pub page_size: u32,
    /// Most list pages followed per region
    pub max_pages: usize,
    /// Resource cache capacity (None = unbounded)
    pub max_resource_entries: Option<usize>,
    /// Access cache capacity (None = unbounded)
    pub max_access_entries: Option<usize>,
    /// Background sweep interval in seconds (None = lazy expiry only)
    pub sweep_interval_secs: Option<u64>,
    /// Text sent by the minimal invoke call
    pub probe_text: String,
    pub language_code: String,
    /// Whether `refresh` also drops the user's access flags
    pub refresh_clears_access: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            global_endpoint: GLOBAL_ENDPOINT.to_string(),
            resource_ttl_secs: 3600,
            access_ttl_secs: 3600,
            list_concurrency: Some(8),
            probe_concurrency: Some(16),
            list_timeout_secs: 10,
            probe_timeout_secs: 10,
            http_timeout_secs: 30,
            page_size: 100,
            max_pages: 1000,
            max_resource_entries: None,
            max_access_entries: None,
            sweep_interval_secs: None,
            probe_text: "test".to_string(),
            language_code: "en".to_string(),
            refresh_clears_access: true,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from `DISCOVERY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let regions = match lookup("DISCOVERY_REGIONS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.regions,
        };

        let config = Self {
            regions,
            endpoint_template: lookup("DISCOVERY_ENDPOINT_TEMPLATE")
                .unwrap_or(defaults.endpoint_template),
            global_endpoint: lookup("DISCOVERY_GLOBAL_ENDPOINT").unwrap_or(defaults.global_endpoint),
            resource_ttl_secs: parse_var(&lookup, "DISCOVERY_RESOURCE_TTL_SECS", defaults.resource_ttl_secs)?,
            access_ttl_secs: parse_var(&lookup, "DISCOVERY_ACCESS_TTL_SECS", defaults.access_ttl_secs)?,
            list_concurrency: parse_limit(&lookup, "DISCOVERY_LIST_CONCURRENCY", defaults.list_concurrency)?,
            probe_concurrency: parse_limit(&lookup, "DISCOVERY_PROBE_CONCURRENCY", defaults.probe_concurrency)?,
            list_timeout_secs: parse_var(&lookup, "DISCOVERY_LIST_TIMEOUT_SECS", defaults.list_timeout_secs)?,
            probe_timeout_secs: parse_var(&lookup, "DISCOVERY_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs)?,
            http_timeout_secs: parse_var(&lookup, "DISCOVERY_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            page_size: parse_var(&lookup, "DISCOVERY_PAGE_SIZE", defaults.page_size)?,
            max_pages: parse_var(&lookup, "DISCOVERY_MAX_PAGES", defaults.max_pages)?,
            max_resource_entries: parse_limit(&lookup, "DISCOVERY_MAX_RESOURCE_ENTRIES", defaults.max_resource_entries)?,
            max_access_entries: parse_limit(&lookup, "DISCOVERY_MAX_ACCESS_ENTRIES", defaults.max_access_entries)?,
            sweep_interval_secs: parse_limit(&lookup, "DISCOVERY_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            probe_text: lookup("DISCOVERY_PROBE_TEXT").unwrap_or(defaults.probe_text),
            language_code: lookup("DISCOVERY_LANGUAGE_CODE").unwrap_or(defaults.language_code),
            refresh_clears_access: parse_var(&lookup, "DISCOVERY_REFRESH_CLEARS_ACCESS", defaults.refresh_clears_access)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the discovery core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.is_empty() {
            return Err(ConfigError::Invalid("at least one region is required".to_string()));
        }
        if !self.endpoint_template.contains(REGION_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "endpoint template {:?} must contain {}",
                self.endpoint_template, REGION_PLACEHOLDER
            )));
        }
        if self.resource_ttl_secs == 0 || self.access_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache TTLs must be non-zero".to_string()));
        }
        if self.list_timeout_secs == 0 || self.probe_timeout_secs == 0 || self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call timeouts must be non-zero".to_string()));
        }
        if self.page_size == 0 || self.max_pages == 0 {
            return Err(ConfigError::Invalid("page size and page limit must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn resource_ttl(&self) -> Duration {
        Duration::from_secs(self.resource_ttl_secs)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Optional positive limit; "0", "none" and "unbounded" disable it
fn parse_limit<F, T>(lookup: &F, var: &str, default: Option<T>) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };

    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("unbounded") {
        return Ok(None);
    }

    let value: T = trimmed.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })?;

    if value == T::default() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}
