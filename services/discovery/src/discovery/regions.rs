//! Region Registry
//!
//! The fixed set of locations queried on every discovery, loaded once at
//! startup. Changing it is a configuration change.

use crate::config::DiscoveryConfig;

use super::types::Region;

/// Locations searched by default
pub const DEFAULT_REGIONS: [&str; 6] = [
    "global",
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "asia-northeast1",
];

/// Regional endpoint template
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{region}-dialogflow.googleapis.com";

/// Endpoint of the "global" location
pub const GLOBAL_ENDPOINT: &str = "https://dialogflow.googleapis.com";

pub const GLOBAL_REGION: &str = "global";

/// Immutable list of regions and their endpoints
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    regions: Vec<Region>,
    endpoint_template: String,
    global_endpoint: String,
}

impl RegionRegistry {
    /// Build a registry; duplicate codes are ignored
    pub fn new<I, S>(codes: I, endpoint_template: &str, global_endpoint: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self {
            regions: Vec::new(),
            endpoint_template: endpoint_template.to_string(),
            global_endpoint: global_endpoint.to_string(),
        };

        for code in codes {
            let code = code.into();
            if registry.resolve(&code).is_none() {
                let region = registry.build(&code);
                registry.regions.push(region);
            }
        }

        registry
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(
            config.regions.iter().cloned(),
            &config.endpoint_template,
            &config.global_endpoint,
        )
    }

    /// Every region to query, in registration order
    pub fn list_regions(&self) -> Vec<Region> {
        self.regions.clone()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Registered region with this code
    pub fn resolve(&self, code: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.code == code)
    }

    /// Registered region, or one built from the template for unlisted codes
    pub fn region_for(&self, code: &str) -> Region {
        self.resolve(code)
            .cloned()
            .unwrap_or_else(|| self.build(code))
    }

    fn build(&self, code: &str) -> Region {
        if code == GLOBAL_REGION {
            Region::new(code, self.global_endpoint.as_str())
        } else {
            Region::new(code, self.endpoint_template.as_str())
        }
    }
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGIONS, DEFAULT_ENDPOINT_TEMPLATE, GLOBAL_ENDPOINT)
    }
}
