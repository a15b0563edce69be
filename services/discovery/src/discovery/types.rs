//! Discovery Types
//!
//! Regions, resources and the opaque user credential that flow through
//! the discovery pipeline.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the region code in endpoint templates
pub const REGION_PLACEHOLDER: &str = "{region}";

/// One independent partition of the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Region code (e.g., "global", "us-central1")
    pub code: String,
    /// Base URL template; `{region}` is replaced with `code`
    pub endpoint_template: String,
}

impl Region {
    pub fn new(code: impl Into<String>, endpoint_template: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            endpoint_template: endpoint_template.into(),
        }
    }

    /// Base URL for this region, without a trailing slash
    pub fn endpoint(&self) -> String {
        self.endpoint_template
            .replace(REGION_PLACEHOLDER, &self.code)
            .trim_end_matches('/')
            .to_string()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// A resource as returned by a regional list call, before its
/// invoke rights have been checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    /// Full resource name, globally unique across regions
    pub id: String,
    pub display_name: String,
    pub region_code: String,
}

impl DiscoveredResource {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        region_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            region_code: region_code.into(),
        }
    }

    /// Attach the resolved invoke-rights flag
    pub fn annotate(self, accessible: bool) -> Resource {
        Resource {
            id: self.id,
            display_name: self.display_name,
            region_code: self.region_code,
            accessible,
        }
    }
}

/// A discovered resource annotated with whether the current user may invoke it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub display_name: String,
    pub region_code: String,
    pub accessible: bool,
}

impl Resource {
    /// Trailing agent id of the full resource name
    pub fn short_id(&self) -> Option<&str> {
        short_id_of(&self.id)
    }
}

/// Location segment of `projects/{p}/locations/{loc}/agents/{id}`
pub fn location_of(resource_id: &str) -> Option<&str> {
    let mut parts = resource_id.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("projects"), Some(_), Some("locations"), Some(location)) if !location.is_empty() => {
            Some(location)
        }
        _ => None,
    }
}

/// Agent id segment of `projects/{p}/locations/{loc}/agents/{id}`
pub fn short_id_of(resource_id: &str) -> Option<&str> {
    let parts: Vec<&str> = resource_id.split('/').collect();
    if parts.len() >= 6 && parts[parts.len() - 2] == "agents" {
        parts.last().copied().filter(|id| !id.is_empty())
    } else {
        None
    }
}

/// Opaque bearer credential for one user
///
/// Owned by the token provider; discovery only borrows it for the
/// duration of a call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}
