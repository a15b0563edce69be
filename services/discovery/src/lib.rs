//! Agent Discovery Library
//!
//! Discovers invocable Dialogflow CX agents across regions and caches the
//! results per user with bounded staleness.

pub mod config;
pub mod discovery;

pub use config::DiscoveryConfig;
pub use discovery::{
    Credential, CredentialProvider, DiscoveryError, DiscoveryOrchestrator, DiscoveryReport,
    Region, RegionRegistry, Resource, StaticCredentialProvider,
};
