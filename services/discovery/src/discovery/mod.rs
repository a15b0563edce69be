//! Agent Discovery & Access-Control Cache
//!
//! Finds which conversational agents a user may invoke across the regional
//! Dialogflow CX endpoints, without re-querying the service on every call.
//!
//! ## Architecture
//!
//! - **Region Registry**: fixed set of locations and their endpoints
//! - **Resource Lister**: one list call per region
//! - **Access Probe**: minimal invoke call per agent, deny on ambiguity
//! - **Fan-Out**: bounded concurrent gather with per-item failure isolation
//! - **Caches**: TTL memo of resource lists and access flags
//! - **Orchestrator**: composes the above behind `discover`/`refresh`

pub mod cache;
pub mod credentials;
pub mod error;
pub mod fan_out;
pub mod http;
pub mod lister;
pub mod orchestrator;
pub mod probe;
pub mod regions;
pub mod types;

pub use cache::{AccessCache, AccessKey, CacheEntry, CacheStats, ResourceCache, ResourceKey, TtlCache};
pub use credentials::{CredentialProvider, StaticCredentialProvider};
pub use error::{ConfigError, DiscoveryError, RemoteError};
pub use fan_out::{fan_out, FanOut};
pub use lister::{DialogflowLister, ResourceLister};
pub use orchestrator::{merge_by_id, DiscoveryOrchestrator, DiscoveryReport};
pub use probe::{access_from_outcome, AccessProbe, DialogflowProbe};
pub use regions::RegionRegistry;
pub use types::{Credential, DiscoveredResource, Region, Resource};
