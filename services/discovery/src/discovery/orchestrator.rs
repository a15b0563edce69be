//! Discovery Orchestrator
//!
//! Public entry point: cache-first lookup, regional fan-out listing,
//! per-resource access resolution and manual invalidation.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;

use super::cache::{AccessCache, AccessKey, ResourceCache, ResourceKey};
use super::credentials::CredentialProvider;
use super::error::{ConfigError, DiscoveryError, RemoteError};
use super::fan_out::FanOut;
use super::http::build_client;
use super::lister::{DialogflowLister, ResourceLister};
use super::probe::{AccessProbe, DialogflowProbe};
use super::regions::RegionRegistry;
use super::types::{short_id_of, Credential, DiscoveredResource, Region, Resource};

/// Outcome of one discovery call, for callers that need to tell
/// "no resources exist" apart from "every region failed"
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub resources: Vec<Resource>,
    /// Served from the resource cache without remote calls
    pub from_cache: bool,
    pub regions_queried: usize,
    /// Region codes whose list call failed or timed out
    pub regions_failed: Vec<String>,
    /// Access probes actually sent (access cache misses)
    pub probes_issued: usize,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl DiscoveryReport {
    fn cached(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            from_cache: true,
            regions_queried: 0,
            regions_failed: Vec::new(),
            probes_issued: 0,
            completed_at: chrono::Utc::now(),
        }
    }

    pub fn all_regions_failed(&self) -> bool {
        self.regions_queried > 0 && self.regions_failed.len() == self.regions_queried
    }
}

/// Merged result of listing every region
struct RegionListing {
    resources: Vec<DiscoveredResource>,
    queried: usize,
    failed: Vec<String>,
}

/// How an access flag was obtained
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Cached(bool),
    Probed(bool),
}

impl Resolution {
    fn accessible(self) -> bool {
        match self {
            Resolution::Cached(flag) | Resolution::Probed(flag) => flag,
        }
    }
}

/// Discovers which agents a user may invoke, memoised per user
pub struct DiscoveryOrchestrator {
    registry: RegionRegistry,
    lister: Arc<dyn ResourceLister>,
    probe: Arc<dyn AccessProbe>,
    resources: Arc<ResourceCache>,
    access: Arc<AccessCache>,
    list_fan_out: FanOut,
    probe_fan_out: FanOut,
    list_timeout: Duration,
    probe_timeout: Duration,
    refresh_clears_access: bool,
    sweepers: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryOrchestrator {
    /// Compose an orchestrator; rejects configurations that would never
    /// hit the cache or would deny every probe
    pub fn new(
        config: &DiscoveryConfig,
        registry: RegionRegistry,
        lister: Arc<dyn ResourceLister>,
        probe: Arc<dyn AccessProbe>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ConfigError::Invalid("region registry is empty".to_string()));
        }

        let resources = ResourceCache::new("resource", config.resource_ttl())
            .with_max_entries(config.max_resource_entries);
        let access = AccessCache::new("access", config.access_ttl())
            .with_max_entries(config.max_access_entries);

        Ok(Self {
            registry,
            lister,
            probe,
            resources: Arc::new(resources),
            access: Arc::new(access),
            list_fan_out: FanOut::new(config.list_concurrency),
            probe_fan_out: FanOut::new(config.probe_concurrency),
            list_timeout: config.list_timeout(),
            probe_timeout: config.probe_timeout(),
            refresh_clears_access: config.refresh_clears_access,
            sweepers: Mutex::new(Vec::new()),
        })
    }

    /// Orchestrator backed by the Dialogflow CX REST API
    pub fn dialogflow(config: &DiscoveryConfig) -> anyhow::Result<Self> {
        let http_client = build_client(config.http_timeout())?;
        let registry = RegionRegistry::from_config(config);
        let lister = DialogflowLister::new(http_client.clone())
            .with_page_size(config.page_size)
            .with_max_pages(config.max_pages);
        let probe = DialogflowProbe::new(http_client, registry.clone())
            .with_query(&config.probe_text, &config.language_code);
        let regions = registry.len();

        let orchestrator = Self::new(config, registry, Arc::new(lister), Arc::new(probe))?;

        info!(
            regions,
            resource_ttl_secs = config.resource_ttl_secs,
            access_ttl_secs = config.access_ttl_secs,
            "Discovery orchestrator initialized"
        );
        Ok(orchestrator)
    }

    pub fn resource_cache(&self) -> &ResourceCache {
        &self.resources
    }

    pub fn access_cache(&self) -> &AccessCache {
        &self.access
    }

    /// Sweep expired entries from both caches in the background.
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeping(&self, every: Duration) {
        let mut sweepers = self
            .sweepers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sweepers.push(self.resources.spawn_sweeper(every));
        sweepers.push(self.access.spawn_sweeper(every));
        info!(every_secs = every.as_secs(), "Cache sweeping started");
    }

    /// Stop background sweepers
    pub fn shutdown(&self) {
        let mut sweepers = self
            .sweepers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handle in sweepers.drain(..) {
            handle.abort();
        }
    }

    /// Resources visible to `user_id` in `project_id`, each annotated
    /// with whether the user may invoke it
    ///
    /// Remote failures never surface here: a failed region contributes
    /// nothing and a failed probe marks its resource inaccessible, so a
    /// total failure yields an empty list.
    pub async fn discover(
        &self,
        credential: &Credential,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<Resource>, DiscoveryError> {
        Ok(self
            .discover_detailed(credential, user_id, project_id)
            .await?
            .resources)
    }

    /// `discover` plus diagnostics about what was queried and what failed
    pub async fn discover_detailed(
        &self,
        credential: &Credential,
        user_id: &str,
        project_id: &str,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        ensure_project(project_id)?;
        let key = ResourceKey::new(user_id, project_id);

        if let Some(resources) = self.cached_resources(&key)? {
            return Ok(DiscoveryReport::cached(resources));
        }

        self.discover_live(credential, key).await
    }

    /// `discover` with the credential fetched from `provider`; degrades to
    /// an empty list when no credential can be obtained
    pub async fn discover_as(
        &self,
        provider: &dyn CredentialProvider,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<Resource>, DiscoveryError> {
        ensure_project(project_id)?;
        let key = ResourceKey::new(user_id, project_id);

        if let Some(resources) = self.cached_resources(&key)? {
            return Ok(resources);
        }

        let credential = match provider.credential(user_id).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    user = %user_id,
                    project = %project_id,
                    error = %format!("{:#}", e),
                    "No credential available, returning no resources"
                );
                return Ok(Vec::new());
            }
        };

        Ok(self.discover_live(&credential, key).await?.resources)
    }

    /// Drop the cached list (and optionally the user's access flags),
    /// then rediscover against the live service
    pub async fn refresh(
        &self,
        credential: &Credential,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<Resource>, DiscoveryError> {
        ensure_project(project_id)?;

        self.resources
            .invalidate(&ResourceKey::new(user_id, project_id))?;

        if self.refresh_clears_access {
            let cleared = self.access.invalidate_where(|k| k.user_id == user_id)?;
            debug!(user = %user_id, cleared, "Cleared access flags for refresh");
        }

        info!(user = %user_id, project = %project_id, "Refreshing resources");
        self.discover(credential, user_id, project_id).await
    }

    /// Find a resource by its trailing agent id, cache first
    pub async fn locate(
        &self,
        credential: &Credential,
        user_id: &str,
        project_id: &str,
        agent_id: &str,
    ) -> Result<Option<Resource>, DiscoveryError> {
        ensure_project(project_id)?;

        if let Some(cached) = self.resources.get(&ResourceKey::new(user_id, project_id))? {
            if let Some(found) = cached.into_iter().find(|r| r.short_id() == Some(agent_id)) {
                debug!(agent = %agent_id, resource = %found.id, "Located agent in cache");
                return Ok(Some(found));
            }
        }

        debug!(agent = %agent_id, "Agent not cached, searching all regions");
        let listing = self
            .list_all_regions(credential, project_id, self.registry.list_regions())
            .await;

        let Some(found) = listing
            .resources
            .into_iter()
            .find(|r| short_id_of(&r.id) == Some(agent_id))
        else {
            info!(agent = %agent_id, project = %project_id, "Agent not found in any region");
            return Ok(None);
        };

        let resolution = self
            .resolve_accessibility(credential, user_id, &found.id)
            .await?;
        Ok(Some(found.annotate(resolution.accessible())))
    }

    /// Clear resource lists; omitted keys match everything
    pub fn clear_resource_cache(
        &self,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<usize, DiscoveryError> {
        let removed = match (user_id, project_id) {
            (None, None) => self.resources.invalidate_all()?,
            (Some(user), Some(project)) => {
                usize::from(self.resources.invalidate(&ResourceKey::new(user, project))?)
            }
            (user, project) => self.resources.invalidate_where(|k| {
                user.map_or(true, |u| k.user_id == u) && project.map_or(true, |p| k.project_id == p)
            })?,
        };

        info!(?user_id, ?project_id, removed, "Cleared resource cache");
        Ok(removed)
    }

    /// Clear access flags for one user, or for everyone
    pub fn clear_access_cache(&self, user_id: Option<&str>) -> Result<usize, DiscoveryError> {
        let removed = match user_id {
            Some(user) => self.access.invalidate_where(|k| k.user_id == user)?,
            None => self.access.invalidate_all()?,
        };

        info!(?user_id, removed, "Cleared access cache");
        Ok(removed)
    }

    fn cached_resources(&self, key: &ResourceKey) -> Result<Option<Vec<Resource>>, DiscoveryError> {
        let cached = self.resources.get(key)?;
        if let Some(resources) = &cached {
            debug!(
                user = %key.user_id,
                project = %key.project_id,
                count = resources.len(),
                "Serving cached resources"
            );
        }
        Ok(cached)
    }

    async fn discover_live(
        &self,
        credential: &Credential,
        key: ResourceKey,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let started = Instant::now();

        let listing = self
            .list_all_regions(credential, &key.project_id, self.registry.list_regions())
            .await;

        let (resources, probes_issued) = self
            .annotate(credential, &key.user_id, listing.resources)
            .await?;

        let report = DiscoveryReport {
            resources,
            from_cache: false,
            regions_queried: listing.queried,
            regions_failed: listing.failed,
            probes_issued,
            completed_at: chrono::Utc::now(),
        };

        if report.all_regions_failed() {
            warn!(
                user = %key.user_id,
                project = %key.project_id,
                regions = report.regions_queried,
                "Every region listing failed; discovery returns no resources"
            );
        }

        info!(
            user = %key.user_id,
            project = %key.project_id,
            resources = report.resources.len(),
            accessible = report.resources.iter().filter(|r| r.accessible).count(),
            regions_failed = report.regions_failed.len(),
            probes = report.probes_issued,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery complete"
        );

        self.resources.insert(key, report.resources.clone())?;
        Ok(report)
    }

    async fn list_all_regions(
        &self,
        credential: &Credential,
        project_id: &str,
        regions: Vec<Region>,
    ) -> RegionListing {
        let lister = self.lister.as_ref();
        let budget = self.list_timeout;

        let outcomes = self
            .list_fan_out
            .run(regions.clone(), move |region: Region| async move {
                match timeout(budget, lister.list_in_region(credential, project_id, &region)).await {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::Timeout(format!(
                        "no agent list from {} within {:?}",
                        region.code, budget
                    ))),
                }
            })
            .await;

        let mut batches = Vec::with_capacity(regions.len());
        let mut failed = Vec::new();

        for (region, outcome) in regions.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    if !found.is_empty() {
                        debug!(region = %region.code, count = found.len(), "Agents found in region");
                    }
                    batches.push(found);
                }
                Err(e) => {
                    warn!(
                        region = %region.code,
                        project = %project_id,
                        error = %e,
                        "Region listing failed, skipping region"
                    );
                    failed.push(region.code.clone());
                }
            }
        }

        RegionListing {
            resources: merge_by_id(batches),
            queried: regions.len(),
            failed,
        }
    }

    async fn annotate(
        &self,
        credential: &Credential,
        user_id: &str,
        listed: Vec<DiscoveredResource>,
    ) -> Result<(Vec<Resource>, usize), DiscoveryError> {
        let outcomes = self
            .probe_fan_out
            .run(listed, move |resource: DiscoveredResource| async move {
                let resolution = self
                    .resolve_accessibility(credential, user_id, &resource.id)
                    .await?;
                Ok::<_, DiscoveryError>((resource, resolution))
            })
            .await;

        let mut resources = Vec::with_capacity(outcomes.len());
        let mut probes_issued = 0;

        for outcome in outcomes {
            let (resource, resolution) = outcome?;
            if matches!(resolution, Resolution::Probed(_)) {
                probes_issued += 1;
            }
            resources.push(resource.annotate(resolution.accessible()));
        }

        Ok((resources, probes_issued))
    }

    async fn resolve_accessibility(
        &self,
        credential: &Credential,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Resolution, DiscoveryError> {
        let key = AccessKey::new(user_id, resource_id);

        if let Some(accessible) = self.access.get(&key)? {
            return Ok(Resolution::Cached(accessible));
        }

        let accessible = match timeout(self.probe_timeout, self.probe.probe(credential, resource_id)).await {
            Ok(accessible) => accessible,
            Err(_) => {
                warn!(
                    resource = %resource_id,
                    budget_ms = self.probe_timeout.as_millis() as u64,
                    "Access probe timed out, treating as inaccessible"
                );
                false
            }
        };

        self.access.insert(key, accessible)?;
        Ok(Resolution::Probed(accessible))
    }
}

impl Drop for DiscoveryOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Flatten per-region batches, keeping one entry per id.
/// A later duplicate replaces the earlier one in place.
pub fn merge_by_id<I>(batches: I) -> Vec<DiscoveredResource>
where
    I: IntoIterator<Item = Vec<DiscoveredResource>>,
{
    let mut merged: Vec<DiscoveredResource> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for resource in batches.into_iter().flatten() {
        match positions.get(&resource.id) {
            Some(&index) => merged[index] = resource,
            None => {
                positions.insert(resource.id.clone(), merged.len());
                merged.push(resource);
            }
        }
    }

    merged
}

fn ensure_project(project_id: &str) -> Result<(), DiscoveryError> {
    if project_id.trim().is_empty() {
        return Err(DiscoveryError::InvalidInput(
            "project_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EmptyLister;

    #[async_trait]
    impl ResourceLister for EmptyLister {
        async fn list_in_region(
            &self,
            _credential: &Credential,
            _project_id: &str,
            _region: &Region,
        ) -> Result<Vec<DiscoveredResource>, RemoteError> {
            Ok(Vec::new())
        }
    }

    struct AllowAll;

    #[async_trait]
    impl AccessProbe for AllowAll {
        async fn try_invoke(&self, _credential: &Credential, _resource_id: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn orchestrator() -> DiscoveryOrchestrator {
        DiscoveryOrchestrator::new(
            &DiscoveryConfig::default(),
            RegionRegistry::new(["r1"], "http://{region}.test", "http://global.test"),
            Arc::new(EmptyLister),
            Arc::new(AllowAll),
        )
        .unwrap()
    }

    fn listed(id: &str, name: &str, region: &str) -> DiscoveredResource {
        DiscoveredResource::new(id, name, region)
    }

    fn annotated(id: &str) -> Vec<Resource> {
        vec![listed(id, id, "r1").annotate(true)]
    }

    #[test]
    fn test_merge_deduplicates_last_write_wins() {
        let merged = merge_by_id(vec![
            vec![listed("a", "Agent A", "r1"), listed("b", "Agent B", "r1")],
            vec![listed("a", "Agent A (moved)", "r2")],
            vec![listed("c", "Agent C", "r3")],
        ]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], listed("a", "Agent A (moved)", "r2"));
        assert_eq!(merged[1].id, "b");
        assert_eq!(merged[2].id, "c");
    }

    #[test]
    fn test_new_rejects_unusable_config() {
        let registry = RegionRegistry::new(["r1"], "http://{region}.test", "http://global.test");
        let build = |config: DiscoveryConfig, registry: RegionRegistry| {
            DiscoveryOrchestrator::new(&config, registry, Arc::new(EmptyLister), Arc::new(AllowAll))
        };

        let zero_ttl = DiscoveryConfig {
            resource_ttl_secs: 0,
            ..DiscoveryConfig::default()
        };
        assert!(build(zero_ttl, registry.clone()).is_err());

        let zero_probe_timeout = DiscoveryConfig {
            probe_timeout_secs: 0,
            ..DiscoveryConfig::default()
        };
        assert!(build(zero_probe_timeout, registry.clone()).is_err());

        let empty = RegionRegistry::new(Vec::<String>::new(), "http://{region}.test", "http://global.test");
        assert!(build(DiscoveryConfig::default(), empty).is_err());

        assert!(build(DiscoveryConfig::default(), registry).is_ok());
    }

    #[test]
    fn test_clear_resource_cache_scopes() {
        let orchestrator = orchestrator();
        let cache = orchestrator.resource_cache();
        for (user, project) in [("u1", "p1"), ("u1", "p2"), ("u2", "p1"), ("u2", "p2")] {
            cache.insert(ResourceKey::new(user, project), annotated("x")).unwrap();
        }

        assert_eq!(orchestrator.clear_resource_cache(Some("u1"), Some("p1")).unwrap(), 1);
        assert_eq!(orchestrator.clear_resource_cache(None, Some("p2")).unwrap(), 2);
        assert_eq!(orchestrator.clear_resource_cache(Some("u2"), None).unwrap(), 1);
        assert!(cache.is_empty().unwrap());

        cache.insert(ResourceKey::new("u3", "p3"), annotated("y")).unwrap();
        assert_eq!(orchestrator.clear_resource_cache(None, None).unwrap(), 1);
    }

    #[test]
    fn test_clear_access_cache_scopes() {
        let orchestrator = orchestrator();
        let cache = orchestrator.access_cache();
        cache.insert(AccessKey::new("u1", "a"), true).unwrap();
        cache.insert(AccessKey::new("u1", "b"), false).unwrap();
        cache.insert(AccessKey::new("u2", "a"), true).unwrap();

        assert_eq!(orchestrator.clear_access_cache(Some("u1")).unwrap(), 2);
        assert_eq!(orchestrator.clear_access_cache(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_project_is_rejected() {
        let err = orchestrator()
            .discover(&Credential::bearer("t"), "u1", "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_report_for_empty_project() {
        let report = orchestrator()
            .discover_detailed(&Credential::bearer("t"), "u1", "p1")
            .await
            .unwrap();

        assert!(report.resources.is_empty());
        assert!(!report.from_cache);
        assert_eq!(report.regions_queried, 1);
        assert!(!report.all_regions_failed());
    }
}
