//! Test doubles for the remote list and invoke calls

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_discovery::discovery::{AccessProbe, DiscoveredResource, RemoteError, ResourceLister};
use agent_discovery::{Credential, DiscoveryConfig, DiscoveryOrchestrator, Region, RegionRegistry};

/// Lister returning canned results per region and counting calls
#[derive(Default)]
pub struct FakeLister {
    results: HashMap<String, Result<Vec<DiscoveredResource>, RemoteError>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl FakeLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// `agents` are (id, display name) pairs
    pub fn region(mut self, code: &str, agents: &[(&str, &str)]) -> Self {
        let resources = agents
            .iter()
            .map(|(id, name)| DiscoveredResource::new(*id, *name, code))
            .collect();
        self.results.insert(code.to_string(), Ok(resources));
        self
    }

    pub fn failing(mut self, code: &str, error: RemoteError) -> Self {
        self.results.insert(code.to_string(), Err(error));
        self
    }

    pub fn slow(mut self, code: &str, delay: Duration) -> Self {
        self.delays.insert(code.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceLister for FakeLister {
    async fn list_in_region(
        &self,
        _credential: &Credential,
        _project_id: &str,
        region: &Region,
    ) -> Result<Vec<DiscoveredResource>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&region.code) {
            tokio::time::sleep(*delay).await;
        }

        self.results
            .get(&region.code)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Probe returning canned outcomes per resource (success by default)
#[derive(Default)]
pub struct FakeProbe {
    outcomes: HashMap<String, Result<(), RemoteError>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, resource_id: &str) -> Self {
        self.outcomes.insert(resource_id.to_string(), Ok(()));
        self
    }

    pub fn deny(mut self, resource_id: &str) -> Self {
        self.outcomes.insert(
            resource_id.to_string(),
            Err(RemoteError::PermissionDenied("dialogflow.sessions.detectIntent".to_string())),
        );
        self
    }

    pub fn fail(mut self, resource_id: &str, error: RemoteError) -> Self {
        self.outcomes.insert(resource_id.to_string(), Err(error));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, resource_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == resource_id)
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessProbe for FakeProbe {
    async fn try_invoke(&self, _credential: &Credential, resource_id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(resource_id.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outcomes.get(resource_id).cloned().unwrap_or(Ok(()))
    }
}

pub fn config(regions: &[&str]) -> DiscoveryConfig {
    DiscoveryConfig {
        regions: regions.iter().map(|r| r.to_string()).collect(),
        ..DiscoveryConfig::default()
    }
}

pub fn orchestrator(
    config: &DiscoveryConfig,
    lister: Arc<FakeLister>,
    probe: Arc<FakeProbe>,
) -> DiscoveryOrchestrator {
    DiscoveryOrchestrator::new(config, RegionRegistry::from_config(config), lister, probe).unwrap()
}

pub fn credential() -> Credential {
    Credential::bearer("test-token")
}
