//! Resource Lister
//!
//! One "list agents in region R for project P" call, normalised into
//! `DiscoveredResource`s tagged with the queried region.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::RemoteError;
use super::http::{check_status, API_VERSION};
use super::types::{Credential, DiscoveredResource, Region};

/// Lists the resources a project holds in one region
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Resources in `region`; `accessible` is resolved later
    async fn list_in_region(
        &self,
        credential: &Credential,
        project_id: &str,
        region: &Region,
    ) -> Result<Vec<DiscoveredResource>, RemoteError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAgentsResponse {
    #[serde(default)]
    agents: Vec<AgentPayload>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentPayload {
    name: String,
    #[serde(default)]
    display_name: String,
}

/// Dialogflow CX `projects.locations.agents.list` adapter
pub struct DialogflowLister {
    http_client: Client,
    page_size: u32,
    max_pages: usize,
}

impl DialogflowLister {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            page_size: 100,
            max_pages: 1000,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stop following `nextPageToken` after this many pages
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn page_url(&self, project_id: &str, region: &Region, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}/projects/{}/locations/{}/agents?pageSize={}",
            region.endpoint(),
            API_VERSION,
            urlencoding::encode(project_id),
            urlencoding::encode(&region.code),
            self.page_size
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl ResourceLister for DialogflowLister {
    async fn list_in_region(
        &self,
        credential: &Credential,
        project_id: &str,
        region: &Region,
    ) -> Result<Vec<DiscoveredResource>, RemoteError> {
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages == self.max_pages {
                return Err(RemoteError::Decode(format!(
                    "agent list in {} exceeded {} pages",
                    region.code, self.max_pages
                )));
            }
            pages += 1;

            let url = self.page_url(project_id, region, page_token.as_deref());

            let response = self
                .http_client
                .get(&url)
                .bearer_auth(credential.access_token())
                .send()
                .await?;

            let page: ListAgentsResponse = check_status(response).await?.json().await?;

            resources.extend(page.agents.into_iter().map(|agent| {
                let display_name = if agent.display_name.is_empty() {
                    agent.name.rsplit('/').next().unwrap_or(&agent.name).to_string()
                } else {
                    agent.display_name
                };
                DiscoveredResource::new(agent.name, display_name, region.code.as_str())
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                    return Err(RemoteError::Decode(format!(
                        "repeated page token {:?} from {}",
                        token, region.code
                    )));
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(region = %region.code, count = resources.len(), pages, "Listed agents");
        Ok(resources)
    }
}
