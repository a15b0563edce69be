//! Access Probe
//!
//! List rights and invoke rights are granted separately, so a listed agent
//! may still reject invocation. The probe issues the smallest invoke the
//! remote API accepts and reduces the outcome to a boolean. Anything other
//! than a successful invoke counts as "no access".

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::RemoteError;
use super::http::{check_status, API_VERSION};
use super::regions::{RegionRegistry, GLOBAL_REGION};
use super::types::{location_of, Credential};

/// Checks whether a credential may invoke one resource
#[async_trait]
pub trait AccessProbe: Send + Sync {
    /// Issue the minimal invoke call
    async fn try_invoke(&self, credential: &Credential, resource_id: &str) -> Result<(), RemoteError>;

    /// `try_invoke` reduced to a boolean, denying on any failure
    async fn probe(&self, credential: &Credential, resource_id: &str) -> bool {
        access_from_outcome(resource_id, self.try_invoke(credential, resource_id).await)
    }
}

/// Reduce an invoke outcome to an access flag
///
/// Denials are expected and only logged at debug level; every other
/// failure is logged and also treated as inaccessible.
pub fn access_from_outcome(resource_id: &str, outcome: Result<(), RemoteError>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) if e.is_denial() => {
            debug!(resource = %resource_id, reason = %e, "No invoke rights");
            false
        }
        Err(e) => {
            warn!(resource = %resource_id, error = %e, "Access probe failed, treating as inaccessible");
            false
        }
    }
}

/// Dialogflow CX `sessions.detectIntent` probe
pub struct DialogflowProbe {
    http_client: Client,
    registry: RegionRegistry,
    probe_text: String,
    language_code: String,
}

impl DialogflowProbe {
    pub fn new(http_client: Client, registry: RegionRegistry) -> Self {
        Self {
            http_client,
            registry,
            probe_text: "test".to_string(),
            language_code: "en".to_string(),
        }
    }

    pub fn with_query(mut self, probe_text: &str, language_code: &str) -> Self {
        self.probe_text = probe_text.to_string();
        self.language_code = language_code.to_string();
        self
    }

    /// Throwaway session under the agent, so probes never share state
    fn detect_intent_url(&self, resource_id: &str) -> String {
        let location = location_of(resource_id).unwrap_or(GLOBAL_REGION);
        let region = self.registry.region_for(location);
        format!(
            "{}/{}/{}/sessions/permission-check-{}:detectIntent",
            region.endpoint(),
            API_VERSION,
            resource_id,
            Uuid::new_v4()
        )
    }
}

#[async_trait]
impl AccessProbe for DialogflowProbe {
    async fn try_invoke(&self, credential: &Credential, resource_id: &str) -> Result<(), RemoteError> {
        let body = json!({
            "queryInput": {
                "text": { "text": self.probe_text },
                "languageCode": self.language_code,
            }
        });

        let response = self
            .http_client
            .post(self.detect_intent_url(resource_id))
            .bearer_auth(credential.access_token())
            .json(&body)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::http::build_client;
    use mockito::Matcher;
    use std::time::Duration;

    const AGENT: &str = "projects/acme/locations/us-east1/agents/a1";

    fn probe_for(server: &mockito::ServerGuard) -> DialogflowProbe {
        let template = format!("{}/{{region}}", server.url());
        let registry = RegionRegistry::new(["global", "us-east1"], &template, &server.url());
        DialogflowProbe::new(build_client(Duration::from_secs(5)).unwrap(), registry)
    }

    fn detect_intent_path() -> Matcher {
        Matcher::Regex(format!(
            r"^/us-east1/v3/{}/sessions/permission-check-[0-9a-f-]+:detectIntent$",
            AGENT
        ))
    }

    #[tokio::test]
    async fn test_successful_invoke_is_accessible() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", detect_intent_path())
            .match_header("authorization", "Bearer token-1")
            .match_body(Matcher::PartialJson(json!({
                "queryInput": { "text": { "text": "test" }, "languageCode": "en" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"responseId":"r1","queryResult":{}}"#)
            .create_async()
            .await;

        let probe = probe_for(&server);
        assert!(probe.probe(&Credential::bearer("token-1"), AGENT).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_permission_denied_is_inaccessible() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", detect_intent_path())
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Permission 'dialogflow.sessions.detectIntent' denied"}}"#)
            .create_async()
            .await;

        let probe = probe_for(&server);
        let outcome = probe.try_invoke(&Credential::bearer("t"), AGENT).await;
        assert!(matches!(outcome, Err(RemoteError::PermissionDenied(_))));
        assert!(!probe.probe(&Credential::bearer("t"), AGENT).await);
    }

    #[tokio::test]
    async fn test_server_error_is_inaccessible() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", detect_intent_path())
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let probe = probe_for(&server);
        assert!(!probe.probe(&Credential::bearer("t"), AGENT).await);
    }

    #[tokio::test]
    async fn test_unparseable_name_uses_global_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"^/v3/legacy-agent/sessions/permission-check-.+:detectIntent$".to_string()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let probe = probe_for(&server);
        assert!(probe.probe(&Credential::bearer("t"), "legacy-agent").await);
        mock.assert_async().await;
    }

    #[test]
    fn test_outcome_reduction() {
        assert!(access_from_outcome(AGENT, Ok(())));
        assert!(!access_from_outcome(AGENT, Err(RemoteError::NotFound("gone".into()))));
        assert!(!access_from_outcome(AGENT, Err(RemoteError::Timeout("slow".into()))));
        assert!(!access_from_outcome(
            AGENT,
            Err(RemoteError::Unauthenticated("expired".into()))
        ));
    }
}
