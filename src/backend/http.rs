//! HTTP implementation of the provisioning backend.
//!
//! This module provides the REST client for a provisioning control plane
//! exposing `POST /resources`, `PUT /resources/{id}` and
//! `DELETE /resources/{id}`. Transient network failures are retried a
//! bounded number of times; confirmed failures never are.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ResourceKind;
use crate::error::{BackendError, Result, StratusError};

use super::provisioner::{Applied, ApplyRequest, Provisioner};

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP client for the provisioning control plane.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the control plane API.
    endpoint: String,
    /// API key.
    api_key: String,
}

/// Wire format for apply requests.
#[derive(Debug, Serialize)]
struct ApplyBody<'a> {
    kind: &'a str,
    logical_id: &'a str,
    project: &'a str,
    attributes: &'a BTreeMap<String, Value>,
}

/// Wire format for apply responses.
#[derive(Debug, Deserialize)]
struct ResourceResponse {
    physical_id: String,
    #[serde(default)]
    outputs: HashMap<String, String>,
}

/// Wire format for error responses.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl ControlPlaneClient {
    /// Creates a new control plane client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Builds the URL for a path under the endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }

    /// Sends a request, retrying transient network failures.
    async fn send_with_retries(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder + Send,
    ) -> Result<Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            let request = build()
                .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
                .header(header::CONTENT_TYPE, "application/json");

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    trace!("Request failed: {e}");
                    last_error = Some(BackendError::network(format!("Request failed: {e}")));
                }
            }
        }

        Err(StratusError::Backend(last_error.unwrap_or_else(|| {
            BackendError::network("Request failed with no recorded error")
        })))
    }

    /// Maps a non-success status to a backend error.
    async fn error_from_response(response: Response) -> BackendError {
        let status = response.status();
        let message = response
            .json::<ErrorResponse>()
            .await
            .map_or_else(|_| format!("HTTP {status}"), |body| body.message);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                BackendError::AuthenticationFailed { message }
            }
            StatusCode::NOT_FOUND => BackendError::NotFound {
                physical_id: message,
            },
            StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited {
                retry_after_secs: 30,
            },
            _ => BackendError::InvalidResponse {
                message: format!("HTTP {status}: {message}"),
            },
        }
    }

    /// Applies a resource configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not confirm the operation.
    pub async fn apply_resource(
        &self,
        project: &str,
        request: &ApplyRequest,
    ) -> Result<Applied> {
        let body = ApplyBody {
            kind: request.kind.as_str(),
            logical_id: &request.logical_id,
            project,
            attributes: &request.attributes,
        };

        let response = if let Some(physical_id) = &request.physical_id {
            debug!(
                "PUT resource {} ({}) as {physical_id}",
                request.logical_id, request.kind
            );
            let url = self.url(&format!("resources/{physical_id}"));
            self.send_with_retries(|| self.client.put(&url).json(&body))
                .await?
        } else {
            debug!("POST resource {} ({})", request.logical_id, request.kind);
            let url = self.url("resources");
            self.send_with_retries(|| self.client.post(&url).json(&body))
                .await?
        };

        if !response.status().is_success() {
            let error = Self::error_from_response(response).await;
            return Err(StratusError::Backend(match error {
                BackendError::InvalidResponse { message } => BackendError::apply_failed(
                    request.kind.as_str(),
                    request.logical_id.clone(),
                    message,
                ),
                other => other,
            }));
        }

        let resource: ResourceResponse = response.json().await.map_err(|e| {
            StratusError::Backend(BackendError::InvalidResponse {
                message: format!("Failed to parse apply response: {e}"),
            })
        })?;

        trace!(
            "Applied {} -> {} ({} outputs)",
            request.logical_id,
            resource.physical_id,
            resource.outputs.len()
        );

        Ok(Applied {
            physical_id: resource.physical_id,
            outputs: resource.outputs,
        })
    }

    /// Deletes a physical resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not confirm the deletion.
    pub async fn delete_resource(&self, kind: ResourceKind, physical_id: &str) -> Result<()> {
        debug!("DELETE resource {physical_id} ({kind})");

        let url = self.url(&format!("resources/{physical_id}"));
        let response = self
            .send_with_retries(|| self.client.delete(&url))
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(StratusError::Backend(BackendError::NotFound {
                physical_id: physical_id.to_string(),
            }));
        }

        let error = Self::error_from_response(response).await;
        Err(StratusError::Backend(match error {
            BackendError::InvalidResponse { message } => {
                BackendError::delete_failed(physical_id, message)
            }
            other => other,
        }))
    }
}

/// [`Provisioner`] implementation backed by the control plane API.
#[derive(Debug)]
pub struct HttpProvisioner {
    /// Control plane client.
    client: ControlPlaneClient,
    /// Qualified project name forwarded with every apply.
    project: String,
}

impl HttpProvisioner {
    /// Creates a new HTTP provisioner.
    #[must_use]
    pub const fn new(client: ControlPlaneClient, project: String) -> Self {
        Self { client, project }
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn apply(&self, request: &ApplyRequest) -> Result<Applied> {
        self.client.apply_resource(&self.project, request).await
    }

    async fn delete(&self, kind: ResourceKind, physical_id: &str) -> Result<()> {
        self.client.delete_resource(kind, physical_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn apply_request() -> ApplyRequest {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            String::from("domain_name"),
            Value::String(String::from("example.com")),
        );
        ApplyRequest::create("zone", ResourceKind::HostedZone, attributes)
    }

    #[tokio::test]
    async fn test_apply_create_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "kind": "hosted_zone",
                "logical_id": "zone",
                "project": "website-dev",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "physical_id": "zone-phys-1",
                "outputs": { "zone_id": "Z42" },
            })))
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&format!("{}/v1", server.uri()), "test-key", 5)
            .expect("client should build");
        let provisioner = HttpProvisioner::new(client, String::from("website-dev"));

        let applied = provisioner
            .apply(&apply_request())
            .await
            .expect("apply should succeed");

        assert_eq!(applied.physical_id, "zone-phys-1");
        assert_eq!(applied.outputs.get("zone_id").map(String::as_str), Some("Z42"));
    }

    #[tokio::test]
    async fn test_apply_update_uses_put() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/resources/zone-phys-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "physical_id": "zone-phys-1",
                "outputs": { "zone_id": "Z42" },
            })))
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&format!("{}/v1", server.uri()), "test-key", 5)
            .expect("client should build");

        let mut request = apply_request();
        request.physical_id = Some(String::from("zone-phys-1"));

        let applied = client
            .apply_resource("website-dev", &request)
            .await
            .expect("update should succeed");
        assert_eq!(applied.physical_id, "zone-phys-1");
    }

    #[tokio::test]
    async fn test_apply_failure_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "quota exhausted",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&format!("{}/v1", server.uri()), "test-key", 5)
            .expect("client should build");

        let result = client.apply_resource("website-dev", &apply_request()).await;
        match result {
            Err(StratusError::Backend(BackendError::ApplyFailed { kind, id, message })) => {
                assert_eq!(kind, "hosted_zone");
                assert_eq!(id, "zone");
                assert!(message.contains("quota exhausted"));
            }
            other => panic!("expected ApplyFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_not_found_is_typed() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/resources/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&format!("{}/v1", server.uri()), "test-key", 5)
            .expect("client should build");

        let result = client.delete_resource(ResourceKind::Bucket, "ghost").await;
        assert!(matches!(
            result,
            Err(StratusError::Backend(BackendError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_is_typed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&format!("{}/v1", server.uri()), "test-key", 5)
            .expect("client should build");

        let result = client.apply_resource("website-dev", &apply_request()).await;
        assert!(matches!(
            result,
            Err(StratusError::Backend(BackendError::RateLimited { .. }))
        ));
    }
}
