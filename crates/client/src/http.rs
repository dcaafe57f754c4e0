//! Client for the schema admin HTTP endpoint.
//!
//! The endpoint exposes a small versioned surface rooted at `/v1`:
//!
//! | Route                 | Method | Body                      |
//! |-----------------------|--------|---------------------------|
//! | `/v1/health`          | GET    |                           |
//! | `/v1/ddl`             | POST   | `{"statements": [..]}`    |
//! | `/v1/migrations`      | GET    | -> `{"statuses": {..}}`   |
//! | `/v1/migrations/{id}` | PUT    | `{"applied": bool}`       |
//!
//! Any 2xx response is a success; everything else surfaces as
//! [`ClientError::Rejected`] with the response body as the message.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ClientError, SchemaAdmin, StatusStore};

#[derive(Debug, Serialize)]
struct DdlRequest<'a> {
    statements: &'a [String],
}

#[derive(Debug, Serialize)]
struct RecordStatusRequest {
    applied: bool,
}

#[derive(Debug, Deserialize)]
struct StatusesResponse {
    statuses: HashMap<String, bool>,
}

/// Schema admin client speaking the `/v1` HTTP surface.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct HttpAdminClient {
    client: Client,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl HttpAdminClient {
    /// Create a client rooted at `endpoint`. The endpoint must be a base url
    /// (scheme plus authority), anything else is refused up front.
    pub fn new(endpoint: Url) -> Result<Self, ClientError> {
        if endpoint.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: endpoint.to_string(),
                reason: "endpoint must be a base url".into(),
            });
        }
        Ok(Self { client: Client::new(), endpoint, bearer_token: None })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // Cannot fail: cannot-be-a-base endpoints are refused in `new`.
        url.path_segments_mut().expect("endpoint is a base url").pop_if_empty().extend(segments);
        url
    }

    async fn send(&self, request: RequestBuilder, operation: &'static str) -> Result<Response, ClientError> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|source| ClientError::Transport { operation, source })?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(%status, operation, "schema admin call succeeded");
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected { operation, status, message })
    }
}

#[async_trait]
impl StatusStore for HttpAdminClient {
    async fn migration_statuses(&self) -> Result<HashMap<String, bool>, ClientError> {
        const OPERATION: &str = "status fetch";
        let response = self.send(self.client.get(self.url(&["v1", "migrations"])), OPERATION).await?;
        let body: StatusesResponse =
            response.json().await.map_err(|source| ClientError::Malformed { operation: OPERATION, source })?;
        Ok(body.statuses)
    }

    async fn record_status(&self, id: &str, applied: bool) -> Result<(), ClientError> {
        let request = self.client.put(self.url(&["v1", "migrations", id])).json(&RecordStatusRequest { applied });
        self.send(request, "status update").await?;
        Ok(())
    }
}

#[async_trait]
impl SchemaAdmin for HttpAdminClient {
    async fn apply_ddl(&self, statements: &[String]) -> Result<(), ClientError> {
        let request = self.client.post(self.url(&["v1", "ddl"])).json(&DdlRequest { statements });
        self.send(request, "ddl batch").await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ClientError> {
        self.send(self.client.get(self.url(&["v1", "health"])), "health check").await?;
        Ok(())
    }
}
