//! Request coordinator for mutating REST calls
//!
//! Wraps the external HTTP collaborator behind [`HttpClient`] and funnels
//! every outbound call through [`Request`], which logs the target and
//! version and propagates the collaborator's result unchanged. Argument
//! validation happens in the entity operations before a request object is
//! ever built, so a rejected call can never have touched the network.

use crate::error::Result;
use crate::routes::ApiVersion;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Flat key/value form body for update operations.
pub type RequestParams = serde_json::Map<String, Value>;

/// External HTTP collaborator.
///
/// Implementations own connection pooling, serialization of the flat form
/// body, and auth header injection. Rejections from the backend are
/// surfaced as [`crate::TaskRouterError::Remote`] carrying the stable error
/// name and message from the response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a POST against a versioned route.
    async fn post(&self, url: &str, params: RequestParams, version: ApiVersion) -> Result<Value>;

    /// Fetches the current representation of an entity.
    async fn get(&self, url: &str, version: ApiVersion) -> Result<Value>;
}

/// Thin coordinator handle shared by all entities of a Worker.
#[derive(Clone)]
pub struct Request {
    client: Arc<dyn HttpClient>,
}

impl Request {
    /// Creates a coordinator over the given HTTP collaborator.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Issues a POST, logging the target and outcome.
    pub async fn post(
        &self,
        url: &str,
        params: RequestParams,
        version: ApiVersion,
    ) -> Result<Value> {
        debug!(url = %url, version = %version, "Issuing POST");
        let result = self.client.post(url, params, version).await;
        if let Err(e) = &result {
            debug!(url = %url, error = %e, "POST rejected");
        }
        result
    }

    /// Issues a GET, logging the target.
    pub async fn get(&self, url: &str, version: ApiVersion) -> Result<Value> {
        debug!(url = %url, version = %version, "Issuing GET");
        self.client.get(url, version).await
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").finish_non_exhaustive()
    }
}
