//! Step-up escalation contract and HTTP adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::http::{build_client, endpoint, error_body};

/// Longest elevation a step-up may grant.
pub const MAX_ELEVATION_LIFETIME: Duration = Duration::from_secs(90 * 60);

/// Elevation request for one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpRequest {
    pub scope: String,
    pub max_lifetime: Duration,
    pub token: Option<String>,
}

impl StepUpRequest {
    /// Request scoped to one instance, bounded by [`MAX_ELEVATION_LIFETIME`].
    pub fn for_instance(instance_id: &str) -> Self {
        Self {
            scope: format!("instanceId:{}", instance_id),
            max_lifetime: MAX_ELEVATION_LIFETIME,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(String::from);
        self
    }
}

/// The step-up challenge was not approved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct StepUpRejection {
    pub reason: String,
}

impl StepUpRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Step-up challenge service.
#[async_trait]
pub trait StepUpEnforcer: Send + Sync {
    async fn enforce(&self, request: &StepUpRequest) -> Result<(), StepUpRejection>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepUpBody<'a> {
    scope: &'a str,
    max_lifetime_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

/// Step-up service reached over HTTP. Any non-2xx answer is a rejection.
#[derive(Debug, Clone)]
pub struct HttpStepUpEnforcer {
    client: reqwest::Client,
    url: String,
}

impl HttpStepUpEnforcer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::AccessResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: endpoint(url.into())?,
        })
    }
}

#[async_trait]
impl StepUpEnforcer for HttpStepUpEnforcer {
    async fn enforce(&self, request: &StepUpRequest) -> Result<(), StepUpRejection> {
        let body = StepUpBody {
            scope: &request.scope,
            max_lifetime_minutes: request.max_lifetime.as_secs() / 60,
            token: request.token.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StepUpRejection::new(format!("step-up service error: {}", e)))?;

        let status = response.status();
        debug!(scope = %request.scope, status = status.as_u16(), "step-up response");

        if status.is_success() {
            Ok(())
        } else {
            Err(StepUpRejection::new(error_body(response).await))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_for_instance() {
        let request = StepUpRequest::for_instance("i-0abc").with_token(Some("tok"));
        assert_eq!(request.scope, "instanceId:i-0abc");
        assert_eq!(request.max_lifetime, Duration::from_secs(5400));
        assert_eq!(request.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_body_wire_shape() {
        let body = StepUpBody {
            scope: "instanceId:i-1",
            max_lifetime_minutes: 90,
            token: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"scope": "instanceId:i-1", "maxLifetimeMinutes": 90})
        );
    }
}
