//! Policy engine contract and HTTP adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AccessError, AccessResult};
use crate::http::{build_client, endpoint, error_body};

pub(crate) const POLICY_BACKEND: &str = "policy";

/// Subject submitted to the policy engine: `{"user": {"email": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub user: SubjectUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectUser {
    pub email: String,
}

impl Subject {
    pub fn for_identity(identity: impl Into<String>) -> Self {
        Self {
            user: SubjectUser {
                email: identity.into(),
            },
        }
    }
}

/// Allow/deny decisions for a named policy.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn is_authorized(&self, policy_name: &str, subject: &Subject) -> AccessResult<bool>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyRequest<'a> {
    policy_name: &'a str,
    subject: &'a Subject,
}

#[derive(Debug, Deserialize)]
struct PolicyResponse {
    allowed: bool,
}

/// Policy engine reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPolicyEngine {
    client: reqwest::Client,
    url: String,
}

impl HttpPolicyEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AccessResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: endpoint(url.into())?,
        })
    }
}

#[async_trait]
impl PolicyEngine for HttpPolicyEngine {
    async fn is_authorized(&self, policy_name: &str, subject: &Subject) -> AccessResult<bool> {
        let response = self
            .client
            .post(&self.url)
            .json(&PolicyRequest {
                policy_name,
                subject,
            })
            .send()
            .await
            .map_err(|e| AccessError::unavailable(POLICY_BACKEND, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_body(response).await;
            return Err(AccessError::unavailable(
                POLICY_BACKEND,
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }

        let decision: PolicyResponse = response.json().await.map_err(|e| {
            AccessError::unavailable(
                POLICY_BACKEND,
                format!("failed to parse policy response: {}", e),
            )
        })?;

        debug!(policy = policy_name, allowed = decision.allowed, "policy response");
        Ok(decision.allowed)
    }
}
