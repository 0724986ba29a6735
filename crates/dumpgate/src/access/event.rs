//! Capture-event lookup backend.
//!
//! Every composite identifier was produced by a capture command whose event
//! record names the owning application. The record is fetched from
//!
//! ```text
//! GET <base>/api/jifa/fc-event/<instance-id>/<command-id>
//! ```
//!
//! which answers with a JSON array of events.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AccessError, AccessResult};
use crate::http::{build_client, endpoint, error_body, join_url};
use crate::identifier::ResourceIdentifier;

pub(crate) const EVENT_BACKEND: &str = "event-lookup";

const EVENT_PATH: &str = "api/jifa/fc-event";

/// Capture event for an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    #[serde(rename = "account_id", default)]
    pub account_id: Option<String>,

    pub application: String,

    #[serde(default)]
    pub stack: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

/// Source of capture events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// All events recorded for the identifier's instance and command.
    async fn events(&self, id: &ResourceIdentifier) -> AccessResult<Vec<AuthorizationEvent>>;
}

/// HTTP event backend.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AccessResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: endpoint(base_url.into())?,
        })
    }

    pub fn event_url(&self, id: &ResourceIdentifier) -> String {
        join_url(
            &self.base_url,
            &[EVENT_PATH, id.instance_id(), id.command_id()],
        )
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn events(&self, id: &ResourceIdentifier) -> AccessResult<Vec<AuthorizationEvent>> {
        let url = self.event_url(id);
        debug!(url = %url, "looking up capture event");

        let response = self
            .client
            .get(&url)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            404 => return Ok(Vec::new()),
            code => {
                let message = error_body(response).await;
                return Err(AccessError::unavailable(
                    EVENT_BACKEND,
                    format!("HTTP {}: {}", code, message),
                ));
            }
        }

        response.json().await.map_err(|e| {
            AccessError::unavailable(
                EVENT_BACKEND,
                format!("failed to parse event response: {}", e),
            )
        })
    }
}
