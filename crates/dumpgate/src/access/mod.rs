//! Authorization of artifact reads.
//!
//! One pass per request:
//!
//! 1. Look up the capture event for the identifier. No event, or more than
//!    one, is `NotFound`.
//! 2. Ask the policy engine about `<prefix><application>` for the principal.
//! 3. Allowed ends the pass. A denial is final for ordinary principals;
//!    privileged principals get a step-up challenge scoped to the instance,
//!    whose rejection is reported as `StepUpFailed` rather than
//!    `PolicyDenied`.
//!
//! Backend calls are awaited inline and never retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AccessError, AccessResult};
use crate::identifier::ResourceIdentifier;

pub mod event;
pub mod policy;
pub mod step_up;

pub use event::{AuthorizationEvent, EventSource, HttpEventSource};
pub use policy::{HttpPolicyEngine, PolicyEngine, Subject, SubjectUser};
pub use step_up::{
    HttpStepUpEnforcer, StepUpEnforcer, StepUpRejection, StepUpRequest, MAX_ELEVATION_LIFETIME,
};

/// Requesting principal, as supplied by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identity: String,
    #[serde(default)]
    pub is_privileged: bool,
}

impl Principal {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            is_privileged: false,
        }
    }

    pub fn privileged(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            is_privileged: true,
        }
    }
}

/// Per-request values carried through the access path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: Principal,
    /// Previously obtained step-up token, if the client presented one.
    pub step_up_token: Option<String>,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            step_up_token: None,
        }
    }

    pub fn with_step_up_token(mut self, token: impl Into<String>) -> Self {
        self.step_up_token = Some(token.into());
        self
    }
}

/// How access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grant {
    Policy,
    StepUp,
}

/// Access pipeline over the three external backends.
#[derive(Clone)]
pub struct AccessPipeline {
    events: Arc<dyn EventSource>,
    policy: Arc<dyn PolicyEngine>,
    step_up: Arc<dyn StepUpEnforcer>,
    policy_prefix: String,
}

impl std::fmt::Debug for AccessPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPipeline")
            .field("policy_prefix", &self.policy_prefix)
            .finish_non_exhaustive()
    }
}

impl AccessPipeline {
    pub fn new(
        events: Arc<dyn EventSource>,
        policy: Arc<dyn PolicyEngine>,
        step_up: Arc<dyn StepUpEnforcer>,
        policy_prefix: impl Into<String>,
    ) -> Self {
        Self {
            events,
            policy,
            step_up,
            policy_prefix: policy_prefix.into(),
        }
    }

    /// Policy governing artifacts captured for an application.
    pub fn policy_name(&self, event: &AuthorizationEvent) -> String {
        format!("{}{}", self.policy_prefix, event.application)
    }

    /// Decide whether the principal in `ctx` may read the artifact.
    pub async fn authorize(
        &self,
        id: &ResourceIdentifier,
        ctx: &RequestContext,
    ) -> AccessResult<Grant> {
        let principal = &ctx.principal;
        info!(artifact = %id, principal = %principal.identity, "checking access");

        let event = self.lookup_event(id).await?;
        debug!(artifact = %id, ?event, "capture event");

        if principal.identity.is_empty() {
            return Err(AccessError::PolicyDenied {
                policy: self.policy_name(&event),
                message: "no user identity found".to_string(),
            });
        }

        let policy_name = self.policy_name(&event);
        let subject = Subject::for_identity(principal.identity.as_str());

        if self.policy.is_authorized(&policy_name, &subject).await? {
            debug!(policy = %policy_name, "allowed by policy");
            return Ok(Grant::Policy);
        }

        if !principal.is_privileged {
            return Err(AccessError::PolicyDenied {
                policy: policy_name,
                message: format!("{} is not allowed", principal.identity),
            });
        }

        debug!(policy = %policy_name, "denied by policy, principal is privileged; enforcing step-up");
        let request = StepUpRequest::for_instance(id.instance_id())
            .with_token(ctx.step_up_token.as_deref());

        match self.step_up.enforce(&request).await {
            Ok(()) => {
                info!(artifact = %id, scope = %request.scope, "allowed after step-up");
                Ok(Grant::StepUp)
            }
            Err(rejection) => Err(AccessError::StepUpFailed {
                scope: request.scope,
                reason: rejection.reason,
            }),
        }
    }

    async fn lookup_event(&self, id: &ResourceIdentifier) -> AccessResult<AuthorizationEvent> {
        let mut events = self.events.events(id).await?;

        match events.len() {
            1 => Ok(events.remove(0)),
            0 => Err(AccessError::not_found(format!(
                "no event for instanceId={}, commandId={}",
                id.instance_id(),
                id.command_id()
            ))),
            n => {
                warn!(artifact = %id, events = n, "ambiguous event lookup, refusing");
                Err(AccessError::not_found(format!(
                    "{} events for instanceId={}, commandId={}",
                    n,
                    id.instance_id(),
                    id.command_id()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticEvents(AccessResult<Vec<AuthorizationEvent>>);

    #[async_trait]
    impl EventSource for StaticEvents {
        async fn events(&self, _id: &ResourceIdentifier) -> AccessResult<Vec<AuthorizationEvent>> {
            match &self.0 {
                Ok(events) => Ok(events.clone()),
                Err(_) => Err(AccessError::unavailable("event-lookup", "connection refused")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPolicy {
        allowed: bool,
        fail: bool,
        calls: Mutex<Vec<(String, Subject)>>,
    }

    #[async_trait]
    impl PolicyEngine for RecordingPolicy {
        async fn is_authorized(&self, policy_name: &str, subject: &Subject) -> AccessResult<bool> {
            self.calls
                .lock()
                .unwrap()
                .push((policy_name.to_string(), subject.clone()));
            if self.fail {
                return Err(AccessError::unavailable("policy", "HTTP 503"));
            }
            Ok(self.allowed)
        }
    }

    #[derive(Default)]
    struct CountingStepUp {
        approve: bool,
        calls: AtomicUsize,
        last: Mutex<Option<StepUpRequest>>,
    }

    #[async_trait]
    impl StepUpEnforcer for CountingStepUp {
        async fn enforce(&self, request: &StepUpRequest) -> Result<(), StepUpRejection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if self.approve {
                Ok(())
            } else {
                Err(StepUpRejection::new("challenge not completed"))
            }
        }
    }

    fn event(application: &str) -> AuthorizationEvent {
        AuthorizationEvent {
            account_id: Some("1234".into()),
            application: application.into(),
            stack: None,
            region: Some("us-east-1".into()),
        }
    }

    fn id() -> ResourceIdentifier {
        ResourceIdentifier::parse("s3!abc-1!11111111-1111-1111-1111-111111111111!4242").unwrap()
    }

    fn pipeline(
        events: AccessResult<Vec<AuthorizationEvent>>,
        policy: Arc<RecordingPolicy>,
        step_up: Arc<CountingStepUp>,
    ) -> AccessPipeline {
        AccessPipeline::new(Arc::new(StaticEvents(events)), policy, step_up, "jifa-")
    }

    #[tokio::test]
    async fn test_allowed_by_policy() {
        let policy = Arc::new(RecordingPolicy {
            allowed: true,
            ..Default::default()
        });
        let step_up = Arc::new(CountingStepUp::default());
        let pipeline = pipeline(Ok(vec![event("api")]), policy.clone(), step_up.clone());

        let grant = pipeline
            .authorize(&id(), &RequestContext::new(Principal::new("dev@example.com")))
            .await
            .unwrap();

        assert_eq!(grant, Grant::Policy);
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 0);

        let calls = policy.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "jifa-api");
        assert_eq!(calls[0].1, Subject::for_identity("dev@example.com"));
    }

    #[tokio::test]
    async fn test_unprivileged_denial_never_steps_up() {
        let policy = Arc::new(RecordingPolicy::default());
        let step_up = Arc::new(CountingStepUp {
            approve: true,
            ..Default::default()
        });
        let pipeline = pipeline(Ok(vec![event("api")]), policy, step_up.clone());

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::new("dev@example.com")))
            .await;

        assert!(matches!(result, Err(AccessError::PolicyDenied { ref policy, .. }) if policy == "jifa-api"));
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_privileged_denial_allowed_after_step_up() {
        let policy = Arc::new(RecordingPolicy::default());
        let step_up = Arc::new(CountingStepUp {
            approve: true,
            ..Default::default()
        });
        let pipeline = pipeline(Ok(vec![event("api")]), policy, step_up.clone());
        let ctx = RequestContext::new(Principal::privileged("admin@example.com"))
            .with_step_up_token("stairs");

        let grant = pipeline.authorize(&id(), &ctx).await.unwrap();

        assert_eq!(grant, Grant::StepUp);
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 1);
        let request = step_up.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.scope, "instanceId:abc-1");
        assert_eq!(request.max_lifetime, MAX_ELEVATION_LIFETIME);
        assert_eq!(request.token.as_deref(), Some("stairs"));
    }

    #[tokio::test]
    async fn test_privileged_step_up_rejected() {
        let policy = Arc::new(RecordingPolicy::default());
        let step_up = Arc::new(CountingStepUp::default());
        let pipeline = pipeline(Ok(vec![event("api")]), policy, step_up.clone());

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::privileged("admin@example.com")))
            .await;

        match result {
            Err(AccessError::StepUpFailed { scope, reason }) => {
                assert_eq!(scope, "instanceId:abc-1");
                assert_eq!(reason, "challenge not completed");
            }
            other => panic!("expected StepUpFailed, got {other:?}"),
        }
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_privileged_allowed_by_policy_skips_step_up() {
        let policy = Arc::new(RecordingPolicy {
            allowed: true,
            ..Default::default()
        });
        let step_up = Arc::new(CountingStepUp::default());
        let pipeline = pipeline(Ok(vec![event("api")]), policy, step_up.clone());

        let grant = pipeline
            .authorize(&id(), &RequestContext::new(Principal::privileged("admin@example.com")))
            .await
            .unwrap();

        assert_eq!(grant, Grant::Policy);
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_event_is_not_found() {
        let policy = Arc::new(RecordingPolicy::default());
        let pipeline = pipeline(Ok(vec![]), policy.clone(), Arc::default());

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::new("dev@example.com")))
            .await;

        assert!(matches!(result, Err(AccessError::NotFound { .. })));
        assert!(policy.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_events_are_not_found() {
        let policy = Arc::new(RecordingPolicy {
            allowed: true,
            ..Default::default()
        });
        let pipeline = pipeline(
            Ok(vec![event("api"), event("batch")]),
            policy.clone(),
            Arc::default(),
        );

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::new("dev@example.com")))
            .await;

        assert!(matches!(result, Err(AccessError::NotFound { .. })));
        assert!(policy.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_backend_failure() {
        let pipeline = pipeline(
            Err(AccessError::unavailable("event-lookup", "down")),
            Arc::default(),
            Arc::default(),
        );

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::new("dev@example.com")))
            .await;

        assert!(matches!(result, Err(AccessError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_policy_failure_is_fatal_even_for_privileged() {
        let policy = Arc::new(RecordingPolicy {
            fail: true,
            ..Default::default()
        });
        let step_up = Arc::new(CountingStepUp {
            approve: true,
            ..Default::default()
        });
        let pipeline = pipeline(Ok(vec![event("api")]), policy, step_up.clone());

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::privileged("admin@example.com")))
            .await;

        assert!(matches!(result, Err(AccessError::BackendUnavailable { .. })));
        assert_eq!(step_up.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_identity_denied_without_policy_call() {
        let policy = Arc::new(RecordingPolicy {
            allowed: true,
            ..Default::default()
        });
        let pipeline = pipeline(Ok(vec![event("api")]), policy.clone(), Arc::default());

        let result = pipeline
            .authorize(&id(), &RequestContext::new(Principal::privileged("")))
            .await;

        assert!(matches!(result, Err(AccessError::PolicyDenied { .. })));
        assert!(policy.calls.lock().unwrap().is_empty());
    }
}
