//! Read-only access to heap dumps produced by a capture pipeline.
//!
//! This crate implements the read path of a heap dump analysis service:
//!
//! - Composite identifier codec (`s3!<instance>!<command>!<pid>`)
//! - Storage layout for composite and plain names
//! - Two-tier authorization: policy engine, then step-up for privileged users
//! - Read-ahead of the index files that analysis reads randomly
//! - A read-only file service combining the above
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dumpgate::{
//!     AccessPipeline, DumpgateConfig, FileService, HttpEventSource, HttpPolicyEngine,
//!     HttpStepUpEnforcer, Principal, ReadAheadCache, ReadOnlyFileService, RequestContext,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DumpgateConfig::from_env();
//! let backends = &config.backends;
//!
//! let access = AccessPipeline::new(
//!     Arc::new(HttpEventSource::new(backends.event_api_url()?, backends.timeout())?),
//!     Arc::new(HttpPolicyEngine::new(backends.policy_url()?, backends.timeout())?),
//!     Arc::new(HttpStepUpEnforcer::new(backends.step_up_url()?, backends.timeout())?),
//!     backends.policy_prefix.clone(),
//! );
//! let read_ahead = Arc::new(ReadAheadCache::new(config.read_ahead.clone())?);
//! let files = ReadOnlyFileService::from_config(&config, access, read_ahead)?;
//!
//! let ctx = RequestContext::new(Principal::new("dev@example.com"));
//! let view = files.file_view_by_unique_name("s3!i-0abc!cmd-1!4242", &ctx).await?;
//! println!("{} bytes", view.size_bytes);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod config;
pub mod error;
mod http;
pub mod identifier;
pub mod layout;
pub mod readahead;
pub mod service;

pub use access::{
    AccessPipeline, AuthorizationEvent, EventSource, Grant, HttpEventSource, HttpPolicyEngine,
    HttpStepUpEnforcer, PolicyEngine, Principal, RequestContext, StepUpEnforcer, StepUpRejection,
    StepUpRequest, Subject, MAX_ELEVATION_LIFETIME,
};
pub use config::{BackendConfig, DumpgateConfig};
pub use error::{AccessError, AccessResult, ErrorKind};
pub use http::DUMPGATE_USER_AGENT;
pub use identifier::{ResourceIdentifier, COMPOSITE_SCHEME};
pub use layout::{AddressingScheme, FileKind, PathLookup, PathResolver, HEAP_DUMP_FILENAME};
pub use readahead::{
    ChunkedReader, ReadAheadCache, ReadAheadConfig, ReadAheadRegistry, WarmReader,
    DEFAULT_INDEX_FILES,
};
pub use service::{CachedFileMetadata, FileService, Page, ReadOnlyFileService};
