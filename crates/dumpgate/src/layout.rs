//! Physical storage layout.
//!
//! Two addressing schemes map a name to a file:
//!
//! ```text
//! composite  s3!<instance>!<command>!<pid>  <root>/<kind-dir>/<instance>/<command>/<pid>/heapdump.hprof
//! default    <name>                         <base>/<kind-dir>/<name>/<name>
//! ```
//!
//! The composite scheme applies to heap dumps only. Its directory segments
//! come straight from a parsed [`ResourceIdentifier`], whose validation is
//! what keeps the path inside `<root>/<kind-dir>`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AccessError;
use crate::identifier::ResourceIdentifier;

/// File name of a composite-addressed heap dump.
pub const HEAP_DUMP_FILENAME: &str = "heapdump.hprof";

/// Kind of analysis artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    HeapDump,
    GcLog,
    ThreadDump,
    JfrFile,
}

impl FileKind {
    /// Directory under the storage root holding artifacts of this kind.
    pub fn storage_dir(&self) -> &'static str {
        match self {
            Self::HeapDump => "heap-dump",
            Self::GcLog => "gc-log",
            Self::ThreadDump => "thread-dump",
            Self::JfrFile => "jfr-file",
        }
    }

    /// Whether the composite scheme addresses this kind.
    pub fn is_large_artifact(&self) -> bool {
        matches!(self, Self::HeapDump)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_dir())
    }
}

impl FromStr for FileKind {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heap-dump" => Ok(Self::HeapDump),
            "gc-log" => Ok(Self::GcLog),
            "thread-dump" => Ok(Self::ThreadDump),
            "jfr-file" => Ok(Self::JfrFile),
            other => Err(AccessError::config(format!("unknown file kind: {}", other))),
        }
    }
}

/// Addressing scheme a name was resolved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingScheme {
    Composite,
    Default,
}

impl fmt::Display for AddressingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composite => f.write_str("composite"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Maps artifact names to physical paths.
pub trait PathLookup: fmt::Debug + Send + Sync {
    /// Resolve a name, reporting which scheme was used.
    fn locate(&self, base: &Path, kind: FileKind, name: &str) -> (PathBuf, AddressingScheme);

    fn lookup(&self, base: &Path, kind: FileKind, name: &str) -> PathBuf {
        self.locate(base, kind, name).0
    }
}

/// Path resolver for both addressing schemes.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    /// Root for composite-addressed artifacts. `None` uses the base path.
    composite_root: Option<PathBuf>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve composite names under a root other than the base path.
    pub fn with_composite_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.composite_root = Some(root.into());
        self
    }

    /// Resolve a name, reporting which scheme was used.
    pub fn resolve(&self, base: &Path, kind: FileKind, name: &str) -> (PathBuf, AddressingScheme) {
        if kind.is_large_artifact() {
            if let Some(id) = ResourceIdentifier::parse(name) {
                let root = self.composite_root.as_deref().unwrap_or(base);
                let path = composite_path(root, kind, &id);
                info!(name, %kind, path = %path.display(), scheme = "composite", "path lookup");
                return (path, AddressingScheme::Composite);
            }
        }

        let path = base.join(kind.storage_dir()).join(name).join(name);
        info!(name, %kind, path = %path.display(), scheme = "default", "path lookup");
        (path, AddressingScheme::Default)
    }
}

impl PathLookup for PathResolver {
    fn locate(&self, base: &Path, kind: FileKind, name: &str) -> (PathBuf, AddressingScheme) {
        self.resolve(base, kind, name)
    }
}

/// Physical path of a composite-addressed artifact under `root`.
pub fn composite_path(root: &Path, kind: FileKind, id: &ResourceIdentifier) -> PathBuf {
    root.join(kind.storage_dir())
        .join(id.instance_id())
        .join(id.command_id())
        .join(id.pid().to_string())
        .join(HEAP_DUMP_FILENAME)
}
