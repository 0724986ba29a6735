//! Index read-ahead.
//!
//! Analysis of a heap dump hits a set of index files next to the dump with
//! random reads. Reading those files once, front to back, right after access
//! is granted puts them in the OS page cache before the analysis needs them.
//!
//! Issuance is fire-and-forget. Each index file is a key in a process-wide
//! registry of last-issued timestamps; a read is only issued when the key is
//! absent or older than the staleness window. The timestamp is recorded
//! before the read is queued and refreshed when it starts and finishes. Two
//! near-simultaneous callers may both see a stale entry and both issue a
//! read; that duplicate is accepted.
//!
//! Registry entries are never evicted.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AccessError, AccessResult};

/// Index files written next to `heapdump.hprof`, in issue order.
pub const DEFAULT_INDEX_FILES: [&str; 9] = [
    "heapdump.i2sv2.index",    // retained size cache (histogram, leak suspects)
    "heapdump.domOut.index",   // dominator tree outbound
    "heapdump.o2ret.index",    // retained size per object
    "heapdump.o2hprof.index",  // file pointer
    "heapdump.o2c.index",      // object to class id
    "heapdump.a2s.index",      // array to size
    "heapdump.inbound.index",  // inbound references
    "heapdump.outbound.index", // outbound references
    "heapdump.domIn.index",    // dominator tree inbound
];

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_READ_THREADS: usize = 16;
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Read-ahead configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAheadConfig {
    /// Maximum concurrent warming reads.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Read buffer size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Staleness window in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Index file names, relative to the dump's directory.
    #[serde(default = "default_index_files")]
    pub index_files: Vec<String>,
}

fn default_threads() -> usize {
    DEFAULT_READ_THREADS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_index_files() -> Vec<String> {
    DEFAULT_INDEX_FILES.iter().map(|s| s.to_string()).collect()
}

impl Default for ReadAheadConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            chunk_size: default_chunk_size(),
            max_age_secs: default_max_age_secs(),
            index_files: default_index_files(),
        }
    }
}

impl ReadAheadConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_index_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> AccessResult<()> {
        if self.threads == 0 {
            return Err(AccessError::config("read_ahead.threads must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(AccessError::config("read_ahead.chunk_size must be at least 1"));
        }
        Ok(())
    }
}

/// Performs the warming read of one file.
pub trait WarmReader: Send + Sync + 'static {
    /// Read `path` to the end, returning the number of bytes read.
    fn warm(&self, path: &Path) -> io::Result<u64>;
}

/// Reads a file sequentially in fixed-size chunks and discards the data.
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    chunk_size: usize,
}

impl ChunkedReader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl WarmReader for ChunkedReader {
    fn warm(&self, path: &Path) -> io::Result<u64> {
        let mut file = File::open(path)?;
        let mut chunk = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            match file.read(&mut chunk) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Last-issued timestamps keyed by absolute file path.
#[derive(Debug)]
pub struct ReadAheadRegistry {
    entries: DashMap<String, DateTime<Utc>>,
    max_age: Duration,
}

impl ReadAheadRegistry {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    pub fn last_issued(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    pub fn record(&self, key: &str, at: DateTime<Utc>) {
        self.entries.insert(key.to_string(), at);
    }

    /// Whether `key` is absent or was last issued longer ago than the window.
    pub fn needs_load(&self, key: &str, now: DateTime<Utc>) -> bool {
        match self.last_issued(key) {
            None => true,
            // A timestamp in the future (clock step) counts as fresh.
            Some(issued) => match (now - issued).to_std() {
                Ok(age) => age > self.max_age,
                Err(_) => false,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bounded pool of blocking workers owned by one cache.
///
/// Backed by a dedicated runtime whose blocking pool is capped at the
/// configured thread count; submissions beyond the cap wait in its queue.
pub struct WorkerPool {
    runtime: Option<tokio::runtime::Runtime>,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> AccessResult<Self> {
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name_fn(move || {
                format!("read-ahead-{}", counter.fetch_add(1, Ordering::Relaxed))
            })
            .build()
            .map_err(|e| AccessError::config(format!("failed to start read-ahead pool: {}", e)))?;

        Ok(Self {
            runtime: Some(runtime),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(runtime) = &self.runtime {
            // Detached: nothing waits for or cancels a warming read.
            drop(runtime.spawn_blocking(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}

/// Decrements the in-flight count when a job ends, panicking or not.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deduplicating read-ahead of index files.
pub struct ReadAheadCache {
    config: ReadAheadConfig,
    registry: Arc<ReadAheadRegistry>,
    reader: Arc<dyn WarmReader>,
    pool: WorkerPool,
    in_flight: Arc<AtomicUsize>,
}

impl ReadAheadCache {
    pub fn new(config: ReadAheadConfig) -> AccessResult<Self> {
        let reader = ChunkedReader::new(config.chunk_size);
        Self::with_reader(config, Arc::new(reader))
    }

    pub fn with_reader(config: ReadAheadConfig, reader: Arc<dyn WarmReader>) -> AccessResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.threads)?;

        info!(
            read_threads = config.threads,
            chunk_size = config.chunk_size,
            max_age_secs = config.max_age_secs,
            "read-ahead ready"
        );

        Ok(Self {
            registry: Arc::new(ReadAheadRegistry::new(config.max_age())),
            config,
            reader,
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Issue reads for the index files next to a heap dump.
    ///
    /// Returns the number of reads actually issued.
    pub fn issue_for_path(&self, dump: &Path) -> usize {
        let dir = dump.parent().unwrap_or_else(|| Path::new(""));
        self.config
            .index_files
            .iter()
            .filter(|index| self.issue_read_file(dir.join(index.as_str())))
            .count()
    }

    /// Issue a read for one file unless a fresh one is already on record.
    pub fn issue_read_file(&self, file: PathBuf) -> bool {
        let key = file.to_string_lossy().into_owned();
        let now = Utc::now();

        if !self.registry.needs_load(&key, now) {
            debug!(file = %key, "read-ahead still fresh, skipping");
            return false;
        }

        self.registry.record(&key, now);
        info!(file = %key, "issuing read-ahead");

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let registry = Arc::clone(&self.registry);
        let reader = Arc::clone(&self.reader);

        self.pool.submit(move || {
            let _guard = guard;
            registry.record(&key, Utc::now());
            debug!(file = %key, "read-ahead started");

            match reader.warm(&file) {
                Ok(bytes) => info!(file = %key, bytes, "read-ahead completed"),
                Err(e) => warn!(file = %key, error = %e, "read-ahead failed"),
            }

            registry.record(&key, Utc::now());
        });

        true
    }

    /// Reads queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Files with a registry entry.
    pub fn tracked(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &ReadAheadRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ReadAheadConfig {
        &self.config
    }
}

impl std::fmt::Debug for ReadAheadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadAheadCache")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("tracked", &self.tracked())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
