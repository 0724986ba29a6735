//! Read-only file service.
//!
//! A read-only deployment serves heap dumps that were written by the capture
//! pipeline. Lookups run parse → resolve → authorize → stat → read-ahead;
//! every mutating operation is refused with `UnsupportedOperation`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::access::{AccessPipeline, Grant, RequestContext};
use crate::config::DumpgateConfig;
use crate::error::{AccessError, AccessResult};
use crate::identifier::ResourceIdentifier;
use crate::layout::{FileKind, PathLookup, PathResolver, HEAP_DUMP_FILENAME};
use crate::readahead::ReadAheadCache;

/// File metadata assembled per lookup. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedFileMetadata {
    pub unique_name: String,
    pub display_name: String,
    pub kind: FileKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
    pub grant: Grant,
}

/// One page of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub items: Vec<T>,
}

/// File operations offered to the file-serving layer.
///
/// Deployments pick an implementation at startup.
#[async_trait]
pub trait FileService: Send + Sync {
    async fn list_files(
        &self,
        kind: FileKind,
        page: usize,
        page_size: usize,
    ) -> AccessResult<Page<CachedFileMetadata>>;

    async fn file_view_by_id(&self, file_id: i64) -> AccessResult<CachedFileMetadata>;

    async fn file_view_by_unique_name(
        &self,
        unique_name: &str,
        ctx: &RequestContext,
    ) -> AccessResult<CachedFileMetadata>;

    async fn delete(&self, file_id: i64) -> AccessResult<()>;

    async fn upload(&self, kind: FileKind, name: &str, content: &[u8]) -> AccessResult<i64>;

    async fn transfer(&self, kind: FileKind, source_url: &str) -> AccessResult<i64>;

    async fn transfer_progress(&self, file_id: i64) -> AccessResult<u8>;

    async fn download(&self, file_id: i64) -> AccessResult<PathBuf>;

    async fn delete_oldest(&self) -> AccessResult<()>;

    /// Names of every stored artifact, grouped by kind.
    async fn all_files(&self) -> AccessResult<HashMap<FileKind, BTreeSet<String>>>;

    /// Whether the storage accepts new artifacts.
    async fn available(&self) -> AccessResult<bool>;

    /// Physical location of a named artifact.
    fn location_of(&self, kind: FileKind, name: &str) -> PathBuf;
}

/// File service over storage written by someone else.
#[derive(Debug)]
pub struct ReadOnlyFileService {
    base: PathBuf,
    layout: Arc<dyn PathLookup>,
    access: AccessPipeline,
    read_ahead: Arc<ReadAheadCache>,
}

impl ReadOnlyFileService {
    pub fn new(
        base: impl Into<PathBuf>,
        layout: Arc<dyn PathLookup>,
        access: AccessPipeline,
        read_ahead: Arc<ReadAheadCache>,
    ) -> AccessResult<Self> {
        let base = base.into();
        if !base.is_dir() {
            return Err(AccessError::config(format!(
                "storage path is not a directory: {}",
                base.display()
            )));
        }

        Ok(Self {
            base,
            layout,
            access,
            read_ahead,
        })
    }

    /// Build from configuration with explicitly supplied collaborators.
    pub fn from_config(
        config: &DumpgateConfig,
        access: AccessPipeline,
        read_ahead: Arc<ReadAheadCache>,
    ) -> AccessResult<Self> {
        config.validate()?;
        let mut resolver = PathResolver::new();
        if let Some(root) = &config.composite_root {
            resolver = resolver.with_composite_root(root);
        }
        Self::new(config.storage_path()?, Arc::new(resolver), access, read_ahead)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn read_ahead(&self) -> &ReadAheadCache {
        &self.read_ahead
    }
}

#[async_trait]
impl FileService for ReadOnlyFileService {
    async fn list_files(
        &self,
        _kind: FileKind,
        page: usize,
        page_size: usize,
    ) -> AccessResult<Page<CachedFileMetadata>> {
        Ok(Page {
            page,
            page_size,
            total: 0,
            items: Vec::new(),
        })
    }

    async fn file_view_by_id(&self, _file_id: i64) -> AccessResult<CachedFileMetadata> {
        Err(AccessError::unsupported("lookup by file id"))
    }

    async fn file_view_by_unique_name(
        &self,
        unique_name: &str,
        ctx: &RequestContext,
    ) -> AccessResult<CachedFileMetadata> {
        let kind = FileKind::HeapDump;

        // Only capture-pipeline artifacts carry the event needed to authorize.
        let id = ResourceIdentifier::parse_required(unique_name)?;
        let (path, scheme) = self.layout.locate(&self.base, kind, unique_name);
        debug!(file = unique_name, %scheme, "resolved heap dump");

        let grant = self.access.authorize(&id, ctx).await?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            debug!(path = %path.display(), error = %e, "stat failed");
            AccessError::not_found(format!("file information not present for {}", unique_name))
        })?;
        if !metadata.is_file() {
            return Err(AccessError::not_found(format!(
                "not a file: {}",
                path.display()
            )));
        }

        let created_at: DateTime<Utc> = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let issued = self.read_ahead.issue_for_path(&path);
        info!(file = unique_name, issued, ?grant, "serving heap dump");

        Ok(CachedFileMetadata {
            unique_name: unique_name.to_string(),
            display_name: HEAP_DUMP_FILENAME.to_string(),
            kind,
            size_bytes: metadata.len(),
            created_at,
            path,
            grant,
        })
    }

    async fn delete(&self, _file_id: i64) -> AccessResult<()> {
        Err(AccessError::unsupported("delete"))
    }

    async fn upload(&self, _kind: FileKind, _name: &str, _content: &[u8]) -> AccessResult<i64> {
        Err(AccessError::unsupported("upload"))
    }

    async fn transfer(&self, _kind: FileKind, _source_url: &str) -> AccessResult<i64> {
        Err(AccessError::unsupported("transfer"))
    }

    async fn transfer_progress(&self, _file_id: i64) -> AccessResult<u8> {
        Err(AccessError::unsupported("transfer progress"))
    }

    async fn download(&self, _file_id: i64) -> AccessResult<PathBuf> {
        Err(AccessError::unsupported("download"))
    }

    async fn delete_oldest(&self) -> AccessResult<()> {
        Err(AccessError::unsupported("delete oldest"))
    }

    async fn all_files(&self) -> AccessResult<HashMap<FileKind, BTreeSet<String>>> {
        // Storage is owned by the capture pipeline; nothing is indexed here.
        Ok(HashMap::new())
    }

    async fn available(&self) -> AccessResult<bool> {
        Err(AccessError::unsupported("storage availability"))
    }

    fn location_of(&self, kind: FileKind, name: &str) -> PathBuf {
        self.layout.lookup(&self.base, kind, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{
        AuthorizationEvent, EventSource, PolicyEngine, Principal, StepUpEnforcer, StepUpRejection,
        StepUpRequest, Subject,
    };
    use crate::readahead::{ReadAheadConfig, WarmReader, DEFAULT_INDEX_FILES};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const NAME: &str = "s3!abc-1!11111111-1111-1111-1111-111111111111!4242";

    struct OneEvent;

    #[async_trait]
    impl EventSource for OneEvent {
        async fn events(&self, _id: &ResourceIdentifier) -> AccessResult<Vec<AuthorizationEvent>> {
            Ok(vec![AuthorizationEvent {
                account_id: None,
                application: "api".into(),
                stack: None,
                region: None,
            }])
        }
    }

    struct FixedPolicy(bool);

    #[async_trait]
    impl PolicyEngine for FixedPolicy {
        async fn is_authorized(&self, _policy: &str, _subject: &Subject) -> AccessResult<bool> {
            Ok(self.0)
        }
    }

    struct Reject;

    #[async_trait]
    impl StepUpEnforcer for Reject {
        async fn enforce(&self, _request: &StepUpRequest) -> Result<(), StepUpRejection> {
            Err(StepUpRejection::new("no"))
        }
    }

    #[derive(Default)]
    struct CountingReader(AtomicUsize);

    impl WarmReader for CountingReader {
        fn warm(&self, _path: &Path) -> io::Result<u64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn service(
        base: &Path,
        allowed: bool,
    ) -> (ReadOnlyFileService, Arc<CountingReader>) {
        let access = AccessPipeline::new(
            Arc::new(OneEvent),
            Arc::new(FixedPolicy(allowed)),
            Arc::new(Reject),
            "jifa-",
        );
        let reader = Arc::new(CountingReader::default());
        let read_ahead =
            Arc::new(ReadAheadCache::with_reader(ReadAheadConfig::default(), reader.clone()).unwrap());
        let service =
            ReadOnlyFileService::new(base, Arc::new(PathResolver::new()), access, read_ahead)
                .unwrap();
        (service, reader)
    }

    fn write_dump(base: &Path) -> PathBuf {
        let dir = base
            .join("heap-dump/abc-1/11111111-1111-1111-1111-111111111111/4242");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("heapdump.hprof");
        std::fs::write(&path, b"JAVA PROFILE 1.0.2\0").unwrap();
        path
    }

    fn wait_idle(cache: &ReadAheadCache) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.in_flight() > 0 {
            assert!(Instant::now() < deadline, "read-ahead did not drain");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Principal::new("dev@example.com"))
    }

    #[tokio::test]
    async fn test_lookup_composite_dump() {
        let temp_dir = TempDir::new().unwrap();
        let dump = write_dump(temp_dir.path());
        let (service, reader) = service(temp_dir.path(), true);

        let view = service.file_view_by_unique_name(NAME, &ctx()).await.unwrap();

        assert_eq!(view.unique_name, NAME);
        assert_eq!(view.display_name, "heapdump.hprof");
        assert_eq!(view.kind, FileKind::HeapDump);
        assert_eq!(view.size_bytes, 19);
        assert_eq!(view.path, dump);
        assert_eq!(view.grant, Grant::Policy);

        wait_idle(service.read_ahead());
        assert_eq!(reader.0.load(Ordering::SeqCst), DEFAULT_INDEX_FILES.len());
    }

    #[tokio::test]
    async fn test_denied_lookup_skips_read_ahead() {
        let temp_dir = TempDir::new().unwrap();
        write_dump(temp_dir.path());
        let (service, reader) = service(temp_dir.path(), false);

        let err = service.file_view_by_unique_name(NAME, &ctx()).await.unwrap_err();

        assert!(matches!(err, AccessError::PolicyDenied { .. }));
        assert_eq!(service.read_ahead().tracked(), 0);
        assert_eq!(reader.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_dump_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(temp_dir.path(), true);

        let err = service.file_view_by_unique_name(NAME, &ctx()).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { .. }));
        assert_eq!(service.read_ahead().tracked(), 0);
    }

    #[tokio::test]
    async fn test_plain_name_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(temp_dir.path(), true);

        let err = service
            .file_view_by_unique_name("myfile", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::MalformedIdentifier { .. }));

        let err = service
            .file_view_by_unique_name("../../etc/passwd", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::MalformedIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_mutations_are_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(temp_dir.path(), true);

        assert!(matches!(service.delete(1).await, Err(AccessError::UnsupportedOperation { .. })));
        assert!(matches!(
            service.upload(FileKind::HeapDump, "x", b"data").await,
            Err(AccessError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            service.transfer(FileKind::GcLog, "https://x").await,
            Err(AccessError::UnsupportedOperation { .. })
        ));
        assert!(matches!(service.transfer_progress(1).await, Err(AccessError::UnsupportedOperation { .. })));
        assert!(matches!(service.download(1).await, Err(AccessError::UnsupportedOperation { .. })));
        assert!(matches!(service.delete_oldest().await, Err(AccessError::UnsupportedOperation { .. })));
        assert!(matches!(service.file_view_by_id(1).await, Err(AccessError::UnsupportedOperation { .. })));
        assert!(matches!(service.available().await, Err(AccessError::UnsupportedOperation { .. })));
    }

    #[tokio::test]
    async fn test_all_files_is_empty_even_with_dumps_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        write_dump(temp_dir.path());
        let (service, _) = service(temp_dir.path(), true);

        assert!(service.all_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_is_empty_page() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(temp_dir.path(), true);

        let page = service.list_files(FileKind::HeapDump, 2, 20).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 20);
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_location_of() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(temp_dir.path(), true);

        assert_eq!(
            service.location_of(FileKind::HeapDump, "myfile"),
            temp_dir.path().join("heap-dump/myfile/myfile")
        );
        assert!(service
            .location_of(FileKind::HeapDump, NAME)
            .ends_with("4242/heapdump.hprof"));
    }

    /// Puts every artifact at `<base>/flat.hprof`.
    #[derive(Debug)]
    struct FlatLayout;

    impl PathLookup for FlatLayout {
        fn locate(
            &self,
            base: &Path,
            _kind: FileKind,
            _name: &str,
        ) -> (PathBuf, crate::layout::AddressingScheme) {
            (base.join("flat.hprof"), crate::layout::AddressingScheme::Default)
        }
    }

    #[tokio::test]
    async fn test_injected_layout_is_used() {
        let temp_dir = TempDir::new().unwrap();
        let flat = temp_dir.path().join("flat.hprof");
        std::fs::write(&flat, vec![0u8; 7]).unwrap();

        let access = AccessPipeline::new(
            Arc::new(OneEvent),
            Arc::new(FixedPolicy(true)),
            Arc::new(Reject),
            "jifa-",
        );
        let read_ahead = Arc::new(
            ReadAheadCache::with_reader(
                ReadAheadConfig::default(),
                Arc::new(CountingReader::default()),
            )
            .unwrap(),
        );
        let service =
            ReadOnlyFileService::new(temp_dir.path(), Arc::new(FlatLayout), access, read_ahead)
                .unwrap();

        let view = service.file_view_by_unique_name(NAME, &ctx()).await.unwrap();
        assert_eq!(view.path, flat);
        assert_eq!(view.size_bytes, 7);
        assert_eq!(service.location_of(FileKind::GcLog, "anything"), flat);
        wait_idle(service.read_ahead());
    }

    #[test]
    fn test_base_must_be_directory() {
        let temp_dir = TempDir::new().unwrap();
        let access = AccessPipeline::new(
            Arc::new(OneEvent),
            Arc::new(FixedPolicy(true)),
            Arc::new(Reject),
            "",
        );
        let read_ahead = Arc::new(ReadAheadCache::new(ReadAheadConfig::default()).unwrap());

        let result = ReadOnlyFileService::new(
            temp_dir.path().join("missing"),
            Arc::new(PathResolver::new()),
            access,
            read_ahead,
        );
        assert!(matches!(result, Err(AccessError::Config { .. })));
    }
}
