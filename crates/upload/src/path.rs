//! Virtual path resolution and folder materialization.
//!
//! A [`PathResolver`] maps `/`-separated paths to server folder ids. It keeps
//! a per-parent `name → id` cache filled by listing each parent at most once,
//! and creates missing folders on demand, treating a name collision as a
//! benign race with another client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use skyvault_protocol::constants::{ROOT_FOLDER_ID, ROOT_KEYWORD};
use skyvault_protocol::messages::{CreateFolderRequest, FileListRequest};
use skyvault_protocol::FileRecord;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::StorageApi;
use crate::error::UploadError;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// VirtualPath
// ---------------------------------------------------------------------------

/// A parsed virtual folder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    absolute: bool,
    segments: Vec<String>,
}

impl VirtualPath {
    /// Parses a user-supplied path.
    ///
    /// Backslashes count as separators; empty and `.` segments are dropped.
    /// A leading `/`, or the word `root` in any case, anchors the path at the
    /// root folder. `..` is rejected.
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        let normalized = raw.trim().replace('\\', "/");
        if normalized.eq_ignore_ascii_case(ROOT_KEYWORD) {
            return Ok(Self {
                absolute: true,
                segments: Vec::new(),
            });
        }

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(UploadError::Validation(format!(
                        "parent directory segments are not supported: {raw}"
                    )));
                }
                s => segments.push(s.to_string()),
            }
        }

        Ok(Self {
            absolute: normalized.starts_with('/'),
            segments,
        })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Folder the walk starts from.
    pub fn start_id(&self, base_id: u64) -> u64 {
        if self.absolute { ROOT_FOLDER_ID } else { base_id }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        f.write_str(&self.segments.join("/"))
    }
}

// ---------------------------------------------------------------------------
// FolderCache
// ---------------------------------------------------------------------------

/// `parent id → (folder name → folder id)`.
///
/// A parent is either fully loaded from one listing or absent. Only folders
/// are cached.
#[derive(Debug, Default)]
pub struct FolderCache {
    parents: HashMap<u64, HashMap<String, u64>>,
}

impl FolderCache {
    pub fn get(&self, parent_id: u64, name: &str) -> Option<u64> {
        self.parents.get(&parent_id)?.get(name).copied()
    }

    pub fn is_loaded(&self, parent_id: u64) -> bool {
        self.parents.contains_key(&parent_id)
    }

    /// Replaces the entry for `parent_id` with the folders in `children`.
    ///
    /// On duplicate names the last listed (newest) folder wins.
    pub fn fill(&mut self, parent_id: u64, children: &[FileRecord]) {
        let folders = children
            .iter()
            .filter(|r| r.is_dir)
            .map(|r| (r.name.clone(), r.id))
            .collect();
        self.parents.insert(parent_id, folders);
    }

    pub fn invalidate(&mut self, parent_id: u64) {
        self.parents.remove(&parent_id);
    }

    pub fn clear(&mut self) {
        self.parents.clear();
    }

    /// Number of loaded parents.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PathResolver
// ---------------------------------------------------------------------------

/// Options for [`PathResolver::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Folder relative paths start from.
    pub base_id: u64,
    /// Create missing segments instead of failing.
    pub create_missing: bool,
}

/// Resolves and materializes virtual folder paths.
///
/// Safe to share behind an `Arc`: the cache is locked across each listing,
/// and folder creation on one resolver is serialized.
pub struct PathResolver {
    api: Arc<dyn StorageApi>,
    retry: RetryPolicy,
    cache: Mutex<FolderCache>,
    /// `(base id, "a/b") → id`, filled by `ensure_folder_path`.
    prefixes: Mutex<HashMap<(u64, String), u64>>,
    create_lock: Mutex<()>,
    last_folder: std::sync::Mutex<Option<(String, u64)>>,
}

impl PathResolver {
    pub fn new(api: Arc<dyn StorageApi>) -> Self {
        Self {
            api,
            retry: RetryPolicy::none(),
            cache: Mutex::new(FolderCache::default()),
            prefixes: Mutex::new(HashMap::new()),
            create_lock: Mutex::new(()),
            last_folder: std::sync::Mutex::new(None),
        }
    }

    /// Retry policy for directory listings. Folder creation is never retried.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolves `path` to a folder id.
    ///
    /// Empty or `.` yields `base_id`; `/` and `root` yield the root folder.
    pub async fn resolve(&self, path: &str, opts: ResolveOptions) -> Result<u64, UploadError> {
        let vpath = VirtualPath::parse(path)?;
        let start = vpath.start_id(opts.base_id);

        let id = if opts.create_missing {
            self.ensure_folder_path(start, vpath.segments()).await?
        } else {
            let mut current = start;
            for segment in vpath.segments() {
                current = self
                    .resolve_folder_id(current, segment)
                    .await?
                    .ok_or_else(|| UploadError::PathNotFound {
                        segment: segment.clone(),
                        parent_id: current,
                    })?;
            }
            current
        };

        debug!(path = %vpath, folder_id = id, "path resolved");
        if let Ok(mut last) = self.last_folder.lock() {
            *last = Some((vpath.to_string(), id));
        }
        Ok(id)
    }

    /// Looks up folder `name` under `parent_id`, listing the parent on a
    /// cache miss. `None` means the folder does not exist.
    pub async fn resolve_folder_id(
        &self,
        parent_id: u64,
        name: &str,
    ) -> Result<Option<u64>, UploadError> {
        let mut cache = self.cache.lock().await;
        if !cache.is_loaded(parent_id) {
            let api = &*self.api;
            let listing = self
                .retry
                .run("list folder", move || {
                    api.list_files(FileListRequest::whole_directory(parent_id))
                })
                .await
                .map_err(|e| folder_failed(name, parent_id, e))?;
            debug!(parent_id, entries = listing.files.len(), "folder listed");
            cache.fill(parent_id, &listing.files);
        }
        Ok(cache.get(parent_id, name))
    }

    /// Returns the id of folder `name` under `parent_id`, creating it if
    /// needed.
    pub async fn ensure_folder(&self, parent_id: u64, name: &str) -> Result<u64, UploadError> {
        validate_folder_name(name)?;
        let _creating = self.create_lock.lock().await;

        if let Some(id) = self.resolve_folder_id(parent_id, name).await? {
            return Ok(id);
        }

        let req = CreateFolderRequest {
            parent_id,
            name: name.to_string(),
        };
        match self.api.create_folder(req).await {
            Ok(()) => debug!(parent_id, name, "folder created"),
            Err(UploadError::Conflict { message, .. }) => {
                debug!(parent_id, name, %message, "folder created concurrently")
            }
            Err(e) => return Err(folder_failed(name, parent_id, e)),
        }

        self.invalidate(parent_id).await;
        self.resolve_folder_id(parent_id, name)
            .await?
            .ok_or_else(|| UploadError::InconsistentState {
                name: name.to_string(),
                parent_id,
            })
    }

    /// Materializes `segments` below `base_id` and returns the deepest id.
    ///
    /// Each prefix is memoized, so repeating a path (or a shared prefix)
    /// costs no further calls.
    pub async fn ensure_folder_path(
        &self,
        base_id: u64,
        segments: &[String],
    ) -> Result<u64, UploadError> {
        let mut current = base_id;
        let mut prefix = String::new();
        for segment in segments {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            let key = (base_id, prefix.clone());

            let known = self.prefixes.lock().await.get(&key).copied();
            current = match known {
                Some(id) => id,
                None => {
                    let id = self.ensure_folder(current, segment).await?;
                    self.prefixes.lock().await.insert(key, id);
                    id
                }
            };
        }
        Ok(current)
    }

    /// Forgets the cached children of `parent_id`.
    pub async fn invalidate(&self, parent_id: u64) {
        self.cache.lock().await.invalidate(parent_id);
    }

    /// Forgets every cached listing and memoized prefix.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
        self.prefixes.lock().await.clear();
    }

    /// The last path this resolver resolved, with its id.
    pub fn last_folder(&self) -> Option<(String, u64)> {
        self.last_folder.lock().ok().and_then(|last| last.clone())
    }
}

fn folder_failed(segment: &str, parent_id: u64, source: UploadError) -> UploadError {
    UploadError::FolderFailed {
        segment: segment.to_string(),
        parent_id,
        source: Box::new(source),
    }
}

fn validate_folder_name(name: &str) -> Result<(), UploadError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || name.contains(['/', '\\']) {
        return Err(UploadError::Validation(format!(
            "invalid folder name: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    fn resolver(fake: &Arc<FakeStorage>) -> PathResolver {
        PathResolver::new(Arc::clone(fake) as Arc<dyn StorageApi>)
    }

    fn relative(base_id: u64) -> ResolveOptions {
        ResolveOptions {
            base_id,
            create_missing: false,
        }
    }

    fn creating(base_id: u64) -> ResolveOptions {
        ResolveOptions {
            base_id,
            create_missing: true,
        }
    }

    #[test]
    fn parse_special_forms() {
        for raw in ["", "  ", ".", "./", "//"] {
            let p = VirtualPath::parse(raw).unwrap();
            assert!(p.is_empty(), "{raw:?}");
        }
        for raw in ["/", "root", "ROOT", " Root "] {
            let p = VirtualPath::parse(raw).unwrap();
            assert!(p.is_absolute() && p.is_empty(), "{raw:?}");
            assert_eq!(p.start_id(9), ROOT_FOLDER_ID);
        }
    }

    #[test]
    fn parse_segments() {
        let p = VirtualPath::parse(" /photos//2024/./trip/ ").unwrap();
        assert!(p.is_absolute());
        assert_eq!(p.segments(), ["photos", "2024", "trip"]);
        assert_eq!(p.to_string(), "/photos/2024/trip");

        let p = VirtualPath::parse("docs\\work").unwrap();
        assert!(!p.is_absolute());
        assert_eq!(p.segments(), ["docs", "work"]);
        assert_eq!(p.start_id(9), 9);

        // Only the bare word is special.
        let p = VirtualPath::parse("root/x").unwrap();
        assert_eq!(p.segments(), ["root", "x"]);
    }

    #[test]
    fn parse_rejects_parent_segments() {
        assert!(matches!(
            VirtualPath::parse("a/../b"),
            Err(UploadError::Validation(_))
        ));
        assert!(VirtualPath::parse("..").is_err());
    }

    #[test]
    fn cache_keeps_folders_only() {
        let mut cache = FolderCache::default();
        let children = vec![
            FileRecord {
                id: 1,
                name: "a".into(),
                parent_id: 0,
                size: 0,
                hash: String::new(),
                is_dir: true,
            },
            FileRecord {
                id: 2,
                name: "b".into(),
                parent_id: 0,
                size: 5,
                hash: "ff".into(),
                is_dir: false,
            },
        ];
        cache.fill(0, &children);
        assert!(cache.is_loaded(0));
        assert_eq!(cache.get(0, "a"), Some(1));
        assert_eq!(cache.get(0, "b"), None);
        cache.invalidate(0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn special_paths_need_no_calls() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);
        assert_eq!(r.resolve("", relative(5)).await.unwrap(), 5);
        assert_eq!(r.resolve(".", relative(5)).await.unwrap(), 5);
        assert_eq!(r.resolve("/", relative(5)).await.unwrap(), 0);
        assert_eq!(r.resolve("root", creating(5)).await.unwrap(), 0);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn leading_slash_discards_base() {
        let fake = Arc::new(FakeStorage::new());
        let docs = fake.add_folder(0, "docs");
        let other = fake.add_folder(0, "other");
        fake.add_folder(other, "docs");

        let r = resolver(&fake);
        assert_eq!(r.resolve("/docs", relative(other)).await.unwrap(), docs);
        assert_ne!(r.resolve("docs", relative(other)).await.unwrap(), docs);
    }

    #[tokio::test]
    async fn repeated_resolution_lists_each_parent_once() {
        let fake = Arc::new(FakeStorage::new());
        let a = fake.add_folder(0, "a");
        let b = fake.add_folder(a, "b");

        let r = resolver(&fake);
        for _ in 0..3 {
            assert_eq!(r.resolve("a/b", relative(0)).await.unwrap(), b);
        }
        assert_eq!(fake.lists(), vec![0, a]);
        assert!(fake.creations().is_empty());
    }

    #[tokio::test]
    async fn missing_segment_without_create_fails() {
        let fake = Arc::new(FakeStorage::new());
        let a = fake.add_folder(0, "a");

        let err = resolver(&fake)
            .resolve("a/c", relative(0))
            .await
            .unwrap_err();
        match err {
            UploadError::PathNotFound { segment, parent_id } => {
                assert_eq!(segment, "c");
                assert_eq!(parent_id, a);
            }
            other => panic!("expected PathNotFound, got {other:?}"),
        }
        assert!(fake.creations().is_empty());
    }

    #[tokio::test]
    async fn nested_path_is_created_in_order_then_cached() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);

        let c = r.resolve("a/b/c", creating(0)).await.unwrap();
        let a = fake.folder_id(0, "a").unwrap();
        let b = fake.folder_id(a, "b").unwrap();
        assert_eq!(fake.folder_id(b, "c"), Some(c));
        assert_eq!(
            fake.creations(),
            vec![(0, "a".to_string()), (a, "b".to_string()), (b, "c".to_string())]
        );

        fake.clear_calls();
        assert_eq!(r.resolve("a/b/c", creating(0)).await.unwrap(), c);
        assert_eq!(r.resolve("/a/b/c", relative(7)).await.unwrap(), c);
        assert!(fake.calls().is_empty(), "{:?}", fake.calls());
    }

    #[tokio::test]
    async fn ensure_folder_path_is_idempotent() {
        let fake = Arc::new(FakeStorage::new());
        let segments: Vec<String> = vec!["x".into(), "y".into()];

        let r = resolver(&fake);
        let first = r.ensure_folder_path(0, &segments).await.unwrap();
        let second = r.ensure_folder_path(0, &segments).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.creations().len(), 2);

        // A fresh resolver finds the folders instead of creating them.
        let again = resolver(&fake).ensure_folder_path(0, &segments).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(fake.creations().len(), 2);
    }

    #[tokio::test]
    async fn racing_resolvers_converge_on_one_folder() {
        let fake = Arc::new(FakeStorage::interleaved());
        let r1 = resolver(&fake);
        let r2 = resolver(&fake);

        let (id1, id2) = tokio::join!(r1.ensure_folder(0, "x"), r2.ensure_folder(0, "x"));
        let (id1, id2) = (id1.unwrap(), id2.unwrap());

        assert_eq!(id1, id2);
        // Both saw an empty parent and tried to create; one hit the conflict.
        assert_eq!(fake.creations().len(), 2);
        let folders: Vec<_> = fake.with(|s| {
            s.entries
                .iter()
                .filter(|e| e.is_dir && e.name == "x")
                .map(|e| e.id)
                .collect()
        });
        assert_eq!(folders, vec![id1]);
    }

    #[tokio::test]
    async fn concurrent_calls_on_one_resolver_create_once() {
        let fake = Arc::new(FakeStorage::interleaved());
        let r = resolver(&fake);

        let (id1, id2) = tokio::join!(r.ensure_folder(0, "x"), r.ensure_folder(0, "x"));
        assert_eq!(id1.unwrap(), id2.unwrap());
        assert_eq!(fake.creations().len(), 1);
    }

    #[tokio::test]
    async fn conflict_without_listing_is_inconsistent() {
        let fake = Arc::new(FakeStorage::new());
        fake.with(|s| s.create_failure = Some((500, "create folder failed: folder already exists")));

        let err = resolver(&fake).ensure_folder(0, "ghost").await.unwrap_err();
        assert!(
            matches!(err, UploadError::InconsistentState { ref name, parent_id: 0 } if name == "ghost"),
            "{err:?}"
        );
        // No retry after the re-resolution.
        assert_eq!(fake.creations().len(), 1);
    }

    #[tokio::test]
    async fn other_creation_errors_propagate() {
        let fake = Arc::new(FakeStorage::new());
        fake.with(|s| s.create_failure = Some((403, "folder exists check denied")));

        let err = resolver(&fake).ensure_folder(0, "x").await.unwrap_err();
        match &err {
            UploadError::FolderFailed {
                segment,
                parent_id: 0,
                source,
            } => {
                assert_eq!(segment, "x");
                assert!(matches!(**source, UploadError::Api { status: 403, .. }), "{err:?}");
            }
            other => panic!("expected FolderFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_creation_names_the_failing_segment() {
        let fake = Arc::new(FakeStorage::new());
        let photos = fake.add_folder(0, "photos");
        fake.with(|s| s.create_failure = Some((403, "forbidden")));

        let err = resolver(&fake)
            .resolve("photos/holiday", creating(0))
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("holiday"), "{text}");
        assert!(matches!(
            err,
            UploadError::FolderFailed { ref segment, parent_id, .. }
                if segment == "holiday" && parent_id == photos
        ));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn failed_listing_names_the_segment() {
        let fake = Arc::new(FakeStorage::new());
        fake.with(|s| s.list_status = Some(403));

        let err = resolver(&fake)
            .resolve("photos", relative(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("photos"), "{err}");
        assert!(matches!(
            err,
            UploadError::FolderFailed { ref segment, parent_id: 0, .. } if segment == "photos"
        ));
    }

    #[tokio::test]
    async fn invalid_folder_names_are_rejected() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);
        for name in ["", " ", "a/b", "..", "c\\d"] {
            assert!(
                matches!(r.ensure_folder(0, name).await, Err(UploadError::Validation(_))),
                "{name:?}"
            );
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_listing() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);
        assert_eq!(r.resolve_folder_id(0, "late").await.unwrap(), None);

        let late = fake.add_folder(0, "late");
        assert_eq!(r.resolve_folder_id(0, "late").await.unwrap(), None);
        r.invalidate(0).await;
        assert_eq!(r.resolve_folder_id(0, "late").await.unwrap(), Some(late));
        assert_eq!(fake.lists(), vec![0, 0]);
    }

    #[tokio::test]
    async fn clear_drops_memoized_prefixes() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);
        r.resolve("a", creating(0)).await.unwrap();
        r.clear().await;
        fake.clear_calls();

        r.resolve("a", creating(0)).await.unwrap();
        assert_eq!(fake.lists(), vec![0]);
        assert!(fake.creations().is_empty());
    }

    #[tokio::test]
    async fn remembers_last_folder() {
        let fake = Arc::new(FakeStorage::new());
        let r = resolver(&fake);
        assert!(r.last_folder().is_none());

        let id = r.resolve("/music/live", creating(0)).await.unwrap();
        assert_eq!(r.last_folder(), Some(("/music/live".to_string(), id)));
    }
}
