//! Offline cache layer: a cache-first interception strategy over a
//! pluggable response storage.
//!
//! Same-origin requests and image requests of any origin are served from
//! storage when present; otherwise they go to the network and successful
//! responses are stored for later offline use. Everything else passes
//! straight through.
//!
//! # Opaque responses
//!
//! Cross-origin image responses without permissive headers are opaque: their
//! status cannot be read, so a failed fetch is indistinguishable from a good
//! one. Such responses are stored anyway. This favours availability over
//! verification: a flag served once by a CDN keeps rendering offline, at the
//! price that an error page cached this way is replayed until the cache
//! namespace changes.
//!
//! There is no eviction and no expiry. Lifecycle is handled by switching to a
//! new namespace (see [`DiskCache::purge_other_namespaces`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::fs::{TokioFileSystem, write_atomic};
use crate::net::{Destination, Fetcher, Request, Response, ResponseKind};

/// How a request is handled by the offline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Serve from storage if present, otherwise fetch and store.
    CacheFirst,
    /// Forward to the network untouched.
    Passthrough,
}

/// Chooses the policy for a request made from a page on `origin`.
#[must_use]
pub fn policy_for(request: &Request, origin: &Url) -> Policy {
    if request.method != Method::GET {
        return Policy::Passthrough;
    }
    if request.is_same_origin(origin) || request.destination == Destination::Image {
        Policy::CacheFirst
    } else {
        Policy::Passthrough
    }
}

/// Returns true if `response` may be stored for `request`.
///
/// Inspectable responses must be 2xx. Opaque responses are accepted for
/// image requests only, since their status cannot be checked.
#[must_use]
pub fn is_storable(request: &Request, response: &Response) -> bool {
    response.is_ok() || (response.is_opaque() && request.destination == Destination::Image)
}

/// Storage for cached responses, keyed by request URL.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Returns the stored response for a request, if any.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>>;

    /// Stores a response for a request, replacing any previous entry.
    async fn put(&self, request: &Request, response: &Response) -> Result<()>;
}

/// Cache-first strategy.
///
/// A storage hit is returned without touching the network. On a miss the
/// request is fetched and, if [`is_storable`], stored before being returned.
/// Storage failures are logged and never hide a usable network response.
///
/// # Errors
///
/// Returns the network error when the request misses storage and the fetch
/// fails.
pub async fn cache_first(
    request: &Request,
    storage: &dyn CacheStorage,
    network: &dyn Fetcher,
) -> Result<Response> {
    match storage.lookup(request).await {
        Ok(Some(response)) => {
            log::debug!("Cache hit: {}", request.url);
            return Ok(response);
        }
        Ok(None) => log::debug!("Cache miss: {}", request.url),
        Err(e) => log::warn!("Cache lookup failed for {}: {e}", request.url),
    }

    let response = network.fetch(request).await?;
    if is_storable(request, &response) {
        if let Err(e) = storage.put(request, &response).await {
            log::warn!("Failed to cache {}: {e}", request.url);
        }
    } else {
        log::debug!(
            "Not caching {} (status {})",
            request.url,
            response.status
        );
    }
    Ok(response)
}

/// Outcome of [`OfflineCache::precache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    /// URLs now available offline.
    pub cached: usize,
    /// URLs that could not be fetched or were not storable.
    pub failed: Vec<String>,
}

/// Request interceptor applying [`policy_for`] in front of a network fetcher.
pub struct OfflineCache {
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
}

impl OfflineCache {
    /// Creates an interceptor for pages served from `origin`.
    #[must_use]
    pub fn new(origin: Url, storage: Arc<dyn CacheStorage>, network: Arc<dyn Fetcher>) -> Self {
        Self {
            origin,
            storage,
            network,
        }
    }

    /// Origin requests are compared against.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Handles an intercepted request.
    ///
    /// # Errors
    ///
    /// Returns the network error if the request cannot be served from storage
    /// and the fetch fails.
    pub async fn handle(&self, request: &Request) -> Result<Response> {
        match policy_for(request, &self.origin) {
            Policy::CacheFirst => {
                cache_first(request, self.storage.as_ref(), self.network.as_ref()).await
            }
            Policy::Passthrough => self.network.fetch(request).await,
        }
    }

    /// Warms the cache with a list of URLs (relative ones resolve against
    /// the origin). Failures are collected, not fatal.
    pub async fn precache(&self, urls: &[&str]) -> PrecacheReport {
        let mut report = PrecacheReport::default();
        for url in urls {
            let request = match self
                .origin
                .join(url)
                .map_err(|e| e.to_string())
                .and_then(|u| Request::get(u.as_str()).map_err(|e| e.to_string()))
            {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Skipping precache of {url}: {e}");
                    report.failed.push((*url).to_string());
                    continue;
                }
            };

            match cache_first(&request, self.storage.as_ref(), self.network.as_ref()).await {
                Ok(response) if is_storable(&request, &response) => report.cached += 1,
                Ok(response) => {
                    log::warn!("Precache of {url} returned status {}", response.status);
                    report.failed.push((*url).to_string());
                }
                Err(e) => {
                    log::warn!("Precache of {url} failed: {e}");
                    report.failed.push((*url).to_string());
                }
            }
        }
        log::info!(
            "Precached {} of {} resources",
            report.cached,
            urls.len()
        );
        report
    }
}

#[async_trait]
impl Fetcher for OfflineCache {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.handle(request).await
    }
}

/// In-memory response storage.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Response>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored responses.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStorage for MemoryCache {
    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        let entries = self.entries.lock().expect("cache lock");
        Ok(entries.get(request.url.as_str()).cloned())
    }

    async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        self.entries
            .lock()
            .expect("cache lock")
            .insert(request.url.to_string(), response.clone());
        Ok(())
    }
}

/// Metadata stored next to each cached body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    kind: ResponseKind,
    status: u16,
    content_type: Option<String>,
    size: u64,
    stored: DateTime<Utc>,
}

/// File written into every namespace this cache creates. Only directories
/// carrying it are ever purged.
const NAMESPACE_MARKER: &str = ".flag-quiz-cache";

/// On-disk response storage under `<root>/<namespace>`.
///
/// Each entry is a `<sha256>.body` file plus a `<sha256>.json` metadata file.
/// The metadata is written last, so an entry without it is treated as absent.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    namespace: String,
}

impl DiskCache {
    /// Opens (lazily) the namespace `namespace` under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    /// Directory holding this namespace's entries.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.namespace)
    }

    fn entry_paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let key = format!("{:x}", Sha256::digest(url.as_bytes()));
        let dir = self.dir();
        (
            dir.join(format!("{key}.json")),
            dir.join(format!("{key}.body")),
        )
    }

    async fn ensure_marker(&self) -> Result<()> {
        let marker = self.dir().join(NAMESPACE_MARKER);
        if !tokio::fs::try_exists(&marker).await? {
            write_atomic(&TokioFileSystem, &marker, self.namespace.as_bytes()).await?;
        }
        Ok(())
    }

    /// Deletes every other namespace this cache created under the root.
    ///
    /// Sibling directories without the namespace marker belong to someone
    /// else and are left alone. Returns the number of namespaces removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed or a namespace cannot be
    /// removed. A missing root is not an error.
    pub async fn purge_other_namespaces(&self) -> Result<usize> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_name().to_string_lossy() == self.namespace.as_str() {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(NAMESPACE_MARKER)).await? {
                log::info!("Removing stale cache {}", entry.path().display());
                tokio::fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCache {
    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        let (meta_path, body_path) = self.entry_paths(request.url.as_str());
        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };

        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Cache entry for {} has no body", meta.url);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Response {
            url: meta.url,
            kind: meta.kind,
            status: meta.status,
            content_type: meta.content_type,
            body: body.into(),
        }))
    }

    async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        let (meta_path, body_path) = self.entry_paths(request.url.as_str());
        let meta = EntryMeta {
            url: response.url.clone(),
            kind: response.kind,
            status: response.status,
            content_type: response.content_type.clone(),
            size: response.body.len() as u64,
            stored: Utc::now(),
        };

        self.ensure_marker().await?;
        write_atomic(&TokioFileSystem, &body_path, &response.body).await?;
        write_atomic(&TokioFileSystem, &meta_path, &serde_json::to_vec(&meta)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Network double returning canned responses and counting transfers.
    struct CountingFetcher {
        calls: AtomicUsize,
        respond: fn(&Request) -> Result<Response>,
    }

    impl CountingFetcher {
        fn new(respond: fn(&Request) -> Result<Response>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                respond,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(request)
        }
    }

    fn ok_svg(request: &Request) -> Result<Response> {
        Ok(Response::basic(request.url.as_str(), 200, "<svg/>")
            .with_content_type("image/svg+xml"))
    }

    fn opaque(request: &Request) -> Result<Response> {
        Ok(Response::opaque(request.url.as_str(), "png-bytes"))
    }

    fn not_found(request: &Request) -> Result<Response> {
        Ok(Response::basic(request.url.as_str(), 404, "nope"))
    }

    fn offline(request: &Request) -> Result<Response> {
        Err(Error::Status {
            url: request.url.to_string(),
            status: 0,
        })
    }

    fn origin() -> Url {
        Url::parse("http://localhost:8080/").unwrap()
    }

    #[test]
    fn policy_same_origin_is_cache_first() {
        let request = Request::get("http://localhost:8080/index.html").unwrap();
        assert_eq!(policy_for(&request, &origin()), Policy::CacheFirst);
    }

    #[test]
    fn policy_cross_origin_image_is_cache_first() {
        let request = Request::image("https://flagsapi.com/FR/flat/64.png").unwrap();
        assert_eq!(policy_for(&request, &origin()), Policy::CacheFirst);
    }

    #[test]
    fn policy_cross_origin_data_passes_through() {
        let request = Request::get("https://restcountries.com/v3.1/all").unwrap();
        assert_eq!(policy_for(&request, &origin()), Policy::Passthrough);
    }

    #[test]
    fn policy_non_get_passes_through() {
        let request = Request::get("http://localhost:8080/data/countries.json")
            .unwrap()
            .with_method(Method::POST);
        assert_eq!(policy_for(&request, &origin()), Policy::Passthrough);
    }

    #[test]
    fn storable_rules() {
        let image = Request::image("https://flagcdn.com/fr.svg").unwrap();
        let data = Request::get("http://localhost:8080/data/countries.json").unwrap();

        assert!(is_storable(&image, &Response::opaque("u", "b")));
        assert!(!is_storable(&data, &Response::opaque("u", "b")));
        assert!(is_storable(&data, &Response::basic("u", 200, "b")));
        assert!(!is_storable(&data, &Response::basic("u", 500, "b")));
        assert!(!is_storable(&image, &Response::basic("u", 404, "b")));
    }

    #[tokio::test]
    async fn repeated_image_request_hits_storage() {
        let storage = MemoryCache::new();
        let network = CountingFetcher::new(ok_svg);
        let request = Request::image("https://flagcdn.com/fr.svg").unwrap();

        let first = cache_first(&request, &storage, &network).await.unwrap();
        let second = cache_first(&request, &storage, &network).await.unwrap();

        assert_eq!(network.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(second.content_type.as_deref(), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn opaque_image_is_cached_and_replayed() {
        let storage = MemoryCache::new();
        let network = CountingFetcher::new(opaque);
        let request = Request::image("https://flagsapi.com/FR/flat/64.png").unwrap();

        cache_first(&request, &storage, &network).await.unwrap();
        let replay = cache_first(&request, &storage, &network).await.unwrap();

        assert_eq!(network.calls(), 1);
        assert!(replay.is_opaque());
        assert_eq!(replay.body.as_ref(), b"png-bytes");
    }

    #[tokio::test]
    async fn failed_status_is_not_cached() {
        let storage = MemoryCache::new();
        let network = CountingFetcher::new(not_found);
        let request = Request::image("https://flagcdn.com/zz.svg").unwrap();

        let response = cache_first(&request, &storage, &network).await.unwrap();
        assert_eq!(response.status, 404);
        cache_first(&request, &storage, &network).await.unwrap();

        assert_eq!(network.calls(), 2);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn cached_entry_served_while_offline() {
        let storage = MemoryCache::new();
        let request = Request::image("https://flagcdn.com/fr.svg").unwrap();
        storage
            .put(&request, &Response::basic("https://flagcdn.com/fr.svg", 200, "<svg/>"))
            .await
            .unwrap();

        let network = CountingFetcher::new(offline);
        let response = cache_first(&request, &storage, &network).await.unwrap();
        assert_eq!(response.body.as_ref(), b"<svg/>");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn passthrough_never_stores() {
        let storage = Arc::new(MemoryCache::new());
        let network = Arc::new(CountingFetcher::new(ok_svg));
        let cache = OfflineCache::new(origin(), storage.clone(), network.clone());
        let request = Request::get("https://restcountries.com/v3.1/all").unwrap();

        cache.handle(&request).await.unwrap();
        cache.handle(&request).await.unwrap();

        assert_eq!(network.calls(), 2);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn precache_resolves_relative_urls() {
        let storage = Arc::new(MemoryCache::new());
        let network = Arc::new(CountingFetcher::new(ok_svg));
        let cache = OfflineCache::new(origin(), storage.clone(), network.clone());

        let report = cache.precache(&["index.html", "/flags/fr.svg"]).await;
        assert_eq!(report.cached, 2);
        assert!(report.failed.is_empty());

        let request = Request::get("http://localhost:8080/flags/fr.svg").unwrap();
        cache.handle(&request).await.unwrap();
        assert_eq!(network.calls(), 2);
    }

    #[tokio::test]
    async fn precache_reports_failures() {
        let storage = Arc::new(MemoryCache::new());
        let network = Arc::new(CountingFetcher::new(not_found));
        let cache = OfflineCache::new(origin(), storage, network);

        let report = cache.precache(&["missing.html"]).await;
        assert_eq!(report.cached, 0);
        assert_eq!(report.failed, vec!["missing.html".to_string()]);
    }

    #[tokio::test]
    async fn disk_cache_round_trip_and_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), "flag-quiz-v1");
        let request = Request::image("https://flagsapi.com/FR/flat/64.png").unwrap();

        assert!(cache.lookup(&request).await.unwrap().is_none());

        let response = Response::opaque("https://flagsapi.com/FR/flat/64.png", vec![1u8, 2, 3]);
        cache.put(&request, &response).await.unwrap();

        let reopened = DiskCache::new(dir.path(), "flag-quiz-v1");
        assert_eq!(reopened.lookup(&request).await.unwrap(), Some(response));
    }

    #[tokio::test]
    async fn disk_cache_without_metadata_is_a_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), "v1");
        let request = Request::image("https://flagcdn.com/fr.svg").unwrap();
        let (_, body_path) = cache.entry_paths(request.url.as_str());
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(body_path, b"orphan").unwrap();

        assert!(cache.lookup(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_keeps_current_namespace() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = DiskCache::new(dir.path(), "flag-quiz-v0");
        let request = Request::image("https://flagcdn.com/fr.svg").unwrap();
        old.put(&request, &Response::basic("https://flagcdn.com/fr.svg", 200, "<svg/>"))
            .await
            .unwrap();
        std::fs::create_dir_all(dir.path().join("flag-quiz-v1")).unwrap();
        std::fs::write(dir.path().join("note.txt"), b"keep").unwrap();

        let cache = DiskCache::new(dir.path(), "flag-quiz-v1");
        assert_eq!(cache.purge_other_namespaces().await.unwrap(), 1);
        assert!(dir.path().join("flag-quiz-v1").exists());
        assert!(!dir.path().join("flag-quiz-v0").exists());
        assert!(dir.path().join("note.txt").exists());

        let absent = DiskCache::new(dir.path().join("nowhere"), "v1");
        assert_eq!(absent.purge_other_namespaces().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_leaves_unrelated_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("mozilla/profile")).unwrap();
        std::fs::write(dir.path().join("mozilla/profile/places.sqlite"), b"db").unwrap();
        std::fs::create_dir_all(dir.path().join("pip")).unwrap();

        let cache = DiskCache::new(dir.path(), "flag-quiz-v1");
        let request = Request::image("https://flagcdn.com/fr.svg").unwrap();
        cache
            .put(&request, &Response::basic("https://flagcdn.com/fr.svg", 200, "<svg/>"))
            .await
            .unwrap();

        assert_eq!(cache.purge_other_namespaces().await.unwrap(), 0);
        assert!(dir.path().join("mozilla/profile/places.sqlite").exists());
        assert!(dir.path().join("pip").exists());
        assert!(cache.lookup(&request).await.unwrap().is_some());
    }
}
