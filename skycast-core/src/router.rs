//! Offline resource cache with per-category routing policy.
//!
//! Routing is a pure function from request to policy so the decision table
//! is testable without any I/O; the [`CacheRouter`] applies a decision
//! against injected cache-store and fetcher capabilities. Caches are
//! version-tagged: activating a new version evicts every older generation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::OfflineConfig;

/// Caches are named `<prefix>-<version>`.
pub const CACHE_NAME_PREFIX: &str = "skycast-cache";

/// Routing configuration: origins, prefixes, and the asset lists
/// pre-populated at install.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub origin: Url,
    pub base_path: String,
    pub api_prefix: String,
    pub cache_version: String,
    pub vendor_origins: Vec<Url>,
    pub core_assets: Vec<String>,
    pub vendor_assets: Vec<String>,
}

impl RouterConfig {
    pub fn from_offline(config: &OfflineConfig) -> Result<Self> {
        let origin = Url::parse(&config.origin)
            .with_context(|| format!("invalid offline origin '{}'", config.origin))?;
        let vendor_origins = config
            .vendor_origins
            .iter()
            .map(|raw| {
                Url::parse(raw).with_context(|| format!("invalid vendor origin '{raw}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            origin,
            base_path: config.base_path.clone(),
            api_prefix: config.api_prefix.clone(),
            cache_version: config.cache_version.clone(),
            vendor_origins,
            core_assets: config.core_assets.clone(),
            vendor_assets: config.vendor_assets.clone(),
        })
    }

    pub fn cache_name(&self) -> String {
        format!("{CACHE_NAME_PREFIX}-{}", self.cache_version)
    }

    /// URL of the application's root document, served as the navigation
    /// fallback when everything else fails.
    pub fn root_document(&self) -> String {
        match self.origin.join(&self.base_path) {
            Ok(url) => url.to_string(),
            Err(_) => self.origin.to_string(),
        }
    }
}

/// One outbound resource request as seen by the router.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    pub url: Url,
    /// Whether this is a page navigation rather than a subresource load.
    pub navigate: bool,
}

impl ResourceRequest {
    /// GET request from a raw URL string.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("invalid URL '{raw}'"))?;
        Ok(Self::get(url))
    }

    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: false,
        }
    }

    pub fn navigation(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Always hit the network; never read or populate the cache.
    NetworkOnly,
    /// Serve from cache, fall back to network and populate on success.
    CacheFirst,
    /// Try the network first and populate; serve from cache when it fails.
    NetworkFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Api,
    Vendor,
    Static,
}

/// A routing decision: the policy, the request category (which drives the
/// offline fallback), and the cache the response lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub policy: Policy,
    pub category: Category,
    pub cache: String,
}

/// Pure routing: which policy applies to a request, if any.
///
/// Checked in order, first match wins; `None` means the request is not
/// intercepted at all (non-GET, or outside the app's origin and prefixes).
pub fn route(config: &RouterConfig, request: &ResourceRequest) -> Option<Route> {
    if request.method != Method::GET {
        return None;
    }

    let cache = config.cache_name();
    let same_origin = request.url.origin() == config.origin.origin();

    if request.url.path().starts_with(&config.api_prefix) && same_origin {
        return Some(Route {
            policy: Policy::NetworkOnly,
            category: Category::Api,
            cache,
        });
    }

    if config
        .vendor_origins
        .iter()
        .any(|vendor| vendor.origin() == request.url.origin())
    {
        return Some(Route {
            policy: Policy::CacheFirst,
            category: Category::Vendor,
            cache,
        });
    }

    if same_origin && request.url.path().starts_with(&config.base_path) {
        return Some(Route {
            policy: Policy::CacheFirst,
            category: Category::Static,
            cache,
        });
    }

    None
}

/// A response as stored in (and served from) the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RouterResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The synthesized answer for an API call with no connectivity.
    fn offline_api_error() -> Self {
        let body = serde_json::json!({ "error": "network error or proxy offline" });
        Self {
            status: 503,
            content_type: Some("application/json".to_string()),
            body: body.to_string().into_bytes(),
        }
    }

    /// Empty low-priority answer for an unreachable vendor asset.
    fn empty_unavailable() -> Self {
        Self {
            status: 503,
            content_type: None,
            body: Vec::new(),
        }
    }

    fn unavailable(message: &str) -> Self {
        Self {
            status: 503,
            content_type: Some("text/plain".to_string()),
            body: message.as_bytes().to_vec(),
        }
    }
}

/// Named-cache storage capability.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, cache: &str, url: &str) -> Result<Option<RouterResponse>>;
    async fn put(&self, cache: &str, url: &str, response: &RouterResponse) -> Result<()>;
    async fn cache_names(&self) -> Result<Vec<String>>;
    async fn delete_cache(&self, cache: &str) -> Result<()>;
}

/// Outbound fetch capability the router sits in front of.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, request: &ResourceRequest) -> Result<RouterResponse>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: Mutex<HashMap<String, HashMap<String, RouterResponse>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, cache: &str, url: &str) -> Result<Option<RouterResponse>> {
        Ok(self
            .caches
            .lock()
            .get(cache)
            .and_then(|entries| entries.get(url))
            .cloned())
    }

    async fn put(&self, cache: &str, url: &str, response: &RouterResponse) -> Result<()> {
        self.caches
            .lock()
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        Ok(())
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.caches.lock().keys().cloned().collect())
    }

    async fn delete_cache(&self, cache: &str) -> Result<()> {
        self.caches.lock().remove(cache);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiskIndex {
    entries: HashMap<String, DiskEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    file: String,
    status: u16,
    content_type: Option<String>,
}

/// Durable store: one directory per cache, an `index.json` mapping URLs to
/// numbered body files.
#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted at the platform cache directory.
    pub fn at_platform_dir() -> Result<Self> {
        let dirs = crate::config::project_dirs()?;
        Ok(Self::new(dirs.cache_dir().to_path_buf()))
    }

    fn index_path(&self, cache: &str) -> PathBuf {
        self.root.join(cache).join("index.json")
    }

    fn load_index(&self, cache: &str) -> Result<DiskIndex> {
        let path = self.index_path(cache);
        if !path.exists() {
            return Ok(DiskIndex::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache index: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache index: {}", path.display()))
    }

    fn save_index(&self, cache: &str, index: &DiskIndex) -> Result<()> {
        let path = self.index_path(cache);
        let contents = serde_json::to_string(index).context("Failed to serialize cache index")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache index: {}", path.display()))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn get(&self, cache: &str, url: &str) -> Result<Option<RouterResponse>> {
        let index = self.load_index(cache)?;
        let Some(entry) = index.entries.get(url) else {
            return Ok(None);
        };
        let path = self.root.join(cache).join(&entry.file);
        let body = std::fs::read(&path)
            .with_context(|| format!("Failed to read cached body: {}", path.display()))?;
        Ok(Some(RouterResponse {
            status: entry.status,
            content_type: entry.content_type.clone(),
            body,
        }))
    }

    async fn put(&self, cache: &str, url: &str, response: &RouterResponse) -> Result<()> {
        let dir = self.root.join(cache);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

        let mut index = self.load_index(cache)?;
        let file = index
            .entries
            .get(url)
            .map(|existing| existing.file.clone())
            .unwrap_or_else(|| format!("entry-{}.bin", index.entries.len()));
        let path = dir.join(&file);
        std::fs::write(&path, &response.body)
            .with_context(|| format!("Failed to write cached body: {}", path.display()))?;

        index.entries.insert(
            url.to_string(),
            DiskEntry {
                file,
                status: response.status,
                content_type: response.content_type.clone(),
            },
        );
        self.save_index(cache, &index)
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list cache root: {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn delete_cache(&self, cache: &str) -> Result<()> {
        let dir = self.root.join(cache);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to delete cache: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Fetcher over a plain HTTP client.
#[derive(Debug, Default)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> Result<RouterResponse> {
        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", request.url))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", request.url))?
            .to_vec();
        Ok(RouterResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Applies routing policy and cache lifecycle over injected capabilities.
pub struct CacheRouter {
    config: RouterConfig,
    store: Box<dyn CacheStore>,
    fetcher: Box<dyn ResourceFetcher>,
}

impl CacheRouter {
    pub fn new(
        config: RouterConfig,
        store: Box<dyn CacheStore>,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Pre-populate the current cache with the configured core and vendor
    /// assets. Individual failures are logged and skipped: one unreachable
    /// optional asset must not leave the router un-installed.
    ///
    /// Returns how many assets were cached.
    pub async fn install(&self) -> usize {
        let cache = self.config.cache_name();
        tracing::info!(%cache, "installing resource cache");
        let mut cached = 0;

        for asset in self.config.core_assets.iter().chain(&self.config.vendor_assets) {
            let url = match Url::parse(asset) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(%asset, "skipping unparseable asset URL: {e}");
                    continue;
                }
            };
            let request = ResourceRequest::get(url);
            match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    match self.store.put(&cache, asset, &response).await {
                        Ok(()) => cached += 1,
                        Err(e) => tracing::warn!(%asset, "failed to cache asset: {e:#}"),
                    }
                }
                Ok(response) => {
                    tracing::warn!(%asset, status = response.status, "asset fetch unsuccessful, skipping");
                }
                Err(e) => tracing::warn!(%asset, "asset unreachable, skipping: {e:#}"),
            }
        }

        tracing::info!(%cache, cached, "install finished");
        cached
    }

    /// Delete every cache from a previous generation, keeping the current
    /// one. Returns the deleted names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let current = self.config.cache_name();
        let mut deleted = Vec::new();
        for name in self.store.cache_names().await? {
            if name != current {
                tracing::info!(cache = %name, "removing stale cache");
                self.store.delete_cache(&name).await?;
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Serve one request. Intercepted categories always produce a response;
    /// only pass-through requests propagate transport errors.
    pub async fn handle(&self, request: &ResourceRequest) -> Result<RouterResponse> {
        match route(&self.config, request) {
            Some(decision) => Ok(self.apply(&decision, request).await),
            None => self.fetcher.fetch(request).await,
        }
    }

    /// Apply one routing decision.
    pub async fn apply(&self, decision: &Route, request: &ResourceRequest) -> RouterResponse {
        match decision.policy {
            Policy::NetworkOnly => match self.fetcher.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(url = %request.url, "network failure on API route: {e:#}");
                    RouterResponse::offline_api_error()
                }
            },
            Policy::CacheFirst => {
                if let Some(hit) = self.cache_get(&decision.cache, request.url.as_str()).await {
                    return hit;
                }
                match self.fetcher.fetch(request).await {
                    Ok(response) => {
                        self.cache_put(&decision.cache, request.url.as_str(), &response).await;
                        response
                    }
                    Err(e) => {
                        tracing::warn!(url = %request.url, "network failure, no cache entry: {e:#}");
                        self.offline_fallback(decision, request).await
                    }
                }
            }
            Policy::NetworkFirst => match self.fetcher.fetch(request).await {
                Ok(response) => {
                    self.cache_put(&decision.cache, request.url.as_str(), &response).await;
                    response
                }
                Err(e) => {
                    tracing::warn!(url = %request.url, "network failure, trying cache: {e:#}");
                    match self.cache_get(&decision.cache, request.url.as_str()).await {
                        Some(hit) => hit,
                        None => self.offline_fallback(decision, request).await,
                    }
                }
            },
        }
    }

    async fn offline_fallback(
        &self,
        decision: &Route,
        request: &ResourceRequest,
    ) -> RouterResponse {
        match decision.category {
            Category::Api => RouterResponse::offline_api_error(),
            Category::Vendor => RouterResponse::empty_unavailable(),
            Category::Static => {
                if request.navigate {
                    let root = self.config.root_document();
                    if let Some(hit) = self.cache_get(&decision.cache, &root).await {
                        tracing::info!("serving cached root document as navigation fallback");
                        return hit;
                    }
                }
                RouterResponse::unavailable("network error loading resource")
            }
        }
    }

    async fn cache_get(&self, cache: &str, url: &str) -> Option<RouterResponse> {
        match self.store.get(cache, url).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(%url, "cache read failed: {e:#}");
                None
            }
        }
    }

    async fn cache_put(&self, cache: &str, url: &str, response: &RouterResponse) {
        if !response.is_success() {
            return;
        }
        if let Err(e) = self.store.put(cache, url, response).await {
            tracing::warn!(%url, "cache write failed: {e:#}");
        }
    }
}
