//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Optional egress through a rotating set of proxies
//! - Classifying failures as transient or malformed
//! - An on-disk response cache that survives restarts
//!
//! Exactly one request is made per call; retrying is the frontier's job.

use crate::config::{CrawlerConfig, ProxyConfig};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// Performs one GET and returns the raw body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Chooses the egress proxy for each request
pub trait ProxySelector: Send + Sync {
    /// Every proxy this selector may return
    fn candidates(&self) -> &[Url];

    /// Picks the proxy for the next request
    fn select(&self) -> Result<&Url, FetchError>;
}

/// Rotates over a fixed proxy list, one step per request
#[derive(Debug)]
pub struct RoundRobinProxies {
    proxies: Vec<Url>,
    cursor: AtomicUsize,
}

impl RoundRobinProxies {
    pub fn new(proxies: Vec<Url>) -> Self {
        Self {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Builds the rotation from configured proxy addresses
    pub fn from_config(config: &ProxyConfig) -> Result<Self, url::ParseError> {
        let proxies = config
            .addresses
            .iter()
            .map(|address| Url::parse(address))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(proxies))
    }
}

impl ProxySelector for RoundRobinProxies {
    fn candidates(&self) -> &[Url] {
        &self.proxies
    }

    fn select(&self) -> Result<&Url, FetchError> {
        if self.proxies.is_empty() {
            return Err(FetchError::Transient {
                url: String::new(),
                message: "no proxy available".to_string(),
            });
        }

        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Ok(&self.proxies[slot])
    }
}

/// Builds an HTTP client with the configured user agent and timeouts
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `proxy` - Proxy every request goes through, if any
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CrawlerConfig, proxy: Option<&Url>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    } else {
        builder = builder.no_proxy();
    }

    builder.build()
}

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    direct: Client,
    proxied: HashMap<String, Client>,
    selector: Option<Arc<dyn ProxySelector>>,
}

impl HttpTransport {
    /// Creates a transport that connects directly
    pub fn new(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            direct: build_http_client(config, None)?,
            proxied: HashMap::new(),
            selector: None,
        })
    }

    /// Creates a transport that routes every request through `selector`
    ///
    /// One client is built per candidate proxy up front, so selection at
    /// request time only moves the rotation cursor.
    pub fn with_proxies(
        config: &CrawlerConfig,
        selector: Arc<dyn ProxySelector>,
    ) -> Result<Self, reqwest::Error> {
        let mut proxied = HashMap::new();
        for proxy in selector.candidates() {
            proxied.insert(proxy.to_string(), build_http_client(config, Some(proxy))?);
        }

        Ok(Self {
            direct: build_http_client(config, None)?,
            proxied,
            selector: Some(selector),
        })
    }

    fn client_for(&self, url: &Url) -> Result<&Client, FetchError> {
        let Some(selector) = &self.selector else {
            return Ok(&self.direct);
        };

        let proxy = selector.select().map_err(|e| FetchError::Transient {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!("Proxy address: {}", proxy);

        self.proxied
            .get(proxy.as_str())
            .ok_or_else(|| FetchError::Transient {
                url: url.to_string(),
                message: format!("proxy {} has no client", proxy),
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let client = self.client_for(url)?;

        tracing::debug!("visiting {}", url);

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Malformed {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        match response.bytes().await {
            Ok(body) => Ok(body.to_vec()),
            Err(e) if e.is_timeout() => Err(FetchError::Transient {
                url: url.to_string(),
                message: "Request timeout while reading body".to_string(),
            }),
            Err(e) => Err(FetchError::Malformed {
                url: url.to_string(),
                message: format!("Unreadable body: {}", e),
            }),
        }
    }
}

/// [`Transport`] decorator serving repeated URLs from a cache directory
///
/// Each successful body is stored in its own file, named by the SHA-256 of
/// the URL. Failures are never cached. Cache I/O errors are logged and fall
/// through to the inner transport.
pub struct CachingTransport {
    inner: Arc<dyn Transport>,
    dir: PathBuf,
}

impl CachingTransport {
    /// Wraps `inner`, creating `dir` if needed
    pub fn new(inner: Arc<dyn Transport>, dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { inner, dir })
    }

    /// File holding the cached body of `url`
    pub fn entry_path(&self, url: &Url) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(&digest[..2]).join(digest)
    }

    async fn store(&self, path: &Path, body: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers never see a partial entry
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, body).await?;
        tokio::fs::rename(&partial, path).await
    }
}

#[async_trait]
impl Transport for CachingTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = self.entry_path(url);

        match tokio::fs::read(&path).await {
            Ok(body) => {
                tracing::trace!("Cache hit for {}", url);
                return Ok(body);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache entry for {}: {}", url, e),
        }

        let body = self.inner.get(url).await?;

        if let Err(e) = self.store(&path, &body).await {
            tracing::warn!("Failed to cache response for {}: {}", url, e);
        }

        Ok(body)
    }
}

/// Maps a failed send to a fetch error
///
/// Everything that happens before a response arrives is transient.
fn classify_request_error(url: &Url, e: reqwest::Error) -> FetchError {
    let message = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    };

    FetchError::Transient {
        url: url.to_string(),
        message,
    }
}
