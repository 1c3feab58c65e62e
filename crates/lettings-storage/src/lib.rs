//! Per-listing image cache, persisted hash records and HTTP fetch utilities.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettings_core::{GalleryImage, ListingKey};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "lettings-storage";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Write through a uniquely named temp file in the target directory, then
/// rename over the destination so readers never observe a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CachedImage {
    pub path: PathBuf,
    pub byte_size: usize,
    /// True when the file was already on disk and nothing was written.
    pub reused: bool,
}

/// Downloaded gallery images, one directory per listing, one file per
/// URL hash. Distinct listings never share a directory, so concurrent
/// writers for different listings cannot collide.
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn listing_dir(&self, key: &ListingKey) -> PathBuf {
        self.root
            .join(key.source.as_str())
            .join(path_segment(&key.source_id))
    }

    pub fn image_path(&self, key: &ListingKey, url: &str) -> PathBuf {
        let url_hash = sha256_hex(url.as_bytes());
        self.listing_dir(key)
            .join(format!("{}.{}", &url_hash[..16], image_extension(url)))
    }

    /// The cached file for `url`, if present and non-empty.
    pub async fn cached(&self, key: &ListingKey, url: &str) -> anyhow::Result<Option<CachedImage>> {
        let path = self.image_path(key, url);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(CachedImage {
                path,
                byte_size: meta.len() as usize,
                reused: true,
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("checking cache path {}", path.display())),
        }
    }

    pub async fn store(&self, key: &ListingKey, url: &str, bytes: &[u8]) -> anyhow::Result<CachedImage> {
        if let Some(existing) = self.cached(key, url).await? {
            return Ok(existing);
        }
        let path = self.image_path(key, url);
        write_atomic(&path, bytes).await?;
        Ok(CachedImage {
            path,
            byte_size: bytes.len(),
            reused: false,
        })
    }

    pub async fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("reading cached image {}", path.display()))
    }
}

fn image_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "jpg",
        Some("png") => "png",
        Some("webp") => "webp",
        Some("gif") => "gif",
        _ => "img",
    }
}

/// The stored hash/embedding set for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecordSet {
    pub key: ListingKey,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<GalleryImage>,
}

impl ImageRecordSet {
    pub fn contains_url(&self, url: &str) -> bool {
        self.images.iter().any(|image| image.url == url)
    }
}

/// Durable per-listing image records, one JSON file per `(source, id)`.
#[derive(Debug, Clone)]
pub struct HashStore {
    root: PathBuf,
}

impl HashStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, key: &ListingKey) -> PathBuf {
        self.root
            .join(key.source.as_str())
            .join(format!("{}.json", path_segment(&key.source_id)))
    }

    pub async fn load(&self, key: &ListingKey) -> anyhow::Result<Option<ImageRecordSet>> {
        let path = self.record_path(key);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        let record = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(record))
    }

    /// Replace the whole record set for the listing.
    pub async fn save(&self, record: &ImageRecordSet) -> anyhow::Result<()> {
        let path = self.record_path(&record.key);
        let bytes = serde_json::to_vec_pretty(record).context("serializing image records")?;
        write_atomic(&path, &bytes).await
    }
}

/// What to do after a failed image request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Back off and ask again with the same client.
    Transient,
    /// The host turned away a library client; one more try through the
    /// browser profile.
    Refused,
    /// The image is gone or the URL is bad.
    Permanent,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    match status {
        s if s.is_server_error() => RetryDisposition::Transient,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => RetryDisposition::Transient,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => RetryDisposition::Refused,
        _ => RetryDisposition::Permanent,
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_body() {
        RetryDisposition::Transient
    } else {
        RetryDisposition::Permanent
    }
}

/// `Retry-After` in delta-seconds form. CDNs rarely send the date form.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Anti-bot interstitials come back as `200 text/html` in place of the photo.
fn serves_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Exponential delay, or the server's `Retry-After` hint when given.
    /// Either way capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt_index: usize, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
            self.base_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }
}

/// Which HTTP client a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProfile {
    Plain,
    /// Browser-like headers for hosts that reject library clients.
    Browser,
}

pub const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub browser_user_agent: String,
    pub impersonate_domains: Vec<String>,
    pub global_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            browser_user_agent: DEFAULT_BROWSER_USER_AGENT.to_string(),
            impersonate_domains: vec![
                "rightmove.co.uk".to_string(),
                "zoopla.co.uk".to_string(),
                "onthemarket.com".to_string(),
            ],
            global_concurrency: 16,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("{url} served a web page instead of an image")]
    NotAnImage { url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

/// Byte source for gallery images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    plain: reqwest::Client,
    browser: reqwest::Client,
    impersonate_domains: Vec<String>,
    global_limit: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut plain = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{CRATE_NAME}/{}", env!("CARGO_PKG_VERSION")));
        plain = plain.user_agent(user_agent);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
        let browser = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.browser_user_agent.clone())
            .default_headers(headers);

        Ok(Self {
            plain: plain.build().context("building plain reqwest client")?,
            browser: browser.build().context("building browser reqwest client")?,
            impersonate_domains: config
                .impersonate_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub fn profile_for(&self, url: &str) -> Result<ClientProfile, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?
            .to_ascii_lowercase();
        let impersonate = self
            .impersonate_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
        Ok(if impersonate {
            ClientProfile::Browser
        } else {
            ClientProfile::Plain
        })
    }

    fn client(&self, profile: ClientProfile) -> &reqwest::Client {
        match profile {
            ClientProfile::Plain => &self.plain,
            ClientProfile::Browser => &self.browser,
        }
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut profile = self.profile_for(url)?;
        let _global = self.global_limit.acquire().await.map_err(|_| FetchError::Closed)?;

        let span = info_span!("http_fetch", url, initial_profile = ?profile);
        async {
            let mut attempt = 0usize;
            loop {
                let (disposition, hint, error) = match self.client(profile).get(url).send().await {
                    Ok(resp) if resp.status().is_success() && !serves_html(resp.headers()) => {
                        return Ok(resp.bytes().await?.to_vec());
                    }
                    Ok(resp) if resp.status().is_success() => (
                        RetryDisposition::Refused,
                        None,
                        FetchError::NotAnImage {
                            url: resp.url().to_string(),
                        },
                    ),
                    Ok(resp) => {
                        let status = resp.status();
                        (
                            classify_status(status),
                            retry_after(resp.headers()),
                            FetchError::HttpStatus {
                                status: status.as_u16(),
                                url: resp.url().to_string(),
                            },
                        )
                    }
                    Err(err) => (classify_reqwest_error(&err), None, FetchError::Request(err)),
                };

                if attempt >= self.backoff.max_retries {
                    return Err(error);
                }
                match disposition {
                    RetryDisposition::Permanent => return Err(error),
                    RetryDisposition::Refused if profile == ClientProfile::Browser => return Err(error),
                    RetryDisposition::Refused => {
                        debug!(attempt, error = %error, "host refused plain client, switching to browser profile");
                        profile = ClientProfile::Browser;
                    }
                    RetryDisposition::Transient => {
                        debug!(attempt, error = %error, "retrying image fetch");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt, hint)).await;
                    }
                }
                attempt += 1;
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_bytes(url).await
    }
}
