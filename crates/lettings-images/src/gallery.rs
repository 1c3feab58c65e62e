//! Per-listing gallery processing: cache-first downloads under a bounded
//! gate, then hashing (and optional embedding) on the rayon pool.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use lettings_core::{Embedding, GalleryImage, ListingKey};
use lettings_storage::{HashStore, ImageCache, ImageFetcher, ImageRecordSet};
use rayon::prelude::*;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};

use crate::embed::ImageEmbedder;
use crate::hashing::{ImageHashes, PerceptualHasher};
use crate::{decode_image, ImageError, DEFAULT_MAX_PIXELS};

#[derive(Debug, Clone)]
pub struct GalleryPolicy {
    pub max_images: usize,
    pub download_concurrency: usize,
    pub request_delay: Duration,
    pub max_pixels: u64,
    /// Listings processed at once by [`GalleryProcessor::process_batch`].
    pub listing_concurrency: usize,
}

impl Default for GalleryPolicy {
    fn default() -> Self {
        Self {
            max_images: 15,
            download_concurrency: 5,
            request_delay: Duration::from_millis(250),
            max_pixels: DEFAULT_MAX_PIXELS,
            listing_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GalleryJob {
    pub key: ListingKey,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub index: usize,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct GalleryOutcome {
    pub images: Vec<GalleryImage>,
    /// Network fetches performed.
    pub downloaded: usize,
    /// Images served from the on-disk cache.
    pub reused: usize,
    /// Images whose stored hashes were kept without any work.
    pub unchanged: usize,
    pub failed: Vec<ImageFailure>,
}

struct Downloaded {
    index: usize,
    url: String,
    path: PathBuf,
    bytes: Vec<u8>,
}

pub struct GalleryProcessor {
    cache: ImageCache,
    store: HashStore,
    fetcher: Arc<dyn ImageFetcher>,
    hasher: PerceptualHasher,
    embedder: Option<Arc<dyn ImageEmbedder>>,
    policy: GalleryPolicy,
}

impl GalleryProcessor {
    pub fn new(cache: ImageCache, store: HashStore, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            cache,
            store,
            fetcher,
            hasher: PerceptualHasher::default(),
            embedder: None,
            policy: GalleryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: GalleryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn ImageEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn policy(&self) -> &GalleryPolicy {
        &self.policy
    }

    /// Bring the stored hash set for `key` up to date with `urls`.
    ///
    /// Without `force`, URLs already present in the stored set are neither
    /// fetched nor rehashed, unless an embedder is configured and the stored
    /// entry has no embedding; those are re-decoded from the on-disk cache.
    /// When nothing is missing and no position moved, the call performs no
    /// I/O beyond reading the record. With `force`, every image is rehashed
    /// and the stored set is replaced wholesale.
    pub async fn process_listing(
        &self,
        key: &ListingKey,
        urls: &[String],
        force: bool,
    ) -> Result<GalleryOutcome, ImageError> {
        let urls = gallery_urls(urls, self.policy.max_images);
        let prior = if force { None } else { self.store.load(key).await? };

        let mut outcome = GalleryOutcome::default();
        let mut kept: Vec<GalleryImage> = Vec::new();
        let mut pending: Vec<(usize, String)> = Vec::new();
        for (index, url) in urls.iter().enumerate() {
            let existing = prior
                .as_ref()
                .and_then(|p| p.images.iter().find(|img| &img.url == url))
                .filter(|img| self.embedder.is_none() || img.embedding.is_some());
            match existing {
                Some(existing) => kept.push(GalleryImage {
                    index,
                    ..existing.clone()
                }),
                None => pending.push((index, url.clone())),
            }
        }
        outcome.unchanged = kept.len();

        if pending.is_empty() {
            if let Some(prior) = &prior {
                if prior.images == kept {
                    outcome.images = kept;
                    return Ok(outcome);
                }
            }
        }

        let downloaded = self.download(key, pending, &mut outcome).await;
        let hashed = self.hash_all(downloaded).await?;
        for (index, url, result) in hashed {
            match result {
                Ok(image) => kept.push(image),
                Err(err) => {
                    warn!(%key, index, url = %url, error = %err, "skipping undecodable image");
                    outcome.failed.push(ImageFailure {
                        index,
                        url,
                        reason: err.to_string(),
                    });
                }
            }
        }
        kept.sort_by_key(|img| img.index);

        self.store
            .save(&ImageRecordSet {
                key: key.clone(),
                updated_at: Utc::now(),
                images: kept.clone(),
            })
            .await?;
        outcome.images = kept;
        Ok(outcome)
    }

    /// Fetch or reuse every pending image. At most `download_concurrency`
    /// requests are in flight and each network request waits
    /// `request_delay` after taking its permit. Results keep their gallery
    /// position regardless of completion order.
    async fn download(
        &self,
        key: &ListingKey,
        pending: Vec<(usize, String)>,
        outcome: &mut GalleryOutcome,
    ) -> Vec<Downloaded> {
        let gate = Semaphore::new(self.policy.download_concurrency.max(1));
        let tasks = pending.into_iter().map(|(index, url)| {
            let gate = &gate;
            async move {
                let result: Result<(Downloaded, bool), ImageError> = async {
                    let _permit = gate.acquire().await.map_err(|_| {
                        ImageError::Fetch(lettings_storage::FetchError::Closed)
                    })?;
                    if let Some(cached) = self.cache.cached(key, &url).await? {
                        let bytes = self.cache.read(&cached.path).await?;
                        return Ok((
                            Downloaded {
                                index,
                                url: url.clone(),
                                path: cached.path,
                                bytes,
                            },
                            true,
                        ));
                    }
                    tokio::time::sleep(self.policy.request_delay).await;
                    let bytes = self.fetcher.fetch_image(&url).await?;
                    let stored = self.cache.store(key, &url, &bytes).await?;
                    Ok((
                        Downloaded {
                            index,
                            url: url.clone(),
                            path: stored.path,
                            bytes,
                        },
                        false,
                    ))
                }
                .await;
                (index, url, result)
            }
        });

        let mut downloaded = Vec::new();
        for (index, url, result) in futures::future::join_all(tasks).await {
            match result {
                Ok((item, reused)) => {
                    if reused {
                        outcome.reused += 1;
                    } else {
                        outcome.downloaded += 1;
                    }
                    downloaded.push(item);
                }
                Err(err) => {
                    warn!(%key, index, url = %url, error = %err, "image download failed");
                    outcome.failed.push(ImageFailure {
                        index,
                        url,
                        reason: err.to_string(),
                    });
                }
            }
        }
        downloaded
    }

    async fn hash_all(
        &self,
        downloaded: Vec<Downloaded>,
    ) -> Result<Vec<(usize, String, Result<GalleryImage, ImageError>)>, ImageError> {
        if downloaded.is_empty() {
            return Ok(Vec::new());
        }
        let hasher = self.hasher.clone();
        let embedder = self.embedder.clone();
        let max_pixels = self.policy.max_pixels;
        let results = tokio::task::spawn_blocking(move || {
            downloaded
                .into_par_iter()
                .map(|item| {
                    let result = hash_image_bytes(&item.bytes, max_pixels, &hasher, embedder.as_deref())
                        .map(|(hashes, embedding)| GalleryImage {
                            index: item.index,
                            url: item.url.clone(),
                            cached_path: Some(item.path.clone()),
                            phash: hashes.phash,
                            whash: hashes.whash,
                            crop_hash: hashes.crop_hash,
                            embedding,
                        });
                    (item.index, item.url, result)
                })
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(results)
    }

    /// Process many listings with at most `listing_concurrency` in flight.
    /// A listing that fails as a whole (e.g. its record cannot be written)
    /// is logged and reported with no images; the batch carries on.
    pub async fn process_batch(
        &self,
        jobs: Vec<GalleryJob>,
        force: bool,
    ) -> BTreeMap<ListingKey, GalleryOutcome> {
        let total = jobs.len();
        let results: Vec<(ListingKey, GalleryOutcome)> = stream::iter(jobs)
            .map(|job| async move {
                let span = info_span!("gallery", key = %job.key, images = job.urls.len());
                let outcome = match self
                    .process_listing(&job.key, &job.urls, force)
                    .instrument(span)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(key = %job.key, error = %err, "gallery processing failed");
                        GalleryOutcome::default()
                    }
                };
                (job.key, outcome)
            })
            .buffer_unordered(self.policy.listing_concurrency.max(1))
            .collect()
            .await;

        let downloaded: usize = results.iter().map(|(_, o)| o.downloaded).sum();
        let failed: usize = results.iter().map(|(_, o)| o.failed.len()).sum();
        info!(listings = total, downloaded, failed, "gallery batch complete");
        results.into_iter().collect()
    }
}

/// Deduplicated, order-preserving prefix of at most `max_images` URLs.
fn gallery_urls(urls: &[String], max_images: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty() && seen.insert(u.to_string()))
        .take(max_images)
        .map(str::to_string)
        .collect()
}

/// Decode and hash one image; the embedding is computed only when an
/// embedder is supplied.
pub fn hash_image_bytes(
    bytes: &[u8],
    max_pixels: u64,
    hasher: &PerceptualHasher,
    embedder: Option<&dyn ImageEmbedder>,
) -> Result<(ImageHashes, Option<Embedding>), ImageError> {
    let img = decode_image(bytes, max_pixels)?;
    let hashes = hasher.hash(&img);
    let embedding = embedder.map(|e| e.embed(&img)).transpose()?;
    Ok((hashes, embedding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::ColorHistogramEmbedder;
    use crate::test_support::synthetic_png;
    use async_trait::async_trait;
    use lettings_core::Source;
    use lettings_storage::FetchError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, Vec<u8>>,
        requests: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(responses: &[(&str, Vec<u8>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.clone()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    fn fast_policy() -> GalleryPolicy {
        GalleryPolicy {
            request_delay: Duration::from_millis(1),
            ..GalleryPolicy::default()
        }
    }

    fn key() -> ListingKey {
        ListingKey::new(Source::Openrent, "9001")
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn processor(dir: &std::path::Path, fetcher: Arc<FakeFetcher>) -> GalleryProcessor {
        GalleryProcessor::new(
            ImageCache::new(dir.join("cache")),
            HashStore::new(dir.join("hashes")),
            fetcher,
        )
        .with_policy(fast_policy())
    }

    #[tokio::test]
    async fn second_run_on_cached_gallery_makes_no_requests() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/1.png", synthetic_png(64, 48, 1)),
            ("https://img/2.png", synthetic_png(64, 48, 2)),
        ]));
        let processor = processor(dir.path(), fetcher.clone());
        let gallery = urls(&["https://img/1.png", "https://img/2.png"]);

        let first = processor.process_listing(&key(), &gallery, false).await.unwrap();
        assert_eq!(first.downloaded, 2);
        assert_eq!(first.images.len(), 2);
        let stored = HashStore::new(dir.path().join("hashes")).load(&key()).await.unwrap().unwrap();

        let second = processor.process_listing(&key(), &gallery, false).await.unwrap();
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 2);
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.images, first.images);
        let after = HashStore::new(dir.path().join("hashes")).load(&key()).await.unwrap().unwrap();
        assert_eq!(after, stored);
    }

    #[tokio::test]
    async fn only_new_urls_are_hashed_incrementally() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/1.png", synthetic_png(64, 48, 1)),
            ("https://img/2.png", synthetic_png(64, 48, 2)),
        ]));
        let processor = processor(dir.path(), fetcher.clone());

        processor
            .process_listing(&key(), &urls(&["https://img/1.png"]), false)
            .await
            .unwrap();
        let outcome = processor
            .process_listing(&key(), &urls(&["https://img/1.png", "https://img/2.png"]), false)
            .await
            .unwrap();

        assert_eq!(outcome.unchanged, 1);
        assert_eq!(outcome.downloaded, 1);
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 2);
        let indices: Vec<_> = outcome.images.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn force_refresh_rehashes_from_cache_and_replaces_the_set() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/1.png", synthetic_png(64, 48, 1)),
            ("https://img/2.png", synthetic_png(64, 48, 2)),
        ]));
        let processor = processor(dir.path(), fetcher.clone());
        processor
            .process_listing(&key(), &urls(&["https://img/1.png", "https://img/2.png"]), false)
            .await
            .unwrap();

        let refreshed = processor
            .process_listing(&key(), &urls(&["https://img/2.png"]), true)
            .await
            .unwrap();
        assert_eq!(refreshed.unchanged, 0);
        assert_eq!(refreshed.reused, 1);
        assert_eq!(refreshed.downloaded, 0);
        let stored = HashStore::new(dir.path().join("hashes")).load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.images.len(), 1);
        assert_eq!(stored.images[0].url, "https://img/2.png");
        assert_eq!(stored.images[0].index, 0);
    }

    #[tokio::test]
    async fn broken_images_are_skipped_without_failing_the_listing() {
        let dir = tempdir().unwrap();
        let mut corrupt = synthetic_png(64, 48, 3);
        corrupt.truncate(40);
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/ok.png", synthetic_png(64, 48, 1)),
            ("https://img/corrupt.png", corrupt),
            ("https://img/huge.png", synthetic_png(400, 400, 1)),
        ]));
        let processor = GalleryProcessor::new(
            ImageCache::new(dir.path().join("cache")),
            HashStore::new(dir.path().join("hashes")),
            fetcher,
        )
        .with_policy(GalleryPolicy {
            max_pixels: 100_000,
            ..fast_policy()
        });

        let outcome = processor
            .process_listing(
                &key(),
                &urls(&[
                    "https://img/ok.png",
                    "https://img/missing.png",
                    "https://img/corrupt.png",
                    "https://img/huge.png",
                ]),
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].url, "https://img/ok.png");
        let mut failed: Vec<_> = outcome.failed.iter().map(|f| f.index).collect();
        failed.sort();
        assert_eq!(failed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn downloads_respect_the_concurrency_gate_and_image_cap() {
        let dir = tempdir().unwrap();
        let gallery: Vec<String> = (0..20).map(|i| format!("https://img/{i}.png")).collect();
        let responses: Vec<(String, Vec<u8>)> = gallery
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), synthetic_png(32, 32, i as u32)))
            .collect();
        let borrowed: Vec<(&str, Vec<u8>)> =
            responses.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
        let fetcher = Arc::new(FakeFetcher::with(&borrowed));
        let processor = GalleryProcessor::new(
            ImageCache::new(dir.path().join("cache")),
            HashStore::new(dir.path().join("hashes")),
            fetcher.clone(),
        )
        .with_policy(GalleryPolicy {
            download_concurrency: 3,
            ..fast_policy()
        });

        let outcome = processor.process_listing(&key(), &gallery, false).await.unwrap();
        assert_eq!(outcome.downloaded, 15);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
        for (position, image) in outcome.images.iter().enumerate() {
            assert_eq!(image.index, position);
            assert_eq!(image.url, format!("https://img/{position}.png"));
        }
    }

    #[tokio::test]
    async fn embeddings_are_attached_when_an_embedder_is_configured() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[("https://img/1.png", synthetic_png(64, 48, 1))]));
        let processor = processor(dir.path(), fetcher).with_embedder(Arc::new(ColorHistogramEmbedder));
        let outcome = processor
            .process_listing(&key(), &urls(&["https://img/1.png"]), false)
            .await
            .unwrap();
        assert_eq!(outcome.images[0].embedding.as_ref().map(|e| e.len()), Some(512));
    }

    #[tokio::test]
    async fn enabling_embeddings_fills_stored_images_from_the_cache() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[("https://img/1.png", synthetic_png(64, 48, 1))]));
        let gallery = urls(&["https://img/1.png"]);

        let hashes_only = processor(dir.path(), fetcher.clone());
        let first = hashes_only.process_listing(&key(), &gallery, false).await.unwrap();
        assert!(first.images[0].embedding.is_none());

        let with_embeddings = processor(dir.path(), fetcher.clone()).with_embedder(Arc::new(ColorHistogramEmbedder));
        let second = with_embeddings.process_listing(&key(), &gallery, false).await.unwrap();
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 1);
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.reused, 1);
        assert!(second.images[0].embedding.is_some());
        assert_eq!(second.images[0].phash, first.images[0].phash);

        let stored = HashStore::new(dir.path().join("hashes")).load(&key()).await.unwrap().unwrap();
        assert!(stored.images[0].embedding.is_some());

        let third = with_embeddings.process_listing(&key(), &gallery, false).await.unwrap();
        assert_eq!(third.unchanged, 1);
        assert_eq!(third.reused, 0);
    }

    #[tokio::test]
    async fn reordered_gallery_rewrites_positions() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/1.png", synthetic_png(64, 48, 1)),
            ("https://img/2.png", synthetic_png(64, 48, 2)),
        ]));
        let processor = processor(dir.path(), fetcher.clone());
        processor
            .process_listing(&key(), &urls(&["https://img/1.png", "https://img/2.png"]), false)
            .await
            .unwrap();

        let reordered = processor
            .process_listing(&key(), &urls(&["https://img/2.png", "https://img/1.png"]), false)
            .await
            .unwrap();
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 2);
        assert_eq!(reordered.unchanged, 2);
        let positions: Vec<_> = reordered.images.iter().map(|i| (i.index, i.url.as_str())).collect();
        assert_eq!(positions, vec![(0, "https://img/2.png"), (1, "https://img/1.png")]);

        let stored = HashStore::new(dir.path().join("hashes")).load(&key()).await.unwrap().unwrap();
        assert_eq!(stored.images, reordered.images);
    }

    #[tokio::test]
    async fn each_network_request_waits_the_configured_delay() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/1.png", synthetic_png(32, 32, 1)),
            ("https://img/2.png", synthetic_png(32, 32, 2)),
            ("https://img/3.png", synthetic_png(32, 32, 3)),
        ]));
        let processor = processor(dir.path(), fetcher.clone()).with_policy(GalleryPolicy {
            download_concurrency: 1,
            request_delay: Duration::from_millis(40),
            ..GalleryPolicy::default()
        });
        let gallery = urls(&["https://img/1.png", "https://img/2.png", "https://img/3.png"]);

        let started = std::time::Instant::now();
        processor.process_listing(&key(), &gallery, false).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(120), "took {:?}", started.elapsed());
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 3);

        // Cached images skip the delay.
        let started = std::time::Instant::now();
        processor.process_listing(&key(), &gallery, true).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(120), "took {:?}", started.elapsed());
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_keeps_listing_concurrency_bounded() {
        for limit in [1, 2] {
            let dir = tempdir().unwrap();
            let responses: Vec<(String, Vec<u8>)> = (0..6)
                .map(|i| (format!("https://img/{i}.png"), synthetic_png(32, 32, i)))
                .collect();
            let borrowed: Vec<(&str, Vec<u8>)> =
                responses.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
            let fetcher = Arc::new(FakeFetcher::with(&borrowed));
            let processor = processor(dir.path(), fetcher.clone()).with_policy(GalleryPolicy {
                download_concurrency: 1,
                listing_concurrency: limit,
                ..fast_policy()
            });
            let jobs = (0..6)
                .map(|i| GalleryJob {
                    key: ListingKey::new(Source::Zoopla, i.to_string()),
                    urls: urls(&[responses[i].0.as_str()]),
                })
                .collect();

            let results = processor.process_batch(jobs, false).await;
            assert_eq!(results.len(), 6);
            assert_eq!(fetcher.requests.load(Ordering::SeqCst), 6);
            let peak = fetcher.peak.load(Ordering::SeqCst);
            assert!((1..=limit).contains(&peak), "limit {limit}, peak {peak}");
        }
    }

    #[tokio::test]
    async fn batch_processes_every_listing() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::with(&[
            ("https://img/a.png", synthetic_png(64, 48, 1)),
            ("https://img/b.png", synthetic_png(64, 48, 2)),
        ]));
        let processor = processor(dir.path(), fetcher);
        let jobs = vec![
            GalleryJob {
                key: ListingKey::new(Source::Zoopla, "1"),
                urls: urls(&["https://img/a.png"]),
            },
            GalleryJob {
                key: ListingKey::new(Source::Rightmove, "2"),
                urls: urls(&["https://img/b.png", "https://img/b.png"]),
            },
        ];
        let results = processor.process_batch(jobs, false).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|o| o.images.len() == 1));
    }
}
