//! Batch orchestration: evidence gathering, resolution and run reports.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lettings_core::{DetailPageData, Listing, ListingEvidence, ListingKey, MergedProperty};
use lettings_images::{ColorHistogramEmbedder, GalleryJob, GalleryPolicy, GalleryProcessor, DEFAULT_MAX_PIXELS};
use lettings_storage::{HashStore, HttpClientConfig, HttpFetcher, ImageCache, ImageFetcher};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocking::BlockingIndex;
use crate::cluster::{Cluster, ClusterBuilder, ClusterReport};
use crate::config::{MatchSettings, RunConfig};
use crate::merge::{dedupe_by_identity, MergeEngine};
use crate::review::{export_review_queue, load_labels, review_queue, Label, ReviewItem};
use crate::scoring::{Classification, PairScore, Scorer};
use crate::signals::Candidate;
use crate::text::TfidfIndex;

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedCluster {
    pub cluster_id: String,
    pub members: Vec<ListingKey>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchStats {
    pub listings: usize,
    pub duplicates_dropped: usize,
    pub candidate_pairs: usize,
    pub matches: usize,
    pub uncertain: usize,
    pub no_match: usize,
    pub labelled: usize,
    pub clusters: usize,
    pub multi_source: usize,
    pub avg_signal_count: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub merged: Vec<MergedProperty>,
    pub pair_scores: Vec<PairScore>,
    pub review_queue: Vec<ReviewItem>,
    pub clusters: Vec<Cluster>,
    pub cluster_report: ClusterReport,
    pub excluded_clusters: Vec<ExcludedCluster>,
    pub stats: MatchStats,
}

/// Blocking, scoring, clustering and merging over one finite batch. Holds
/// no state between runs.
pub struct Resolver {
    settings: MatchSettings,
    labels: BTreeMap<String, Label>,
    seed: Vec<Vec<ListingKey>>,
}

impl Resolver {
    pub fn new(settings: MatchSettings) -> Self {
        Self {
            settings,
            labels: BTreeMap::new(),
            seed: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, Label>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_seed(mut self, seed: Vec<Vec<ListingKey>>) -> Self {
        self.seed = seed;
        self
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn resolve(
        &self,
        listings: Vec<Listing>,
        evidence: &BTreeMap<ListingKey, ListingEvidence>,
    ) -> MatchOutcome {
        let (listings, duplicates_dropped) = dedupe_by_identity(listings);
        if duplicates_dropped > 0 {
            warn!(duplicates_dropped, "dropped repeated listing identities");
        }

        let candidates: Vec<Candidate> = listings
            .iter()
            .map(|l| Candidate::new(l, evidence.get(&l.key())))
            .collect();
        let tfidf = TfidfIndex::build(
            candidates
                .iter()
                .filter_map(|c| c.description().map(|d| (c.listing.key(), d))),
        );

        let pairs = BlockingIndex::build(&listings).candidate_pairs(self.settings.cross_source_only);
        let scorer = Scorer::new(&self.settings, &self.labels);
        let pair_scores: Vec<PairScore> = pairs
            .iter()
            .map(|&(i, j)| {
                let pair = scorer.score_candidates(&candidates[i], &candidates[j], Some(&tfidf));
                debug!(pair_id = %pair.pair_id, score = pair.score, signals = pair.signal_count, classification = ?pair.classification, "scored pair");
                pair
            })
            .collect();

        let mut builder = ClusterBuilder::new(listings.iter().map(Listing::key).collect());
        if let Some(floor) = self.settings.cluster_floor {
            builder = builder.with_floor(floor, &pair_scores);
        }
        builder.seed(&self.seed);
        builder.add_matches(&pair_scores);
        let (clusters, cluster_report) = builder.finish();

        let by_key: HashMap<ListingKey, &Listing> = listings.iter().map(|l| (l.key(), l)).collect();
        let engine = MergeEngine::new(self.settings.signals.hash_max_distance);
        let mut merged = Vec::with_capacity(clusters.len());
        let mut excluded_clusters = Vec::new();
        for cluster in &clusters {
            let members: Vec<&Listing> = cluster
                .members
                .iter()
                .filter_map(|k| by_key.get(k).copied())
                .collect();
            match engine.merge(&members, evidence) {
                Ok(property) => merged.push(property),
                Err(err) => {
                    warn!(cluster_id = %cluster.id, error = %err, "excluding cluster from output");
                    excluded_clusters.push(ExcludedCluster {
                        cluster_id: cluster.id.clone(),
                        members: cluster.members.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let count = |c: Classification| pair_scores.iter().filter(|p| p.classification == c).count();
        let stats = MatchStats {
            listings: listings.len(),
            duplicates_dropped,
            candidate_pairs: pair_scores.len(),
            matches: count(Classification::Match),
            uncertain: count(Classification::Uncertain),
            no_match: count(Classification::NoMatch),
            labelled: pair_scores.iter().filter(|p| p.label.is_some()).count(),
            clusters: clusters.len(),
            multi_source: merged.iter().filter(|m| m.sources.len() > 1).count(),
            avg_signal_count: if pair_scores.is_empty() {
                0.0
            } else {
                pair_scores.iter().map(|p| p.signal_count).sum::<usize>() as f64 / pair_scores.len() as f64
            },
        };
        info!(
            listings = stats.listings,
            pairs = stats.candidate_pairs,
            matches = stats.matches,
            uncertain = stats.uncertain,
            merged = merged.len(),
            excluded = excluded_clusters.len(),
            "resolution complete"
        );

        MatchOutcome {
            merged,
            review_queue: review_queue(&pair_scores),
            pair_scores,
            clusters,
            cluster_report,
            excluded_clusters,
            stats,
        }
    }
}

/// Listings plus detail-page data for one run.
#[derive(Debug, Clone, Default)]
pub struct BatchInput {
    pub listings: Vec<Listing>,
    pub details: BTreeMap<ListingKey, DetailPageData>,
}

impl BatchInput {
    /// Gallery URLs from the detail page, else the listing's lead image.
    pub fn gallery_for(&self, listing: &Listing) -> Vec<String> {
        match self.details.get(&listing.key()) {
            Some(detail) if !detail.gallery_urls.is_empty() => detail.gallery_urls.clone(),
            _ => listing.image_url.iter().cloned().collect(),
        }
    }
}

pub async fn load_batch_input(listings_path: &Path, details_path: &Path) -> Result<BatchInput> {
    let text = fs::read_to_string(listings_path)
        .await
        .with_context(|| format!("reading {}", listings_path.display()))?;
    let listings: Vec<Listing> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", listings_path.display()))?;

    let details = match fs::read_to_string(details_path).await {
        Ok(text) => {
            let raw: BTreeMap<String, DetailPageData> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", details_path.display()))?;
            raw.into_iter()
                .map(|(key, detail)| {
                    let key: ListingKey = key
                        .parse()
                        .with_context(|| format!("bad key in {}", details_path.display()))?;
                    Ok((key, detail))
                })
                .collect::<Result<BTreeMap<_, _>>>()?
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(err) => return Err(err).with_context(|| format!("reading {}", details_path.display())),
    };
    Ok(BatchInput { listings, details })
}

/// A prior run's `merged_properties.json` or a plain cluster list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Merged(Vec<MergedProperty>),
    Clusters(Vec<Cluster>),
}

pub async fn load_seed_clusters(path: &Path) -> Result<Vec<Vec<ListingKey>>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match seed {
        SeedFile::Merged(merged) => merged.into_iter().map(|m| m.members).collect(),
        SeedFile::Clusters(clusters) => clusters.into_iter().map(|c| c.members).collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// Download and hash anything missing.
    Gather,
    /// Use only what the hash store already holds.
    StoredOnly,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvidenceStats {
    pub listings_with_gallery: usize,
    pub images: usize,
    pub downloaded: usize,
    pub reused: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: EvidenceMode,
    pub force_refresh: bool,
    pub evidence: EvidenceStats,
    pub stats: MatchStats,
    pub merged_properties: usize,
    pub excluded_clusters: usize,
    pub reports_dir: String,
}

pub struct MatchPipeline {
    config: RunConfig,
    settings: MatchSettings,
    gallery: GalleryProcessor,
    store: HashStore,
}

impl MatchPipeline {
    /// Reads `matching.yaml` from the workspace and builds the HTTP fetcher.
    pub fn new(config: RunConfig) -> Result<Self> {
        let settings = MatchSettings::load(&config.settings_path())?;
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        })?;
        Ok(Self::with_fetcher(config, settings, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: RunConfig, settings: MatchSettings, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let store = HashStore::new(config.hash_store_dir());
        let mut gallery = GalleryProcessor::new(ImageCache::new(config.images_dir()), store.clone(), fetcher)
            .with_policy(GalleryPolicy {
                max_images: config.max_images,
                download_concurrency: config.download_concurrency,
                request_delay: Duration::from_millis(config.request_delay_ms),
                max_pixels: DEFAULT_MAX_PIXELS,
                listing_concurrency: config.listing_concurrency,
            });
        if config.embeddings {
            gallery = gallery.with_embedder(Arc::new(ColorHistogramEmbedder));
        }
        Self {
            config,
            settings,
            gallery,
            store,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub async fn load_inputs(&self) -> Result<BatchInput> {
        load_batch_input(&self.config.listings_path, &self.config.details_path).await
    }

    fn evidence_for(input: &BatchInput, listing: &Listing, images: Vec<lettings_core::GalleryImage>) -> ListingEvidence {
        let detail = input.details.get(&listing.key());
        ListingEvidence {
            images,
            floorplan_url: detail.and_then(|d| d.floorplan_url.clone()),
            description: detail.and_then(|d| d.description.clone()),
            features: detail.map(|d| d.features.clone()).unwrap_or_default(),
            description_embedding: detail.and_then(|d| d.description_embedding.clone()),
        }
    }

    /// Bring every listing's image records up to date, then assemble the
    /// per-listing evidence. Image failures never fail the batch.
    pub async fn gather_evidence(
        &self,
        input: &BatchInput,
        force: bool,
    ) -> (BTreeMap<ListingKey, ListingEvidence>, EvidenceStats) {
        let jobs: Vec<GalleryJob> = input
            .listings
            .iter()
            .map(|l| GalleryJob {
                key: l.key(),
                urls: input.gallery_for(l),
            })
            .filter(|job| !job.urls.is_empty())
            .collect();
        let mut stats = EvidenceStats {
            listings_with_gallery: jobs.len(),
            ..Default::default()
        };
        let mut outcomes = self.gallery.process_batch(jobs, force).await;

        let mut evidence = BTreeMap::new();
        for listing in &input.listings {
            let images = match outcomes.remove(&listing.key()) {
                Some(outcome) => {
                    stats.downloaded += outcome.downloaded;
                    stats.reused += outcome.reused;
                    stats.unchanged += outcome.unchanged;
                    stats.failed += outcome.failed.len();
                    outcome.images
                }
                None => Vec::new(),
            };
            stats.images += images.len();
            evidence.insert(listing.key(), Self::evidence_for(input, listing, images));
        }
        (evidence, stats)
    }

    /// Evidence from the hash store alone. No network access.
    pub async fn load_stored_evidence(
        &self,
        input: &BatchInput,
    ) -> Result<(BTreeMap<ListingKey, ListingEvidence>, EvidenceStats)> {
        let mut stats = EvidenceStats::default();
        let mut evidence = BTreeMap::new();
        for listing in &input.listings {
            let images = self
                .store
                .load(&listing.key())
                .await?
                .map(|record| record.images)
                .unwrap_or_default();
            if !images.is_empty() {
                stats.listings_with_gallery += 1;
                stats.unchanged += images.len();
            }
            stats.images += images.len();
            evidence.insert(listing.key(), Self::evidence_for(input, listing, images));
        }
        Ok((evidence, stats))
    }

    async fn resolver(&self) -> Result<Resolver> {
        let labels = load_labels(&self.config.labels_path).await?;
        let seed = match &self.config.seed_clusters_path {
            Some(path) => load_seed_clusters(path).await?,
            None => Vec::new(),
        };
        if !labels.is_empty() || !seed.is_empty() {
            info!(labels = labels.len(), seed_clusters = seed.len(), "loaded prior decisions");
        }
        Ok(Resolver::new(self.settings.clone()).with_labels(labels).with_seed(seed))
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run(EvidenceMode::Gather).await
    }

    /// Score and cluster from stored hashes only.
    pub async fn score_offline(&self) -> Result<RunSummary> {
        self.run(EvidenceMode::StoredOnly).await
    }

    /// Refresh image records without scoring.
    pub async fn hash_images(&self) -> Result<EvidenceStats> {
        let input = self.load_inputs().await?;
        let (_, stats) = self.gather_evidence(&input, self.config.force_refresh).await;
        info!(
            images = stats.images,
            downloaded = stats.downloaded,
            failed = stats.failed,
            "image records refreshed"
        );
        Ok(stats)
    }

    /// Resolve from stored evidence and write the uncertain pairs to `out`
    /// for manual labelling. Returns the number of exported pairs.
    pub async fn export_review(&self, out: &Path) -> Result<usize> {
        let input = self.load_inputs().await?;
        let (evidence, _) = self.load_stored_evidence(&input).await?;
        let outcome = self.resolver().await?.resolve(input.listings, &evidence);
        export_review_queue(out, &outcome.review_queue).await?;
        info!(pairs = outcome.review_queue.len(), path = %out.display(), "exported review queue");
        Ok(outcome.review_queue.len())
    }

    async fn run(&self, mode: EvidenceMode) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let input = self.load_inputs().await?;
        let force = self.config.force_refresh && mode == EvidenceMode::Gather;
        info!(%run_id, listings = input.listings.len(), ?mode, force, "starting match run");

        let (evidence, evidence_stats) = match mode {
            EvidenceMode::Gather => self.gather_evidence(&input, force).await,
            EvidenceMode::StoredOnly => self.load_stored_evidence(&input).await?,
        };
        let resolver = self.resolver().await?;
        let outcome = resolver.resolve(input.listings, &evidence);

        let finished_at = Utc::now();
        let reports_dir = self.write_reports(run_id, started_at, finished_at, &evidence_stats, &outcome).await?;
        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            mode,
            force_refresh: force,
            evidence: evidence_stats,
            stats: outcome.stats.clone(),
            merged_properties: outcome.merged.len(),
            excluded_clusters: outcome.excluded_clusters.len(),
            reports_dir: reports_dir.display().to_string(),
        })
    }

    async fn write_reports(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        evidence: &EvidenceStats,
        outcome: &MatchOutcome,
    ) -> Result<PathBuf> {
        let reports_dir = self.config.workspace_root.join("reports").join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let merged_json = serde_json::to_vec_pretty(&outcome.merged).context("serializing merged properties")?;
        fs::write(reports_dir.join("merged_properties.json"), merged_json)
            .await
            .context("writing merged_properties.json")?;

        let scores_json = serde_json::to_vec_pretty(&serde_json::json!({
            "pair_scores": outcome.pair_scores,
            "clusters": outcome.clusters,
            "cluster_report": outcome.cluster_report,
            "excluded_clusters": outcome.excluded_clusters,
        }))
        .context("serializing pair scores")?;
        fs::write(reports_dir.join("pair_scores.json"), scores_json)
            .await
            .context("writing pair_scores.json")?;

        export_review_queue(&reports_dir.join("review_queue.json"), &outcome.review_queue).await?;

        fs::write(
            reports_dir.join("summary.md"),
            summary_markdown(run_id, started_at, finished_at, evidence, outcome),
        )
        .await
        .context("writing summary.md")?;

        Ok(reports_dir)
    }
}

fn summary_markdown(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    evidence: &EvidenceStats,
    outcome: &MatchOutcome,
) -> String {
    let stats = &outcome.stats;
    let mut source_counts: BTreeMap<String, usize> = BTreeMap::new();
    for property in &outcome.merged {
        for source in &property.sources {
            *source_counts.entry(source.to_string()).or_default() += 1;
        }
    }
    let excluded = if outcome.excluded_clusters.is_empty() {
        "- none".to_string()
    } else {
        outcome
            .excluded_clusters
            .iter()
            .map(|e| format!("- `{}`: {}", e.cluster_id, e.reason))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "# Lettings Match Run\n\n- Generated by: {} {}\n- Run ID: `{run_id}`\n- Started: {started_at}\n- Finished: {finished_at}\n- Listings: {}\n- Duplicate identities dropped: {}\n\n## Images\n- Listings with a gallery: {}\n- Hashed images: {}\n- Downloaded: {}\n- Reused from cache: {}\n- Unchanged: {}\n- Failed: {}\n\n## Pairs\n- Candidate pairs: {}\n- Match: {}\n- Uncertain: {}\n- No match: {}\n- Manually labelled: {}\n- Average fired signals: {:.2}\n\n## Properties\n- Merged properties: {}\n- Seen on more than one platform: {}\n- Floor-blocked unions: {}\n\n## Source Counts\n{}\n\n## Excluded Clusters\n{}\n",
        crate::CRATE_NAME,
        env!("CARGO_PKG_VERSION"),
        stats.listings,
        stats.duplicates_dropped,
        evidence.listings_with_gallery,
        evidence.images,
        evidence.downloaded,
        evidence.reused,
        evidence.unchanged,
        evidence.failed,
        stats.candidate_pairs,
        stats.matches,
        stats.uncertain,
        stats.no_match,
        stats.labelled,
        stats.avg_signal_count,
        outcome.merged.len(),
        stats.multi_source,
        outcome.cluster_report.blocked_by_floor.len(),
        source_counts
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
        excluded,
    )
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    MatchPipeline::new(RunConfig::from_env())?.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::listing;
    use lettings_core::Source;

    #[test]
    fn resolver_partitions_and_counts() {
        let a = listing(Source::Rightmove, "1");
        let b = listing(Source::Zoopla, "2");
        let mut c = listing(Source::Openrent, "3");
        c.postcode = Some("N1 9GU".to_string());
        c.address = "4 Upper Street, Islington".to_string();
        c.price_pcm = 2400;
        let outcome = Resolver::new(MatchSettings::default()).resolve(vec![a, b, c], &BTreeMap::new());
        assert_eq!(outcome.stats.listings, 3);
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.stats.matches, 1);
        assert!(outcome.excluded_clusters.is_empty());
        let members: usize = outcome.merged.iter().map(|m| m.members.len()).sum();
        assert_eq!(members, 3);
    }

    #[test]
    fn labels_override_and_seed_clusters_apply() {
        let a = listing(Source::Rightmove, "1");
        let mut b = listing(Source::Zoopla, "2");
        b.price_pcm = 1900;
        b.address = "Flat 9, 80 Bow Road".to_string();
        b.postcode = Some("E3 2SJ".to_string());
        let id = crate::scoring::pair_id(&a.key(), &b.key());

        let unlabelled = Resolver::new(MatchSettings::default()).resolve(vec![a.clone(), b.clone()], &BTreeMap::new());
        assert_eq!(unlabelled.merged.len(), 2);

        let labelled = Resolver::new(MatchSettings::default())
            .with_labels(BTreeMap::from([(id, Label::Match)]))
            .resolve(vec![a.clone(), b.clone()], &BTreeMap::new());
        assert_eq!(labelled.merged.len(), 1);
        assert_eq!(labelled.stats.labelled, 1);

        let seeded = Resolver::new(MatchSettings::default())
            .with_seed(vec![vec![a.key(), b.key()]])
            .resolve(vec![a, b], &BTreeMap::new());
        assert_eq!(seeded.merged.len(), 1);
    }

    #[tokio::test]
    async fn batch_input_reads_details_keyed_by_listing() {
        let dir = tempfile::tempdir().unwrap();
        let listings_path = dir.path().join("listings.json");
        let details_path = dir.path().join("details.json");
        let mut a = listing(Source::Rightmove, "1");
        a.image_url = Some("https://media.rightmove.co.uk/lead.jpg".to_string());
        let b = listing(Source::Zoopla, "2");
        std::fs::write(&listings_path, serde_json::to_vec(&vec![a.clone(), b.clone()]).unwrap()).unwrap();
        std::fs::write(
            &details_path,
            r#"{"zoopla:2": {"gallery_urls": ["https://lid.zoopla.co.uk/1.jpg"], "floorplan_url": "https://lid.zoopla.co.uk/fp.png"}}"#,
        )
        .unwrap();

        let input = load_batch_input(&listings_path, &details_path).await.unwrap();
        assert_eq!(input.listings.len(), 2);
        assert_eq!(input.gallery_for(&a), vec!["https://media.rightmove.co.uk/lead.jpg".to_string()]);
        assert_eq!(input.gallery_for(&b), vec!["https://lid.zoopla.co.uk/1.jpg".to_string()]);

        std::fs::remove_file(&details_path).unwrap();
        let input = load_batch_input(&listings_path, &details_path).await.unwrap();
        assert!(input.details.is_empty());
    }

    #[tokio::test]
    async fn seed_file_accepts_merged_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged_properties.json");
        let a = listing(Source::Rightmove, "1");
        let b = listing(Source::Zoopla, "2");
        let outcome = Resolver::new(MatchSettings::default()).resolve(vec![a.clone(), b.clone()], &BTreeMap::new());
        std::fs::write(&path, serde_json::to_vec(&outcome.merged).unwrap()).unwrap();
        let seed = load_seed_clusters(&path).await.unwrap();
        assert_eq!(seed, vec![vec![a.key(), b.key()]]);
    }
}
