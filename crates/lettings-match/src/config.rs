use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::SignalKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid matching settings: {0}")]
    Invalid(String),
}

/// Per-signal weights. Signals missing from a settings file keep their
/// default weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SignalKind, f64>", into = "BTreeMap<SignalKind, f64>")]
pub struct SignalWeights(BTreeMap<SignalKind, f64>);

impl SignalWeights {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        self.0
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_weight())
    }

    pub fn set(&mut self, kind: SignalKind, weight: f64) {
        self.0.insert(kind, weight);
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self(
            SignalKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.default_weight()))
                .collect(),
        )
    }
}

impl From<BTreeMap<SignalKind, f64>> for SignalWeights {
    fn from(overrides: BTreeMap<SignalKind, f64>) -> Self {
        let mut weights = SignalWeights::default();
        weights.0.extend(overrides);
        weights
    }
}

impl From<SignalWeights> for BTreeMap<SignalKind, f64> {
    fn from(weights: SignalWeights) -> Self {
        weights.0
    }
}

/// Thresholds used inside individual signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalSettings {
    /// Distance at or below which coordinates count as a full match.
    pub coordinate_match_m: f64,
    /// Distance at which the coordinate value has decayed to zero.
    pub coordinate_cutoff_m: f64,
    pub price_tolerance: f64,
    pub hash_max_distance: u32,
    pub embedding_threshold: f64,
    pub fuzzy_address_min: f64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            coordinate_match_m: 50.0,
            coordinate_cutoff_m: 150.0,
            price_tolerance: 0.03,
            hash_max_distance: 8,
            embedding_threshold: 0.85,
            fuzzy_address_min: 0.85,
        }
    }
}

/// Tunables read from `matching.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchSettings {
    pub weights: SignalWeights,
    pub match_threshold: f64,
    /// Scores in `[uncertain_threshold, match_threshold)` go to manual review.
    pub uncertain_threshold: f64,
    pub min_signals: usize,
    pub cross_source_only: bool,
    /// When set, two groups only join if every scored pair between them
    /// reaches this score.
    pub cluster_floor: Option<f64>,
    pub signals: SignalSettings,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            match_threshold: 70.0,
            uncertain_threshold: 40.0,
            min_signals: 2,
            cross_source_only: true,
            cluster_floor: None,
            signals: SignalSettings::default(),
        }
    }
}

impl MatchSettings {
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: MatchSettings = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_yaml_str(&text, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uncertain_threshold > self.match_threshold {
            return Err(ConfigError::Invalid(format!(
                "uncertain_threshold {} exceeds match_threshold {}",
                self.uncertain_threshold, self.match_threshold
            )));
        }
        if self.signals.coordinate_cutoff_m <= self.signals.coordinate_match_m {
            return Err(ConfigError::Invalid(
                "coordinate_cutoff_m must be greater than coordinate_match_m".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.signals.price_tolerance) {
            return Err(ConfigError::Invalid(format!(
                "price_tolerance {} must be in [0, 1)",
                self.signals.price_tolerance
            )));
        }
        if let Some(kind) = SignalKind::ALL
            .into_iter()
            .find(|kind| self.weights.weight(*kind) < 0.0)
        {
            return Err(ConfigError::Invalid(format!("negative weight for {}", kind.name())));
        }
        Ok(())
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workspace_root: PathBuf,
    pub cache_dir: PathBuf,
    pub listings_path: PathBuf,
    pub details_path: PathBuf,
    pub labels_path: PathBuf,
    pub seed_clusters_path: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub http_timeout_secs: u64,
    pub download_concurrency: usize,
    pub request_delay_ms: u64,
    pub max_images: usize,
    pub listing_concurrency: usize,
    pub embeddings: bool,
    pub force_refresh: bool,
}

impl RunConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("LETTINGS_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self::with_workspace(workspace_root)
    }

    pub fn with_workspace(workspace_root: PathBuf) -> Self {
        let env_num = |name: &str, default: u64| -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_flag = |name: &str| {
            std::env::var(name)
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false)
        };
        Self {
            cache_dir: std::env::var("LETTINGS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("image_cache")),
            listings_path: workspace_root.join("input").join("listings.json"),
            details_path: workspace_root.join("input").join("details.json"),
            labels_path: workspace_root.join("labels.json"),
            seed_clusters_path: std::env::var("LETTINGS_SEED_CLUSTERS").ok().map(PathBuf::from),
            user_agent: std::env::var("LETTINGS_USER_AGENT").ok(),
            http_timeout_secs: env_num("LETTINGS_HTTP_TIMEOUT_SECS", 20),
            download_concurrency: env_num("LETTINGS_DOWNLOAD_CONCURRENCY", 5) as usize,
            request_delay_ms: env_num("LETTINGS_REQUEST_DELAY_MS", 250),
            max_images: env_num("LETTINGS_MAX_IMAGES", 15) as usize,
            listing_concurrency: env_num("LETTINGS_LISTING_CONCURRENCY", 4) as usize,
            embeddings: env_flag("LETTINGS_EMBEDDINGS"),
            force_refresh: env_flag("LETTINGS_FORCE_REFRESH"),
            workspace_root,
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.workspace_root.join("matching.yaml")
    }

    pub fn hash_store_dir(&self) -> PathBuf {
        self.cache_dir.join("hashes")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "match_threshold: 65\nweights:\n  price: 5\n";
        let settings = MatchSettings::from_yaml_str(yaml, Path::new("matching.yaml")).unwrap();
        assert_eq!(settings.match_threshold, 65.0);
        assert_eq!(settings.min_signals, 2);
        assert_eq!(settings.weights.weight(SignalKind::Price), 5.0);
        assert_eq!(
            settings.weights.weight(SignalKind::FullPostcode),
            SignalKind::FullPostcode.default_weight()
        );
    }

    #[test]
    fn unknown_keys_and_bad_thresholds_are_rejected() {
        assert!(MatchSettings::from_yaml_str("match_treshold: 60\n", Path::new("m.yaml")).is_err());
        let err = MatchSettings::from_yaml_str(
            "match_threshold: 30\nuncertain_threshold: 50\n",
            Path::new("m.yaml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_settings_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = MatchSettings::load(&dir.path().join("matching.yaml")).unwrap();
        assert_eq!(settings, MatchSettings::default());
    }
}
