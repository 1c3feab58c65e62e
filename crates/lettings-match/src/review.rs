//! Manual-labelling round trip for uncertain pairs.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use lettings_core::ListingKey;
use serde::{Deserialize, Serialize};

use crate::scoring::{Classification, PairScore};
use crate::signals::{SignalKind, SignalSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Match,
    NoMatch,
}

impl Label {
    pub fn classification(self) -> Classification {
        match self {
            Label::Match => Classification::Match,
            Label::NoMatch => Classification::NoMatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub pair_id: String,
    pub left: ListingKey,
    pub right: ListingKey,
    pub score: f64,
    pub signal_count: usize,
    pub breakdown: BTreeMap<SignalKind, f64>,
    pub signals: SignalSet,
    /// Filled in by the reviewer.
    #[serde(default)]
    pub label: Option<Label>,
}

impl ReviewItem {
    pub fn from_score(pair: &PairScore) -> Self {
        Self {
            pair_id: pair.pair_id.clone(),
            left: pair.left.clone(),
            right: pair.right.clone(),
            score: pair.score,
            signal_count: pair.signal_count,
            breakdown: pair.breakdown.clone(),
            signals: pair.signals.clone(),
            label: None,
        }
    }
}

/// Uncertain pairs without a manual label, highest score first.
pub fn review_queue(scores: &[PairScore]) -> Vec<ReviewItem> {
    let mut items: Vec<ReviewItem> = scores
        .iter()
        .filter(|p| p.classification == Classification::Uncertain && p.label.is_none())
        .map(ReviewItem::from_score)
        .collect();
    items.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.pair_id.cmp(&b.pair_id)));
    items
}

pub async fn export_review_queue(path: &Path, items: &[ReviewItem]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(items).context("serializing review queue")?;
    lettings_storage::write_atomic(path, &bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// A labels file is either a reviewed export (items carrying `label`) or
/// a plain `pair_id -> label` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelsFile {
    Reviewed(Vec<ReviewItem>),
    Map(BTreeMap<String, Label>),
}

pub fn parse_labels(text: &str) -> Result<BTreeMap<String, Label>> {
    let file: LabelsFile = serde_json::from_str(text).context("parsing labels file")?;
    Ok(match file {
        LabelsFile::Reviewed(items) => items
            .into_iter()
            .filter_map(|item| item.label.map(|label| (item.pair_id, label)))
            .collect(),
        LabelsFile::Map(map) => map,
    })
}

/// Empty when the file does not exist.
pub async fn load_labels(path: &Path) -> Result<BTreeMap<String, Label>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_labels(&text).with_context(|| format!("loading {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}
