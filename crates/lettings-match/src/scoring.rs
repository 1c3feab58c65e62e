use std::collections::BTreeMap;

use lettings_core::ListingKey;
use serde::{Deserialize, Serialize};

use crate::config::MatchSettings;
use crate::review::Label;
use crate::signals::{evaluate_all, Candidate, SignalContext, SignalKind, SignalSet};
use crate::text::TfidfIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Match,
    Uncertain,
    NoMatch,
}

/// Stable identifier for an unordered pair: both keys in sorted order.
pub fn pair_id(a: &ListingKey, b: &ListingKey) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}|{second}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub pair_id: String,
    pub left: ListingKey,
    pub right: ListingKey,
    /// Weighted contribution of every fired signal.
    pub breakdown: BTreeMap<SignalKind, f64>,
    pub signals: SignalSet,
    pub score: f64,
    pub signal_count: usize,
    pub classification: Classification,
    /// Set when a manual label overrode the computed classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

impl PairScore {
    pub fn is_match(&self) -> bool {
        self.classification == Classification::Match
    }
}

pub struct Scorer<'a> {
    settings: &'a MatchSettings,
    labels: &'a BTreeMap<String, Label>,
}

impl<'a> Scorer<'a> {
    pub fn new(settings: &'a MatchSettings, labels: &'a BTreeMap<String, Label>) -> Self {
        Self { settings, labels }
    }

    pub fn classify(&self, score: f64, signal_count: usize) -> Classification {
        if score >= self.settings.match_threshold && signal_count >= self.settings.min_signals {
            Classification::Match
        } else if score >= self.settings.uncertain_threshold {
            Classification::Uncertain
        } else {
            Classification::NoMatch
        }
    }

    /// Combine already-evaluated signals into a weighted score. Only fired
    /// signals contribute.
    pub fn score(&self, left: &ListingKey, right: &ListingKey, signals: SignalSet) -> PairScore {
        let breakdown: BTreeMap<SignalKind, f64> = signals
            .fired()
            .map(|(kind, result)| (kind, self.settings.weights.weight(kind) * result.value))
            .collect();
        let score: f64 = breakdown.values().sum();
        let signal_count = signals.fired_count();
        let id = pair_id(left, right);
        let label = self.labels.get(&id).copied();
        let classification = match label {
            Some(label) => label.classification(),
            None => self.classify(score, signal_count),
        };
        let (left, right) = if left <= right { (left, right) } else { (right, left) };
        PairScore {
            pair_id: id,
            left: left.clone(),
            right: right.clone(),
            breakdown,
            signals,
            score,
            signal_count,
            classification,
            label,
        }
    }

    pub fn score_candidates(&self, a: &Candidate, b: &Candidate, tfidf: Option<&TfidfIndex>) -> PairScore {
        let ctx = SignalContext {
            settings: &self.settings.signals,
            tfidf,
        };
        let signals = evaluate_all(a, b, &ctx);
        self.score(&a.listing.key(), &b.listing.key(), signals)
    }
}
