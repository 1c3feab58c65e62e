//! Core domain model for cross-platform lettings matching.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "lettings-core";

pub mod postcode;

pub use postcode::{extract_outcode, find_postcode_in, is_full_postcode, normalize_postcode, Postcode};

/// Listing platform a record was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Openrent,
    Rightmove,
    Zoopla,
    Onthemarket,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Openrent,
        Source::Rightmove,
        Source::Zoopla,
        Source::Onthemarket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Openrent => "openrent",
            Source::Rightmove => "rightmove",
            Source::Zoopla => "zoopla",
            Source::Onthemarket => "onthemarket",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown listing source `{0}`")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Global identity of a listing: `(source, source_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingKey {
    pub source: Source,
    pub source_id: String,
}

impl ListingKey {
    pub fn new(source: Source, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidListingKey {
    #[error("listing key `{0}` is not of the form source:id")]
    Shape(String),
    #[error(transparent)]
    Source(#[from] UnknownSource),
}

impl FromStr for ListingKey {
    type Err = InvalidListingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, id) = s
            .split_once(':')
            .filter(|(_, id)| !id.trim().is_empty())
            .ok_or_else(|| InvalidListingKey::Shape(s.to_string()))?;
        Ok(ListingKey::new(source.parse()?, id.trim()))
    }
}

/// Canonical listing handed over by the scraping collaborators. Never
/// mutated once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub source: Source,
    pub source_id: String,
    pub title: String,
    pub price_pcm: u32,
    /// `None` when the platform did not state a bedroom count.
    pub bedrooms: Option<u32>,
    pub address: String,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub first_seen: DateTime<Utc>,
}

impl Listing {
    pub fn key(&self) -> ListingKey {
        ListingKey::new(self.source, self.source_id.clone())
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// The postcode field when it parses, otherwise whatever postcode the
    /// address line carries.
    pub fn effective_postcode(&self) -> Option<Postcode> {
        self.postcode
            .as_deref()
            .and_then(Postcode::parse)
            .or_else(|| find_postcode_in(&self.address))
    }

    pub fn outcode(&self) -> Option<String> {
        self.effective_postcode().map(|p| p.outcode().to_string())
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Detail-page payload supplied by the detail-fetching collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailPageData {
    #[serde(default)]
    pub gallery_urls: Vec<String>,
    #[serde(default)]
    pub floorplan_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    /// Text embedding of the description, computed upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_embedding: Option<Embedding>,
}

/// Fixed-width 64-bit perceptual hash, serialized as 16 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash64(pub u64);

impl Hash64 {
    pub fn distance(self, other: Hash64) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let value = bits
            .into_iter()
            .take(64)
            .fold(0u64, |acc, bit| (acc << 1) | u64::from(bit));
        Hash64(value)
    }
}

impl fmt::Debug for Hash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash64({:016x})", self.0)
    }
}

impl fmt::Display for Hash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<Hash64> for String {
    fn from(hash: Hash64) -> Self {
        hash.to_string()
    }
}

#[derive(Debug, Error)]
#[error("invalid 64-bit hash `{0}`")]
pub struct InvalidHash(String);

impl TryFrom<String> for Hash64 {
    type Error = InvalidHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() != 16 {
            return Err(InvalidHash(value));
        }
        u64::from_str_radix(&value, 16)
            .map(Hash64)
            .map_err(|_| InvalidHash(value))
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingDecodeError {
    #[error("embedding is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("embedding byte length {0} is not a multiple of 4")]
    Length(usize),
}

/// Fixed-length float vector, stored losslessly as base64 of the raw
/// little-endian `f32` bytes. Input may also give it as a plain array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "String")]
pub struct Embedding(Vec<f32>);

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingRepr {
    Encoded(String),
    Values(Vec<f32>),
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `None` when dimensions differ or either vector has zero norm.
    pub fn cosine(&self, other: &Embedding) -> Option<f64> {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return None;
        }
        let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.0.iter().zip(&other.0) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            na += a * a;
            nb += b * b;
        }
        if na == 0.0 || nb == 0.0 {
            return None;
        }
        Some(dot / (na.sqrt() * nb.sqrt()))
    }

    pub fn to_base64(&self) -> String {
        let bytes: Vec<u8> = self.0.iter().flat_map(|v| v.to_le_bytes()).collect();
        BASE64.encode(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, EmbeddingDecodeError> {
        let bytes = BASE64.decode(encoded)?;
        if bytes.len() % 4 != 0 {
            return Err(EmbeddingDecodeError::Length(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self(values))
    }
}

impl From<Embedding> for String {
    fn from(embedding: Embedding) -> Self {
        embedding.to_base64()
    }
}

impl<'de> Deserialize<'de> for Embedding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match EmbeddingRepr::deserialize(deserializer)? {
            EmbeddingRepr::Encoded(encoded) => {
                Embedding::from_base64(&encoded).map_err(serde::de::Error::custom)
            }
            EmbeddingRepr::Values(values) => Ok(Embedding(values)),
        }
    }
}

/// One hashed gallery image. `index` is the position of `url` in the
/// gallery list it was fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryImage {
    pub index: usize,
    pub url: String,
    #[serde(default)]
    pub cached_path: Option<PathBuf>,
    pub phash: Hash64,
    pub whash: Hash64,
    pub crop_hash: Hash64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl GalleryImage {
    /// Smallest Hamming distance over the three hash families.
    pub fn hash_distance(&self, other: &GalleryImage) -> u32 {
        self.phash
            .distance(other.phash)
            .min(self.whash.distance(other.whash))
            .min(self.crop_hash.distance(other.crop_hash))
    }

    pub fn matches(&self, other: &GalleryImage, max_distance: u32) -> bool {
        self.hash_distance(other) <= max_distance
    }
}

/// Per-listing evidence gathered before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingEvidence {
    #[serde(default)]
    pub images: Vec<GalleryImage>,
    #[serde(default)]
    pub floorplan_url: Option<String>,
    /// Detail-page description, used when the listing itself carries none.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub description_embedding: Option<Embedding>,
}

impl ListingEvidence {
    pub fn has_embeddings(&self) -> bool {
        self.images.iter().any(|image| image.embedding.is_some())
    }
}

/// One physical property assembled from a cluster of listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedProperty {
    pub canonical: Listing,
    pub members: Vec<ListingKey>,
    pub sources: BTreeSet<Source>,
    pub source_urls: BTreeMap<Source, String>,
    pub images: Vec<GalleryImage>,
    pub floorplan: Option<String>,
    pub min_price: u32,
    pub max_price: u32,
    pub descriptions: BTreeMap<Source, String>,
}
