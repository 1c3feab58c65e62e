//! Pairwise evidence signals. Every signal is a pure function of two
//! candidates; missing data yields an unfired result, never an error.

use std::collections::BTreeMap;
use std::fmt;

use lettings_core::{GalleryImage, Listing, ListingEvidence};
use lettings_images::{best_embedding_similarity, gallery_overlap};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::config::SignalSettings;
use crate::text::{house_number, jaccard, normalize_address, normalize_street, tokenize, TfidfIndex};

pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.03;
pub const DEFAULT_COORDINATE_MATCH_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    FullPostcode,
    Outcode,
    Coordinates,
    StreetName,
    Price,
    FuzzyAddress,
    AddressNumber,
    TitleSimilarity,
    FeatureOverlap,
    GalleryImages,
    GalleryEmbeddings,
    DescriptionTfidf,
    DescriptionSemantic,
}

impl SignalKind {
    pub const ALL: [SignalKind; 13] = [
        SignalKind::FullPostcode,
        SignalKind::Outcode,
        SignalKind::Coordinates,
        SignalKind::StreetName,
        SignalKind::Price,
        SignalKind::FuzzyAddress,
        SignalKind::AddressNumber,
        SignalKind::TitleSimilarity,
        SignalKind::FeatureOverlap,
        SignalKind::GalleryImages,
        SignalKind::GalleryEmbeddings,
        SignalKind::DescriptionTfidf,
        SignalKind::DescriptionSemantic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::FullPostcode => "full_postcode",
            SignalKind::Outcode => "outcode",
            SignalKind::Coordinates => "coordinates",
            SignalKind::StreetName => "street_name",
            SignalKind::Price => "price",
            SignalKind::FuzzyAddress => "fuzzy_address",
            SignalKind::AddressNumber => "address_number",
            SignalKind::TitleSimilarity => "title_similarity",
            SignalKind::FeatureOverlap => "feature_overlap",
            SignalKind::GalleryImages => "gallery_images",
            SignalKind::GalleryEmbeddings => "gallery_embeddings",
            SignalKind::DescriptionTfidf => "description_tfidf",
            SignalKind::DescriptionSemantic => "description_semantic",
        }
    }

    pub fn default_weight(&self) -> f64 {
        match self {
            SignalKind::FullPostcode => 30.0,
            SignalKind::Outcode => 10.0,
            SignalKind::Coordinates => 25.0,
            SignalKind::StreetName => 20.0,
            SignalKind::Price => 10.0,
            SignalKind::FuzzyAddress => 10.0,
            SignalKind::AddressNumber => 10.0,
            SignalKind::TitleSimilarity => 5.0,
            SignalKind::FeatureOverlap => 5.0,
            SignalKind::GalleryImages => 40.0,
            SignalKind::GalleryEmbeddings => 20.0,
            SignalKind::DescriptionTfidf => 15.0,
            SignalKind::DescriptionSemantic => 10.0,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub fired: bool,
    /// Strength of the match in `[0, 1]`; always `0.0` when not fired.
    pub value: f64,
    pub detail: String,
}

impl SignalResult {
    pub fn absent(detail: impl Into<String>) -> Self {
        Self {
            fired: false,
            value: 0.0,
            detail: detail.into(),
        }
    }

    pub fn fired(value: f64, detail: impl Into<String>) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            fired: true,
            value,
            detail: detail.into(),
        }
    }

    fn binary(equal: bool, detail: impl Into<String>) -> Self {
        Self::fired(if equal { 1.0 } else { 0.0 }, detail)
    }
}

/// One result for every [`SignalKind`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSet(BTreeMap<SignalKind, SignalResult>);

impl SignalSet {
    pub fn insert(&mut self, kind: SignalKind, result: SignalResult) {
        self.0.insert(kind, result);
    }

    pub fn get(&self, kind: SignalKind) -> Option<&SignalResult> {
        self.0.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalKind, &SignalResult)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn fired(&self) -> impl Iterator<Item = (SignalKind, &SignalResult)> {
        self.iter().filter(|(_, r)| r.fired)
    }

    pub fn fired_count(&self) -> usize {
        self.fired().count()
    }
}

/// A listing together with whatever detail-page and image evidence was
/// gathered for it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub listing: &'a Listing,
    pub evidence: Option<&'a ListingEvidence>,
}

impl<'a> Candidate<'a> {
    pub fn new(listing: &'a Listing, evidence: Option<&'a ListingEvidence>) -> Self {
        Self { listing, evidence }
    }

    pub fn images(&self) -> &'a [GalleryImage] {
        self.evidence.map(|e| e.images.as_slice()).unwrap_or(&[])
    }

    pub fn description(&self) -> Option<&'a str> {
        self.listing.description_text().or_else(|| {
            self.evidence
                .and_then(|e| e.description.as_deref())
                .map(str::trim)
                .filter(|d| !d.is_empty())
        })
    }

    pub fn features(&self) -> &'a [String] {
        if !self.listing.features.is_empty() {
            return &self.listing.features;
        }
        self.evidence.map(|e| e.features.as_slice()).unwrap_or(&[])
    }
}

pub struct SignalContext<'a> {
    pub settings: &'a SignalSettings,
    pub tfidf: Option<&'a TfidfIndex>,
}

/// Relative, symmetric price check at the default 3% tolerance.
pub fn prices_match(a: u32, b: u32) -> bool {
    prices_within(a, b, DEFAULT_PRICE_TOLERANCE)
}

/// Zero only matches zero; otherwise the difference must not exceed
/// `tolerance` of the larger price.
pub fn prices_within(a: u32, b: u32, tolerance: f64) -> bool {
    if a == 0 || b == 0 {
        return a == b;
    }
    let (a, b) = (f64::from(a), f64::from(b));
    (a - b).abs() <= tolerance * a.max(b) + 1e-9
}

/// Haversine great-circle distance in meters.
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (b.0 - a.0).to_radians();
    let d_lng = (b.1 - a.1).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.0.to_radians().cos() * b.0.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub fn coordinates_match(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => haversine_m(a, b) <= DEFAULT_COORDINATE_MATCH_M,
        _ => false,
    }
}

/// 1.0 up to `match_m`, linear decay to 0.0 at `cutoff_m`.
pub fn distance_strength(distance_m: f64, match_m: f64, cutoff_m: f64) -> f64 {
    if distance_m <= match_m {
        1.0
    } else if distance_m >= cutoff_m {
        0.0
    } else {
        (cutoff_m - distance_m) / (cutoff_m - match_m)
    }
}

pub fn full_postcode(a: &Candidate, b: &Candidate) -> SignalResult {
    match (a.listing.effective_postcode(), b.listing.effective_postcode()) {
        (Some(pa), Some(pb)) if pa.is_full() && pb.is_full() => {
            SignalResult::binary(pa == pb, format!("{pa} vs {pb}"))
        }
        _ => SignalResult::absent("full postcode missing"),
    }
}

pub fn outcode(a: &Candidate, b: &Candidate) -> SignalResult {
    match (a.listing.outcode(), b.listing.outcode()) {
        (Some(oa), Some(ob)) => SignalResult::binary(oa == ob, format!("{oa} vs {ob}")),
        _ => SignalResult::absent("outcode missing"),
    }
}

pub fn coordinates(a: &Candidate, b: &Candidate, settings: &SignalSettings) -> SignalResult {
    match (a.listing.coordinates(), b.listing.coordinates()) {
        (Some(ca), Some(cb)) => {
            let distance = haversine_m(ca, cb);
            SignalResult::fired(
                distance_strength(distance, settings.coordinate_match_m, settings.coordinate_cutoff_m),
                format!("{distance:.0}m apart"),
            )
        }
        _ => SignalResult::absent("coordinates missing"),
    }
}

pub fn street_name(a: &Candidate, b: &Candidate) -> SignalResult {
    let (ra, rb) = (a.listing.address.trim(), b.listing.address.trim());
    if ra.is_empty() || rb.is_empty() {
        return SignalResult::absent("address missing");
    }
    let (sa, sb) = (normalize_street(ra), normalize_street(rb));
    SignalResult::binary(!sa.is_empty() && sa == sb, format!("'{sa}' vs '{sb}'"))
}

pub fn price(a: &Candidate, b: &Candidate, settings: &SignalSettings) -> SignalResult {
    let (pa, pb) = (a.listing.price_pcm, b.listing.price_pcm);
    SignalResult::binary(
        prices_within(pa, pb, settings.price_tolerance),
        format!("£{pa} vs £{pb}"),
    )
}

pub fn fuzzy_address(a: &Candidate, b: &Candidate, settings: &SignalSettings) -> SignalResult {
    let (na, nb) = (normalize_address(&a.listing.address), normalize_address(&b.listing.address));
    if na.is_empty() || nb.is_empty() {
        return SignalResult::absent("address missing");
    }
    let similarity = normalized_levenshtein(&na, &nb);
    let value = if similarity >= settings.fuzzy_address_min { similarity } else { 0.0 };
    SignalResult::fired(value, format!("edit similarity {similarity:.2}"))
}

pub fn address_number(a: &Candidate, b: &Candidate) -> SignalResult {
    match (house_number(&a.listing.address), house_number(&b.listing.address)) {
        (Some(na), Some(nb)) => SignalResult::binary(na == nb, format!("{na} vs {nb}")),
        _ => SignalResult::absent("house number missing"),
    }
}

pub fn title_similarity(a: &Candidate, b: &Candidate) -> SignalResult {
    match jaccard(&tokenize(&a.listing.title), &tokenize(&b.listing.title)) {
        Some(sim) => SignalResult::fired(sim, format!("title jaccard {sim:.2}")),
        None => SignalResult::absent("title empty"),
    }
}

pub fn feature_overlap(a: &Candidate, b: &Candidate) -> SignalResult {
    let tokens = |features: &[String]| -> Vec<String> {
        features.iter().flat_map(|f| tokenize(f)).collect()
    };
    match jaccard(&tokens(a.features()), &tokens(b.features())) {
        Some(sim) => SignalResult::fired(sim, format!("feature jaccard {sim:.2}")),
        None => SignalResult::absent("features missing"),
    }
}

pub fn gallery_images(a: &Candidate, b: &Candidate, settings: &SignalSettings) -> SignalResult {
    match gallery_overlap(a.images(), b.images(), settings.hash_max_distance) {
        Some(overlap) => SignalResult::fired(
            overlap.fraction(),
            format!("{}/{} images matched", overlap.matched, overlap.compared),
        ),
        None => SignalResult::absent("gallery hashes missing"),
    }
}

pub fn gallery_embeddings(a: &Candidate, b: &Candidate, settings: &SignalSettings) -> SignalResult {
    match best_embedding_similarity(a.images(), b.images()) {
        Some(best) => {
            let value = if best >= settings.embedding_threshold { best } else { 0.0 };
            SignalResult::fired(value, format!("best cosine {best:.3}"))
        }
        None => SignalResult::absent("gallery embeddings missing"),
    }
}

pub fn description_tfidf(a: &Candidate, b: &Candidate, tfidf: Option<&TfidfIndex>) -> SignalResult {
    if a.description().is_none() || b.description().is_none() {
        return SignalResult::absent("description missing");
    }
    match tfidf.and_then(|index| index.similarity(&a.listing.key(), &b.listing.key())) {
        Some(sim) => SignalResult::fired(sim, format!("tf-idf cosine {sim:.2}")),
        None => SignalResult::absent("description not indexed"),
    }
}

pub fn description_semantic(a: &Candidate, b: &Candidate) -> SignalResult {
    let ea = a.evidence.and_then(|e| e.description_embedding.as_ref());
    let eb = b.evidence.and_then(|e| e.description_embedding.as_ref());
    match (ea, eb) {
        (Some(ea), Some(eb)) => match ea.cosine(eb) {
            Some(sim) => SignalResult::fired(sim, format!("text embedding cosine {sim:.3}")),
            None => SignalResult::absent("text embeddings incomparable"),
        },
        _ => SignalResult::absent("text embedding missing"),
    }
}

pub fn evaluate(kind: SignalKind, a: &Candidate, b: &Candidate, ctx: &SignalContext) -> SignalResult {
    let settings = ctx.settings;
    match kind {
        SignalKind::FullPostcode => full_postcode(a, b),
        SignalKind::Outcode => outcode(a, b),
        SignalKind::Coordinates => coordinates(a, b, settings),
        SignalKind::StreetName => street_name(a, b),
        SignalKind::Price => price(a, b, settings),
        SignalKind::FuzzyAddress => fuzzy_address(a, b, settings),
        SignalKind::AddressNumber => address_number(a, b),
        SignalKind::TitleSimilarity => title_similarity(a, b),
        SignalKind::FeatureOverlap => feature_overlap(a, b),
        SignalKind::GalleryImages => gallery_images(a, b, settings),
        SignalKind::GalleryEmbeddings => gallery_embeddings(a, b, settings),
        SignalKind::DescriptionTfidf => description_tfidf(a, b, ctx.tfidf),
        SignalKind::DescriptionSemantic => description_semantic(a, b),
    }
}

pub fn evaluate_all(a: &Candidate, b: &Candidate, ctx: &SignalContext) -> SignalSet {
    let mut set = SignalSet::default();
    for kind in SignalKind::ALL {
        set.insert(kind, evaluate(kind, a, b, ctx));
    }
    set
}


#[cfg(test)]
mod tests {
    use super::test_support::listing;
    use super::*;
    use lettings_core::{Embedding, Hash64, Source};

    const METERS_PER_DEGREE_LAT: f64 = 111_195.0;

    fn ctx(settings: &SignalSettings) -> SignalContext<'_> {
        SignalContext { settings, tfidf: None }
    }

    #[test]
    fn price_match_properties() {
        assert!(prices_match(2000, 2060));
        assert!(!prices_match(2000, 2100));
        assert!(!prices_match(0, 2000));
        assert!(prices_match(0, 0));
        for (a, b) in [(1500, 1540), (999, 1030), (2000, 2100), (0, 10), (1, 1)] {
            assert!(prices_match(a, a));
            assert_eq!(prices_match(a, b), prices_match(b, a));
        }
    }

    #[test]
    fn coordinate_match_needs_both_points() {
        let origin = (51.5250, -0.0350);
        let near = (origin.0 + 30.0 / METERS_PER_DEGREE_LAT, origin.1);
        let far = (origin.0 + 500.0 / METERS_PER_DEGREE_LAT, origin.1);
        assert!((haversine_m(origin, near) - 30.0).abs() < 1.0);
        assert!(coordinates_match(Some(origin), Some(near)));
        assert!(!coordinates_match(Some(origin), Some(far)));
        assert!(!coordinates_match(Some(origin), None));
        assert!(!coordinates_match(None, None));
    }

    #[test]
    fn coordinate_strength_decays_linearly() {
        assert_eq!(distance_strength(30.0, 50.0, 150.0), 1.0);
        assert!((distance_strength(100.0, 50.0, 150.0) - 0.5).abs() < 1e-9);
        assert_eq!(distance_strength(500.0, 50.0, 150.0), 0.0);
    }

    #[test]
    fn identical_listings_fire_the_location_signals() {
        let settings = SignalSettings::default();
        let mut a = listing(Source::Rightmove, "1");
        let mut b = listing(Source::Zoopla, "9");
        a.latitude = Some(51.525);
        a.longitude = Some(-0.035);
        b.latitude = Some(51.5251);
        b.longitude = Some(-0.035);
        let set = evaluate_all(&Candidate::new(&a, None), &Candidate::new(&b, None), &ctx(&settings));
        for kind in [
            SignalKind::FullPostcode,
            SignalKind::Outcode,
            SignalKind::Coordinates,
            SignalKind::StreetName,
            SignalKind::Price,
            SignalKind::AddressNumber,
        ] {
            let result = set.get(kind).unwrap();
            assert!(result.fired, "{kind} should fire");
            assert_eq!(result.value, 1.0, "{kind}");
        }
        assert!(!set.get(SignalKind::GalleryImages).unwrap().fired);
        assert!(!set.get(SignalKind::DescriptionTfidf).unwrap().fired);
    }

    #[test]
    fn missing_data_never_fires() {
        let settings = SignalSettings::default();
        let mut a = listing(Source::Rightmove, "1");
        let mut b = listing(Source::Zoopla, "9");
        a.postcode = None;
        a.address = String::new();
        b.postcode = Some("E3".to_string());
        b.title = String::new();
        let (ca, cb) = (Candidate::new(&a, None), Candidate::new(&b, None));
        for result in [
            full_postcode(&ca, &cb),
            outcode(&ca, &cb),
            coordinates(&ca, &cb, &settings),
            street_name(&ca, &cb),
            title_similarity(&ca, &cb),
            feature_overlap(&ca, &cb),
        ] {
            assert!(!result.fired);
            assert_eq!(result.value, 0.0);
        }
        assert!(price(&ca, &cb, &settings).fired);
    }

    #[test]
    fn postcode_falls_back_to_the_address() {
        let mut a = listing(Source::Openrent, "1");
        let b = listing(Source::Zoopla, "2");
        a.postcode = None;
        a.address = "12 Mile End Road, London E3 4AA".to_string();
        let result = full_postcode(&Candidate::new(&a, None), &Candidate::new(&b, None));
        assert!(result.fired);
        assert_eq!(result.value, 1.0);
    }

    fn image(url: &str, hash: u64, embedding: Option<Vec<f32>>) -> GalleryImage {
        GalleryImage {
            index: 0,
            url: url.to_string(),
            cached_path: None,
            phash: Hash64(hash),
            whash: Hash64(hash),
            crop_hash: Hash64(hash),
            embedding: embedding.map(Embedding::new),
        }
    }

    #[test]
    fn gallery_signals_use_evidence() {
        let settings = SignalSettings::default();
        let a = listing(Source::Rightmove, "1");
        let b = listing(Source::Zoopla, "2");
        let ea = ListingEvidence {
            images: vec![
                image("a1", 0, Some(vec![1.0, 0.0])),
                image("a2", u64::MAX, Some(vec![0.0, 1.0])),
            ],
            ..Default::default()
        };
        let eb = ListingEvidence {
            images: vec![
                image("b1", 0b1, Some(vec![1.0, 0.05])),
                image("b2", 0x0f0f_0f0f_0f0f_0f0f, None),
                image("b3", 0x3333_3333_3333_3333, None),
            ],
            ..Default::default()
        };
        let (ca, cb) = (Candidate::new(&a, Some(&ea)), Candidate::new(&b, Some(&eb)));
        let images = gallery_images(&ca, &cb, &settings);
        assert!(images.fired);
        assert!((images.value - 0.5).abs() < 1e-9);
        let embeddings = gallery_embeddings(&ca, &cb, &settings);
        assert!(embeddings.fired);
        assert!(embeddings.value > 0.99);
        assert!(!gallery_images(&ca, &Candidate::new(&b, None), &settings).fired);
    }

    #[test]
    fn description_tfidf_uses_the_batch_index() {
        let settings = SignalSettings::default();
        let mut a = listing(Source::Rightmove, "1");
        let b = listing(Source::Zoopla, "2");
        a.description = Some("Sunny flat overlooking Victoria Park".to_string());
        let eb = ListingEvidence {
            description: Some("Sunny flat, overlooking Victoria Park".to_string()),
            ..Default::default()
        };
        let index = TfidfIndex::build([
            (a.key(), "Sunny flat overlooking Victoria Park"),
            (b.key(), "Sunny flat, overlooking Victoria Park"),
        ]);
        let ctx = SignalContext { settings: &settings, tfidf: Some(&index) };
        let result = description_tfidf(&Candidate::new(&a, None), &Candidate::new(&b, Some(&eb)), ctx.tfidf);
        assert!(result.fired);
        assert!(result.value > 0.99);
    }
}
