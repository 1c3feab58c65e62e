use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use lettings_core::{Listing, ListingEvidence, ListingKey, MergedProperty};
use lettings_images::dedupe_images;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge an empty cluster")]
    EmptyCluster,
    #[error("cluster contains listing {key} more than once")]
    DuplicateIdentity { key: ListingKey },
}

/// Fields that make a listing a better canonical representative.
fn completeness(listing: &Listing) -> usize {
    usize::from(listing.effective_postcode().is_some())
        + usize::from(listing.coordinates().is_some())
        + usize::from(listing.description_text().is_some())
}

/// Most complete first, then earliest `first_seen`, then identity key.
fn canonical_order(a: &Listing, b: &Listing) -> std::cmp::Ordering {
    Reverse(completeness(a))
        .cmp(&Reverse(completeness(b)))
        .then_with(|| a.first_seen.cmp(&b.first_seen))
        .then_with(|| a.key().cmp(&b.key()))
}

pub fn select_canonical<'a>(members: &[&'a Listing]) -> Option<&'a Listing> {
    members.iter().copied().min_by(|a, b| canonical_order(a, b))
}

/// Collapse repeated `(source, source_id)` records, keeping the earliest
/// seen. Order of first appearance is preserved.
pub fn dedupe_by_identity(listings: Vec<Listing>) -> (Vec<Listing>, usize) {
    let mut slot: HashMap<ListingKey, usize> = HashMap::new();
    let mut kept: Vec<Listing> = Vec::with_capacity(listings.len());
    let mut dropped = 0;
    for listing in listings {
        match slot.get(&listing.key()) {
            Some(&i) => {
                dropped += 1;
                if listing.first_seen < kept[i].first_seen {
                    kept[i] = listing;
                }
            }
            None => {
                slot.insert(listing.key(), kept.len());
                kept.push(listing);
            }
        }
    }
    (kept, dropped)
}

pub struct MergeEngine {
    hash_max_distance: u32,
}

impl MergeEngine {
    pub fn new(hash_max_distance: u32) -> Self {
        Self { hash_max_distance }
    }

    pub fn merge(
        &self,
        members: &[&Listing],
        evidence: &BTreeMap<ListingKey, ListingEvidence>,
    ) -> Result<MergedProperty, MergeError> {
        let mut keys = BTreeSet::new();
        for listing in members {
            let key = listing.key();
            if !keys.insert(key.clone()) {
                return Err(MergeError::DuplicateIdentity { key });
            }
        }

        let mut ordered: Vec<&Listing> = members.to_vec();
        ordered.sort_by(|a, b| canonical_order(a, b));
        let canonical = *ordered.first().ok_or(MergeError::EmptyCluster)?;

        // One representative per platform: the best-ranked listing from it.
        let mut per_source: BTreeMap<_, &Listing> = BTreeMap::new();
        for listing in &ordered {
            per_source.entry(listing.source).or_insert(*listing);
        }

        let source_urls = per_source
            .iter()
            .map(|(source, listing)| (*source, listing.url.clone()))
            .collect();
        let descriptions = per_source
            .iter()
            .filter_map(|(source, listing)| {
                let text = listing.description_text().map(str::to_string).or_else(|| {
                    evidence
                        .get(&listing.key())
                        .and_then(|e| e.description.as_deref())
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string)
                });
                text.map(|t| (*source, t))
            })
            .collect();

        let images = dedupe_images(
            ordered
                .iter()
                .filter_map(|l| evidence.get(&l.key()))
                .flat_map(|e| e.images.iter().cloned()),
            self.hash_max_distance,
        );
        let floorplan = ordered
            .iter()
            .filter_map(|l| evidence.get(&l.key()))
            .find_map(|e| e.floorplan_url.clone());

        let min_price = ordered.iter().map(|l| l.price_pcm).min().unwrap_or(canonical.price_pcm);
        let max_price = ordered.iter().map(|l| l.price_pcm).max().unwrap_or(canonical.price_pcm);

        debug!(canonical = %canonical.key(), members = ordered.len(), images = images.len(), "merged cluster");
        Ok(MergedProperty {
            canonical: canonical.clone(),
            members: keys.into_iter().collect(),
            sources: per_source.keys().copied().collect(),
            source_urls,
            images,
            floorplan,
            min_price,
            max_price,
            descriptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::listing;
    use chrono::Duration;
    use lettings_core::{GalleryImage, Hash64, Source};

    fn image(url: &str, hash: u64) -> GalleryImage {
        GalleryImage {
            index: 0,
            url: url.to_string(),
            cached_path: None,
            phash: Hash64(hash),
            whash: Hash64(hash),
            crop_hash: Hash64(hash),
            embedding: None,
        }
    }

    #[test]
    fn canonical_prefers_complete_then_earliest() {
        let mut a = listing(Source::Zoopla, "1");
        let mut b = listing(Source::Rightmove, "2");
        let mut c = listing(Source::Openrent, "3");
        a.latitude = Some(51.5);
        a.longitude = Some(-0.03);
        b.latitude = Some(51.5);
        b.longitude = Some(-0.03);
        b.first_seen = a.first_seen - Duration::days(2);
        c.first_seen = a.first_seen - Duration::days(10);
        assert_eq!(select_canonical(&[&a, &b, &c]).unwrap().key(), b.key());
        assert!(select_canonical(&[]).is_none());
    }

    #[test]
    fn merged_property_invariants() {
        let mut a = listing(Source::Rightmove, "1");
        let mut b = listing(Source::Zoopla, "2");
        let c = listing(Source::Zoopla, "3");
        a.price_pcm = 1550;
        b.price_pcm = 1495;
        a.description = Some("Bright two bed".to_string());
        let mut evidence = BTreeMap::new();
        evidence.insert(
            a.key(),
            ListingEvidence {
                images: vec![image("https://rm/1.jpg", 0), image("https://rm/2.jpg", u64::MAX)],
                ..Default::default()
            },
        );
        evidence.insert(
            b.key(),
            ListingEvidence {
                images: vec![image("https://zp/a.jpg", 0b11), image("https://zp/b.jpg", 0x0f0f_0f0f_0f0f_0f0f)],
                floorplan_url: Some("https://zp/floor.png".to_string()),
                description: Some("Two bedroom flat".to_string()),
                ..Default::default()
            },
        );

        let merged = MergeEngine::new(8).merge(&[&a, &b, &c], &evidence).unwrap();
        let url_keys: BTreeSet<Source> = merged.source_urls.keys().copied().collect();
        assert_eq!(url_keys, merged.sources);
        assert_eq!(merged.sources.len(), 2);
        assert!(merged.min_price <= merged.max_price);
        assert_eq!((merged.min_price, merged.max_price), (1495, 1550));
        assert_eq!(merged.images.len(), 3);
        assert_eq!(merged.floorplan.as_deref(), Some("https://zp/floor.png"));
        assert_eq!(merged.descriptions.get(&Source::Rightmove).map(String::as_str), Some("Bright two bed"));
        assert_eq!(merged.descriptions.get(&Source::Zoopla).map(String::as_str), Some("Two bedroom flat"));
        assert_eq!(merged.canonical.key(), a.key());
        assert_eq!(merged.members.len(), 3);
    }

    #[test]
    fn structural_violations_are_errors() {
        let a = listing(Source::Rightmove, "1");
        let engine = MergeEngine::new(8);
        assert_eq!(engine.merge(&[], &BTreeMap::new()), Err(MergeError::EmptyCluster));
        assert_eq!(
            engine.merge(&[&a, &a], &BTreeMap::new()),
            Err(MergeError::DuplicateIdentity { key: a.key() })
        );
    }

    #[test]
    fn identity_dedupe_keeps_earliest() {
        let first = listing(Source::Zoopla, "1");
        let mut again = first.clone();
        again.first_seen = first.first_seen - Duration::hours(3);
        again.price_pcm = 1400;
        let other = listing(Source::Rightmove, "1");
        let (kept, dropped) = dedupe_by_identity(vec![first, other.clone(), again.clone()]);
        assert_eq!(dropped, 1);
        assert_eq!(kept, vec![again, other]);
    }
}
