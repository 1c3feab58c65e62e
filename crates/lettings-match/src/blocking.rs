//! Candidate-pair generation. Listings are bucketed by `(outcode, bedrooms)`;
//! listings missing either go to a catch-all compared against every bucket
//! with a compatible bedroom count.
//!
//! A true duplicate whose bedroom count was entered differently on each
//! platform is never compared. That is an accepted limitation.

use std::collections::{BTreeMap, BTreeSet};

use lettings_core::Listing;

#[derive(Debug, Default)]
pub struct BlockingIndex {
    buckets: BTreeMap<(String, u32), Vec<usize>>,
    catch_all: Vec<usize>,
    bedrooms: Vec<Option<u32>>,
    sources: Vec<lettings_core::Source>,
}

impl BlockingIndex {
    pub fn build(listings: &[Listing]) -> Self {
        let mut index = BlockingIndex {
            bedrooms: listings.iter().map(|l| l.bedrooms).collect(),
            sources: listings.iter().map(|l| l.source).collect(),
            ..Default::default()
        };
        for (i, listing) in listings.iter().enumerate() {
            match (listing.outcode(), listing.bedrooms) {
                (Some(outcode), Some(beds)) => index.buckets.entry((outcode, beds)).or_default().push(i),
                _ => index.catch_all.push(i),
            }
        }
        index
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn catch_all(&self) -> &[usize] {
        &self.catch_all
    }

    fn compatible_bedrooms(&self, a: usize, b: usize) -> bool {
        match (self.bedrooms[a], self.bedrooms[b]) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
    }

    /// Index pairs `(i, j)` with `i < j`, sorted and unique.
    pub fn candidate_pairs(&self, cross_source_only: bool) -> Vec<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        let mut push = |a: usize, b: usize| {
            if a == b || (cross_source_only && self.sources[a] == self.sources[b]) {
                return;
            }
            pairs.insert((a.min(b), a.max(b)));
        };

        for members in self.buckets.values() {
            for (n, &a) in members.iter().enumerate() {
                for &b in &members[n + 1..] {
                    push(a, b);
                }
            }
        }

        for (n, &a) in self.catch_all.iter().enumerate() {
            for &b in &self.catch_all[n + 1..] {
                if self.compatible_bedrooms(a, b) {
                    push(a, b);
                }
            }
            for ((_, beds), members) in &self.buckets {
                if self.bedrooms[a].is_some_and(|own| own != *beds) {
                    continue;
                }
                for &b in members {
                    push(a, b);
                }
            }
        }

        pairs.into_iter().collect()
    }
}
