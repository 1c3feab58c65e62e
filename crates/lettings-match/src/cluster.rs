//! Transitive clustering of match edges.
//!
//! Every `match` pair unions its endpoints, so A~B and B~C put A and C in
//! one cluster even when A and C alone would score `no_match`. The
//! optional `cluster_floor` guard refuses a union unless every cross pair
//! between the two groups was scored at or above the floor.

use std::collections::{BTreeMap, HashMap};

use lettings_core::ListingKey;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scoring::PairScore;

/// Disjoint-set forest over `0..n` with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Returns `(new_root, absorbed_root)` when two distinct sets merged.
    pub fn union(&mut self, a: usize, b: usize) -> Option<(usize, usize)> {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return None;
        }
        let (root, child) = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Equal => {
                self.rank[ra] += 1;
                (ra, rb)
            }
        };
        self.parent[child] = root;
        Some((root, child))
    }

    pub fn groups(&mut self) -> BTreeMap<usize, Vec<usize>> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for x in 0..self.len() {
            let root = self.find(x);
            groups.entry(root).or_default().push(x);
        }
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    /// Sorted listing keys.
    pub members: Vec<ListingKey>,
}

impl Cluster {
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterReport {
    pub seeded_unions: usize,
    pub match_unions: usize,
    /// Pair ids of match edges the floor guard refused.
    pub blocked_by_floor: Vec<String>,
}

/// Builds one partition of the batch. Scoped to a single run.
pub struct ClusterBuilder {
    keys: Vec<ListingKey>,
    index: HashMap<ListingKey, usize>,
    sets: UnionFind,
    members: Vec<Vec<usize>>,
    floor: Option<f64>,
    scored: HashMap<(usize, usize), f64>,
    report: ClusterReport,
}

impl ClusterBuilder {
    pub fn new(keys: Vec<ListingKey>) -> Self {
        let index = keys.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();
        let n = keys.len();
        Self {
            keys,
            index,
            sets: UnionFind::new(n),
            members: (0..n).map(|i| vec![i]).collect(),
            floor: None,
            scored: HashMap::new(),
            report: ClusterReport::default(),
        }
    }

    /// Enable the floor guard. `scores` must contain every scored pair of
    /// the run, not only matches.
    pub fn with_floor(mut self, floor: f64, scores: &[PairScore]) -> Self {
        self.floor = Some(floor);
        for pair in scores {
            if let Some(edge) = self.edge(&pair.left, &pair.right) {
                self.scored.insert(edge, pair.score);
            }
        }
        self
    }

    fn edge(&self, a: &ListingKey, b: &ListingKey) -> Option<(usize, usize)> {
        let (ia, ib) = (*self.index.get(a)?, *self.index.get(b)?);
        Some((ia.min(ib), ia.max(ib)))
    }

    fn join(&mut self, a: usize, b: usize) -> bool {
        match self.sets.union(a, b) {
            Some((root, child)) => {
                let moved = std::mem::take(&mut self.members[child]);
                self.members[root].extend(moved);
                true
            }
            None => false,
        }
    }

    fn floor_allows(&mut self, a: usize, b: usize, floor: f64) -> bool {
        let (ra, rb) = (self.sets.find(a), self.sets.find(b));
        if ra == rb {
            return true;
        }
        self.members[ra].iter().all(|&x| {
            self.members[rb].iter().all(|&y| {
                self.scored
                    .get(&(x.min(y), x.max(y)))
                    .is_some_and(|score| *score >= floor)
            })
        })
    }

    /// Union the members of prior clusters. Keys not in this batch are
    /// ignored. Seeds bypass the floor guard.
    pub fn seed(&mut self, prior: &[Vec<ListingKey>]) {
        for group in prior {
            let present: Vec<usize> = group.iter().filter_map(|k| self.index.get(k).copied()).collect();
            for pair in present.windows(2) {
                if self.join(pair[0], pair[1]) {
                    self.report.seeded_unions += 1;
                }
            }
        }
    }

    /// Apply match edges strongest first, ties broken by pair id.
    pub fn add_matches<'p>(&mut self, pairs: impl IntoIterator<Item = &'p PairScore>) {
        let mut edges: Vec<&PairScore> = pairs.into_iter().filter(|p| p.is_match()).collect();
        edges.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.pair_id.cmp(&b.pair_id)));
        for pair in edges {
            let Some((a, b)) = self.edge(&pair.left, &pair.right) else {
                continue;
            };
            if let Some(floor) = self.floor {
                if !self.floor_allows(a, b, floor) {
                    warn!(pair_id = %pair.pair_id, floor, "cluster floor refused union");
                    self.report.blocked_by_floor.push(pair.pair_id.clone());
                    continue;
                }
            }
            if self.join(a, b) {
                self.report.match_unions += 1;
            }
        }
    }

    /// Every input key appears in exactly one cluster. Clusters are ordered
    /// by their smallest key.
    pub fn finish(mut self) -> (Vec<Cluster>, ClusterReport) {
        let mut clusters: Vec<Cluster> = self
            .sets
            .groups()
            .into_values()
            .map(|indices| {
                let mut members: Vec<ListingKey> = indices.into_iter().map(|i| self.keys[i].clone()).collect();
                members.sort();
                let id = format!("cluster-{}", members[0]).replace(':', "_");
                Cluster { id, members }
            })
            .collect();
        clusters.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
        (clusters, self.report)
    }
}
