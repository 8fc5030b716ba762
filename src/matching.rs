//! Candidate search and correspondence selection shared by the backends.
//!
//! A backend produces, for every query descriptor, its nearest train
//! descriptors sorted by ascending distance. The selectors in this module turn
//! those candidates into the final correspondences.

use crate::algorithm::{SelectorKind, Stage};
use crate::{BinaryDescriptor, Correspondence, Error, Result};
use bitarray::Hamming;
use hnsw::{Hnsw, Searcher};
use log::*;
use rand_pcg::Pcg64;
use space::{Knn, LinearKnn, Metric, Neighbor};

/// The ratio the best candidate distance must stay below, relative to the second best.
pub const LOWES_RATIO: f32 = 0.8;

/// The size of the dynamic candidate list while searching the HNSW.
const HNSW_EF: usize = 24;

/// Euclidean distance between float descriptors.
///
/// The distance is an `f32` reinterpreted as its bits, which orders the same
/// way as the float itself because it is never negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct L2;

impl Metric<Vec<f32>> for L2 {
    type Unit = u32;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> u32 {
        a.iter()
            .zip(b.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
            .to_bits()
    }
}

/// Candidates per query for a selector.
pub fn neighbors_for(selector: SelectorKind) -> usize {
    match selector {
        SelectorKind::NearestNeighbor => 1,
        SelectorKind::KNearestNeighbor => 2,
    }
}

/// Exhaustively searches `train` for the `k` nearest neighbours of every query.
pub fn linear_candidates<M, P>(
    metric: M,
    query: &[P],
    train: &[P],
    k: usize,
    distance: impl Fn(M::Unit) -> f32,
) -> Vec<Vec<Correspondence>>
where
    M: Metric<P>,
{
    let knn = LinearKnn {
        metric,
        iter: train.iter(),
    };
    query
        .iter()
        .enumerate()
        .map(|(query_ix, descriptor)| {
            knn.knn(descriptor, k)
                .into_iter()
                .map(|neighbor| {
                    Correspondence::new(query_ix, neighbor.index, distance(neighbor.distance))
                })
                .collect()
        })
        .collect()
}

/// Approximately searches `train` for the `k` nearest neighbours of every binary query.
pub fn hnsw_hamming_candidates(
    query: &[BinaryDescriptor],
    train: &[BinaryDescriptor],
    k: usize,
) -> Vec<Vec<Correspondence>> {
    if train.is_empty() {
        return vec![vec![]; query.len()];
    }
    let mut searcher = Searcher::default();
    let mut index: Hnsw<Hamming, BinaryDescriptor, Pcg64, 12, 24> = Hnsw::new(Hamming);
    for &descriptor in train {
        index.insert(descriptor, &mut searcher);
    }
    trace!("built HNSW over {} binary descriptors", train.len());
    query
        .iter()
        .enumerate()
        .map(|(query_ix, descriptor)| {
            let mut neighbors = vec![
                Neighbor {
                    index: !0,
                    distance: !0,
                };
                k
            ];
            index
                .nearest(descriptor, HNSW_EF, &mut searcher, &mut neighbors)
                .iter()
                .map(|neighbor| {
                    Correspondence::new(query_ix, neighbor.index, neighbor.distance as f32)
                })
                .collect()
        })
        .collect()
}

/// Approximately searches `train` for the `k` nearest neighbours of every float query.
pub fn hnsw_l2_candidates(
    query: &[Vec<f32>],
    train: &[Vec<f32>],
    k: usize,
) -> Vec<Vec<Correspondence>> {
    if train.is_empty() {
        return vec![vec![]; query.len()];
    }
    let mut searcher = Searcher::default();
    let mut index: Hnsw<L2, Vec<f32>, Pcg64, 12, 24> = Hnsw::new(L2);
    for descriptor in train {
        index.insert(descriptor.clone(), &mut searcher);
    }
    trace!("built HNSW over {} float descriptors", train.len());
    query
        .iter()
        .enumerate()
        .map(|(query_ix, descriptor)| {
            let mut neighbors = vec![
                Neighbor {
                    index: !0,
                    distance: !0,
                };
                k
            ];
            index
                .nearest(descriptor, HNSW_EF, &mut searcher, &mut neighbors)
                .iter()
                .map(|neighbor| {
                    Correspondence::new(query_ix, neighbor.index, f32::from_bits(neighbor.distance))
                })
                .collect()
        })
        .collect()
}

/// Keeps the nearest candidate of every query that has one.
pub fn nearest_neighbor(
    candidates: impl IntoIterator<Item = Vec<Correspondence>>,
) -> Vec<Correspondence> {
    candidates
        .into_iter()
        .filter_map(|neighbors| neighbors.into_iter().next())
        .collect()
}

/// Keeps the nearest candidate of every query if it is clearly better than the runner up.
///
/// A query is kept only when `best < ratio * second_best`. Queries with fewer
/// than two candidates cannot be judged and are dropped.
pub fn ratio_test(
    candidates: impl IntoIterator<Item = Vec<Correspondence>>,
    ratio: f32,
) -> Vec<Correspondence> {
    candidates
        .into_iter()
        .filter_map(|neighbors| match neighbors[..] {
            [best, second, ..] if best.distance < ratio * second.distance => Some(best),
            _ => None,
        })
        .collect()
}

/// Applies `selector` to the candidates, which must hold enough neighbours per query.
pub fn select(
    selector: SelectorKind,
    candidates: impl IntoIterator<Item = Vec<Correspondence>>,
) -> Vec<Correspondence> {
    let matches = match selector {
        SelectorKind::NearestNeighbor => nearest_neighbor(candidates),
        SelectorKind::KNearestNeighbor => ratio_test(candidates, LOWES_RATIO),
    };
    debug!("{} selector kept {} matches", selector, matches.len());
    matches
}

/// Checks that the keypoints and descriptors of one side line up.
pub(crate) fn check_rows(keypoints: usize, descriptors: usize) -> Result<()> {
    if keypoints == descriptors {
        Ok(())
    } else {
        Err(Error::Backend(format!(
            "{} keypoints but {} descriptor rows reached the {} stage",
            keypoints,
            descriptors,
            Stage::Matching
        )))
    }
}
