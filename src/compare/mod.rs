// Backend comparison module
// Mirrors vectors from a primary index into a candidate index, replays
// queries against both, and scores the candidate on recall and rank
// agreement before a migration is trusted.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::Result;
use crate::embeddings::EmbeddingClient;
use crate::vectors::{VectorHit, VectorIndex};

/// Acceptance thresholds for a candidate backend.
pub const RECALL_THRESHOLD: f64 = 0.90;
pub const CORRELATION_THRESHOLD: f64 = 0.80;

const MIRROR_PAGE_SIZE: usize = 100;

/// Runs the comparison between an established index and a candidate.
pub struct BackendComparator {
    embeddings: EmbeddingClient,
    primary: Arc<dyn VectorIndex>,
    candidate: Arc<dyn VectorIndex>,
}

/// Metrics for one replayed query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryComparison {
    pub query: String,
    pub recall: f64,
    pub rank_correlation: f64,
    pub primary_latency_ms: f64,
    pub candidate_latency_ms: f64,
}

/// Aggregate outcome of a comparison run.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub vectors_mirrored: usize,
    pub primary_count: u64,
    pub candidate_count: u64,
    pub queries: Vec<QueryComparison>,
    pub avg_recall: f64,
    pub avg_correlation: f64,
    pub avg_primary_latency_ms: f64,
    pub avg_candidate_latency_ms: f64,
    /// True when the candidate clears both acceptance thresholds.
    pub passed: bool,
}

impl ComparisonReport {
    /// How much faster the candidate answered, as a percentage of primary
    /// latency. Negative when the candidate was slower.
    #[inline]
    pub fn latency_improvement_pct(&self) -> f64 {
        if self.avg_primary_latency_ms == 0.0 {
            0.0
        } else {
            (self.avg_primary_latency_ms - self.avg_candidate_latency_ms)
                / self.avg_primary_latency_ms
                * 100.0
        }
    }
}

impl BackendComparator {
    #[inline]
    pub fn new(
        embeddings: EmbeddingClient,
        primary: Arc<dyn VectorIndex>,
        candidate: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embeddings,
            primary,
            candidate,
        }
    }

    /// Mirror up to `max_vectors` from the primary into the candidate, then
    /// replay `queries` against both and score the candidate.
    #[inline]
    pub async fn run(
        &self,
        queries: &[String],
        top_k: usize,
        max_vectors: usize,
    ) -> Result<ComparisonReport> {
        let vectors_mirrored = self.mirror(max_vectors).await?;

        let primary_count = self.primary.count().await?;
        let candidate_count = self.candidate.count().await?;
        if primary_count != candidate_count {
            warn!(
                "Vector counts differ after mirroring: primary {} vs candidate {}",
                primary_count, candidate_count
            );
        }

        let mut comparisons = Vec::with_capacity(queries.len());
        for query in queries {
            comparisons.push(self.compare_query(query, top_k).await?);
        }

        let n = comparisons.len() as f64;
        let (avg_recall, avg_correlation, avg_primary, avg_candidate) = if comparisons.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            (
                comparisons.iter().map(|c| c.recall).sum::<f64>() / n,
                comparisons.iter().map(|c| c.rank_correlation).sum::<f64>() / n,
                comparisons.iter().map(|c| c.primary_latency_ms).sum::<f64>() / n,
                comparisons
                    .iter()
                    .map(|c| c.candidate_latency_ms)
                    .sum::<f64>()
                    / n,
            )
        };

        let passed = avg_recall >= RECALL_THRESHOLD && avg_correlation >= CORRELATION_THRESHOLD;
        info!(
            "Comparison finished: recall {:.2}, correlation {:.2}, passed: {}",
            avg_recall, avg_correlation, passed
        );

        Ok(ComparisonReport {
            vectors_mirrored,
            primary_count,
            candidate_count,
            queries: comparisons,
            avg_recall,
            avg_correlation,
            avg_primary_latency_ms: avg_primary,
            avg_candidate_latency_ms: avg_candidate,
            passed,
        })
    }

    /// Copy records from the primary into the candidate, page by page.
    async fn mirror(&self, max_vectors: usize) -> Result<usize> {
        let mut mirrored = 0;
        let mut cursor = None;

        while mirrored < max_vectors {
            let page_size = usize::min(MIRROR_PAGE_SIZE, max_vectors - mirrored);
            let page = self.primary.list_keys(page_size, cursor.take()).await?;
            if page.keys.is_empty() {
                break;
            }

            let records = self.primary.fetch(&page.keys).await?;
            mirrored += records.len();
            self.candidate.upsert(records).await?;
            debug!("Mirrored {} vectors so far", mirrored);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!("Mirrored {} vectors into candidate", mirrored);
        Ok(mirrored)
    }

    async fn compare_query(&self, query: &str, top_k: usize) -> Result<QueryComparison> {
        let vector = self.embeddings.embed(query)?;

        let start = Instant::now();
        let primary_hits = self.primary.query(&vector, top_k, None).await?;
        let primary_latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let candidate_hits = self.candidate.query(&vector, top_k, None).await?;
        let candidate_latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let recall = recall_at_k(&primary_hits, &candidate_hits, top_k);
        let rank_correlation = rank_correlation(&primary_hits, &candidate_hits);
        debug!(
            "Query '{}': recall {:.2}, correlation {:.2}",
            query, recall, rank_correlation
        );

        Ok(QueryComparison {
            query: query.to_string(),
            recall,
            rank_correlation,
            primary_latency_ms,
            candidate_latency_ms,
        })
    }
}

/// Fraction of the baseline's top-k keys that appear in the candidate's
/// top-k. An empty baseline scores 1.0.
#[inline]
pub fn recall_at_k(baseline: &[VectorHit], candidate: &[VectorHit], k: usize) -> f64 {
    let baseline_keys: HashSet<&str> =
        baseline.iter().take(k).map(|h| h.key.as_str()).collect();
    let candidate_keys: HashSet<&str> =
        candidate.iter().take(k).map(|h| h.key.as_str()).collect();

    if baseline_keys.is_empty() {
        return 1.0;
    }

    let matches = baseline_keys.intersection(&candidate_keys).count();
    matches as f64 / baseline_keys.len() as f64
}

/// Spearman rank correlation over the keys both result lists share. Fewer
/// than two common keys scores 0.0.
#[inline]
pub fn rank_correlation(baseline: &[VectorHit], candidate: &[VectorHit]) -> f64 {
    let baseline_ranks: HashMap<&str, i64> = baseline
        .iter()
        .enumerate()
        .map(|(i, h)| (h.key.as_str(), i as i64 + 1))
        .collect();
    let candidate_ranks: HashMap<&str, i64> = candidate
        .iter()
        .enumerate()
        .map(|(i, h)| (h.key.as_str(), i as i64 + 1))
        .collect();

    let common: Vec<&str> = baseline_ranks
        .keys()
        .filter(|key| candidate_ranks.contains_key(*key))
        .copied()
        .collect();

    let n = common.len() as i64;
    if n < 2 {
        return 0.0;
    }

    let sum_d_squared: i64 = common
        .iter()
        .map(|key| {
            let d = baseline_ranks[key] - candidate_ranks[key];
            d * d
        })
        .sum();

    1.0 - (6 * sum_d_squared) as f64 / (n * (n * n - 1)) as f64
}
