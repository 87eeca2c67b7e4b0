use super::*;
use crate::vectors::ChunkMetadata;

fn hit(key: &str, score: f32) -> VectorHit {
    VectorHit {
        key: key.to_string(),
        score,
        metadata: ChunkMetadata {
            source_id: "doc".to_string(),
            object_key: "meetings/2024/01/doc.json".to_string(),
            title: "Test".to_string(),
            speaker: "Alice".to_string(),
            text: String::new(),
            chunk_index: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

fn hits(keys: &[&str]) -> Vec<VectorHit> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| hit(key, 1.0 - i as f32 * 0.05))
        .collect()
}

#[test]
fn identical_results_have_perfect_recall() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["a", "b", "c", "d"]);
    assert_eq!(recall_at_k(&baseline, &candidate, 4), 1.0);
}

#[test]
fn recall_counts_shared_keys_regardless_of_order() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["d", "c", "x", "a"]);
    assert_eq!(recall_at_k(&baseline, &candidate, 4), 0.75);
}

#[test]
fn recall_respects_the_k_cutoff() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["c", "d", "a", "b"]);
    // Only the top 2 of each list are considered.
    assert_eq!(recall_at_k(&baseline, &candidate, 2), 0.0);
}

#[test]
fn empty_baseline_scores_full_recall() {
    let candidate = hits(&["a", "b"]);
    assert_eq!(recall_at_k(&[], &candidate, 10), 1.0);
}

#[test]
fn identical_rankings_correlate_perfectly() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["a", "b", "c", "d"]);
    assert_eq!(rank_correlation(&baseline, &candidate), 1.0);
}

#[test]
fn reversed_rankings_correlate_negatively() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["d", "c", "b", "a"]);
    assert_eq!(rank_correlation(&baseline, &candidate), -1.0);
}

#[test]
fn too_few_common_keys_scores_zero() {
    let baseline = hits(&["a", "b"]);
    assert_eq!(rank_correlation(&baseline, &hits(&["x", "y"])), 0.0);
    assert_eq!(rank_correlation(&baseline, &hits(&["a", "y"])), 0.0);
    assert_eq!(rank_correlation(&[], &[]), 0.0);
}

#[test]
fn one_swap_correlates_below_one() {
    let baseline = hits(&["a", "b", "c", "d"]);
    let candidate = hits(&["a", "c", "b", "d"]);
    let rho = rank_correlation(&baseline, &candidate);
    // n=4, sum d^2 = 2: rho = 1 - 12/60 = 0.8
    assert!((rho - 0.8).abs() < 1e-9);
}

#[test]
fn latency_improvement_is_relative_to_primary() {
    let report = ComparisonReport {
        vectors_mirrored: 0,
        primary_count: 0,
        candidate_count: 0,
        queries: Vec::new(),
        avg_recall: 1.0,
        avg_correlation: 1.0,
        avg_primary_latency_ms: 200.0,
        avg_candidate_latency_ms: 50.0,
        passed: true,
    };
    assert_eq!(report.latency_improvement_pct(), 75.0);

    let zero = ComparisonReport {
        avg_primary_latency_ms: 0.0,
        ..report
    };
    assert_eq!(zero.latency_improvement_pct(), 0.0);
}
