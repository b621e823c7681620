//! Reciprocal Rank Fusion
//!
//! Rank-based combination of the vector and keyword result lists:
//! RRF(d) = w_v/(k + rank_v) + w_k/(k + rank_k), with documents missing from
//! a list contributing nothing from that side. Deterministic given identical
//! inputs; ties broken by chunk id.

use std::collections::HashMap;

/// A document's fused score plus its per-list provenance
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: String,
    pub rrf_score: f64,
    pub vector_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub vector_score: f64,
    pub keyword_score: f64,
}

/// Fuse two ranked lists of (chunk_id, raw_score), most relevant first.
///
/// Ranks are 1-indexed. `k` dampens the contribution of lower ranks; 60 is
/// the standard constant.
pub fn rrf_fuse(
    vector_results: &[(String, f64)],
    keyword_results: &[(String, f64)],
    k: f64,
    vector_weight: f64,
    keyword_weight: f64,
) -> Vec<FusedHit> {
    let mut fused: HashMap<String, FusedHit> = HashMap::new();

    for (rank0, (chunk_id, score)) in vector_results.iter().enumerate() {
        let rank = rank0 + 1;
        let entry = fused.entry(chunk_id.clone()).or_insert_with(|| FusedHit {
            chunk_id: chunk_id.clone(),
            rrf_score: 0.0,
            vector_rank: None,
            keyword_rank: None,
            vector_score: 0.0,
            keyword_score: 0.0,
        });
        entry.rrf_score += vector_weight / (k + rank as f64);
        entry.vector_rank = Some(rank);
        entry.vector_score = *score;
    }

    for (rank0, (chunk_id, score)) in keyword_results.iter().enumerate() {
        let rank = rank0 + 1;
        let entry = fused.entry(chunk_id.clone()).or_insert_with(|| FusedHit {
            chunk_id: chunk_id.clone(),
            rrf_score: 0.0,
            vector_rank: None,
            keyword_rank: None,
            vector_score: 0.0,
            keyword_score: 0.0,
        });
        entry.rrf_score += keyword_weight / (k + rank as f64);
        entry.keyword_rank = Some(rank);
        entry.keyword_score = *score;
    }

    let mut hits: Vec<FusedHit> = fused.into_values().collect();
    hits.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(hits: &[FusedHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk_id.as_str()).collect()
    }

    fn list(items: &[&str]) -> Vec<(String, f64)> {
        items
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), 1.0 - i as f64 * 0.1))
            .collect()
    }

    #[test]
    fn test_document_in_both_lists_wins() {
        let fused = rrf_fuse(&list(&["a", "b", "c"]), &list(&["c", "b", "a"]), 60.0, 1.0, 1.0);
        // "b" is rank 2 in both: 2/62; "a" and "c" get 1/61 + 1/63
        assert_eq!(fused.len(), 3);
        let score_b = fused.iter().find(|h| h.chunk_id == "b").unwrap().rrf_score;
        assert!((score_b - 2.0 / 62.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_list_contribution() {
        let fused = rrf_fuse(&list(&["a"]), &[], 60.0, 1.0, 1.0);
        assert_eq!(fused[0].rrf_score, 1.0 / 61.0);
        assert_eq!(fused[0].vector_rank, Some(1));
        assert_eq!(fused[0].keyword_rank, None);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let fused = rrf_fuse(&list(&["v"]), &list(&["k"]), 60.0, 2.0, 1.0);
        assert_eq!(ids(&fused), vec!["v", "k"]);
    }

    #[test]
    fn test_tie_break_by_chunk_id_is_deterministic() {
        let fused = rrf_fuse(&list(&["b"]), &list(&["a"]), 60.0, 1.0, 1.0);
        assert_eq!(ids(&fused), vec!["a", "b"]);
    }

    #[test]
    fn test_raw_scores_carried_through() {
        let fused = rrf_fuse(
            &[("a".to_string(), 0.87)],
            &[("a".to_string(), 4.2)],
            60.0,
            1.0,
            1.0,
        );
        assert_eq!(fused[0].vector_score, 0.87);
        assert_eq!(fused[0].keyword_score, 4.2);
    }

    proptest! {
        /// Promoting a document to a better rank in one list never lowers
        /// its fused score.
        #[test]
        fn prop_rrf_monotone_in_rank(rank_a in 0usize..20, rank_b in 0usize..20) {
            let better = rank_a.min(rank_b);
            let worse = rank_a.max(rank_b);

            let make_list = |target_rank: usize| -> Vec<(String, f64)> {
                (0..=worse)
                    .map(|i| {
                        let id = if i == target_rank { "target" } else { "x" };
                        (format!("{}{}", id, i), 1.0)
                    })
                    .collect()
            };

            let keyword = list(&["k1", "k2"]);
            let fused_better = rrf_fuse(&make_list(better), &keyword, 60.0, 1.0, 1.0);
            let fused_worse = rrf_fuse(&make_list(worse), &keyword, 60.0, 1.0, 1.0);

            let score_at = |hits: &[FusedHit], rank: usize| {
                hits.iter()
                    .find(|h| h.chunk_id == format!("target{}", rank))
                    .map(|h| h.rrf_score)
                    .unwrap_or(0.0)
            };

            prop_assert!(score_at(&fused_better, better) >= score_at(&fused_worse, worse));
        }
    }
}
