//! Hybrid score fusion.

use std::collections::HashMap;

use crate::dense::DenseHit;
use crate::sparse::SparseHit;

/// Fuses dense and sparse candidate lists:
/// `S(p) = alpha * dense(p) + (1 - alpha) / sparse(p)`, where a point
/// absent from one list contributes 0 for that term. The result is sorted
/// by descending fused score with ties broken by ascending point id, so the
/// ordering is deterministic for fixed inputs.
pub fn fuse_scores(dense: &[DenseHit], sparse: &[SparseHit], alpha: f32) -> Vec<(u64, f32)> {
    let mut scores: HashMap<u64, f32> = HashMap::new();
    for hit in dense {
        *scores.entry(hit.point_id).or_insert(0.0) += alpha * hit.score;
    }
    for hit in sparse {
        if hit.score > 0.0 {
            *scores.entry(hit.point_id).or_insert(0.0) += (1.0 - alpha) / hit.score;
        }
    }

    let mut fused: Vec<(u64, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_fusion_example() {
        // A: d=0.9, s=2.0; B: d=0.5, s=1.0; alpha=0.25
        // S(A) = 0.225 + 0.375 = 0.600; S(B) = 0.125 + 0.750 = 0.875
        let dense = [
            DenseHit {
                point_id: 1,
                score: 0.9,
            },
            DenseHit {
                point_id: 2,
                score: 0.5,
            },
        ];
        let sparse = [
            SparseHit {
                point_id: 1,
                score: 2.0,
            },
            SparseHit {
                point_id: 2,
                score: 1.0,
            },
        ];
        let fused = fuse_scores(&dense, &sparse, 0.25);
        assert_eq!(fused[0].0, 2);
        assert!((fused[0].1 - 0.875).abs() < 1e-6);
        assert_eq!(fused[1].0, 1);
        assert!((fused[1].1 - 0.600).abs() < 1e-6);
    }

    #[test]
    fn absent_terms_contribute_zero() {
        let dense = [DenseHit {
            point_id: 1,
            score: 0.8,
        }];
        let sparse = [SparseHit {
            point_id: 2,
            score: 0.5,
        }];
        let fused = fuse_scores(&dense, &sparse, 0.25);
        // B: (1-0.25)/0.5 = 1.5; A: 0.25*0.8 = 0.2
        assert_eq!(fused[0], (2, 1.5));
        assert!((fused[1].1 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_tie_break_by_ascending_id() {
        let dense = [
            DenseHit {
                point_id: 9,
                score: 0.4,
            },
            DenseHit {
                point_id: 3,
                score: 0.4,
            },
        ];
        let fused = fuse_scores(&dense, &[], 0.5);
        assert_eq!(fused[0].0, 3);
        assert_eq!(fused[1].0, 9);
    }
}
