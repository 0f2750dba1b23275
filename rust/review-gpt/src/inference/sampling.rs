//! Sampling utilities for generation.
//!
//! Top-k truncation, temperature scaling, softmax over the surviving candidates,
//! and a weighted draw among just those candidates.

use std::cmp::Ordering;

use rand::Rng;

/// Ids of the `k` highest logits, best first.
///
/// NaN logits rank below every real value. Ties keep the lower id first. `k` is
/// clamped to the logits length.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn top_k_candidates(logits: &[f32], k: usize) -> Vec<u32> {
    let rank = |v: f32| if v.is_nan() { f32::NEG_INFINITY } else { v };

    let mut idx = (0..logits.len()).collect::<Vec<_>>();
    idx.sort_by(|&a, &b| {
        rank(logits[b])
            .partial_cmp(&rank(logits[a]))
            .unwrap_or(Ordering::Equal)
    });
    idx.truncate(k.min(logits.len()));
    idx.into_iter().map(|i| i as u32).collect()
}

/// Draw one id from `candidates`, weighted by the softmax of their logits.
///
/// Candidates past the end of `logits` get no probability mass. Falls back to
/// the first candidate when no candidate has a finite logit. Returns 0 for an
/// empty candidate list.
#[must_use]
pub fn sample_from_candidates(
    logits: &[f32],
    candidates: &[u32],
    temperature: f32,
    rng: &mut impl Rng,
) -> u32 {
    let Some(&best) = candidates.first() else {
        return 0;
    };

    let mut scores = candidates
        .iter()
        .map(|&id| logits.get(id as usize).copied().unwrap_or(f32::NEG_INFINITY))
        .collect::<Vec<_>>();

    if (temperature - 1.0).abs() > 1e-6 {
        for v in &mut scores {
            *v /= temperature;
        }
    }

    let probs = softmax(&scores);
    if probs.iter().all(|p| *p == 0.0) {
        return best;
    }

    candidates[sample_multinomial(&probs, rng)]
}

/// Top-k sampling: restrict to the `k` best logits, normalise, draw one.
#[must_use]
pub fn sample_top_k(logits: &[f32], k: usize, temperature: f32, rng: &mut impl Rng) -> u32 {
    let candidates = top_k_candidates(logits, k);
    sample_from_candidates(logits, &candidates, temperature, rng)
}

/// Numerically stable softmax; non-finite entries get probability zero.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);

    if !max_logit.is_finite() {
        return vec![0.0; logits.len()];
    }

    let mut exps = Vec::with_capacity(logits.len());
    let mut sum = 0.0_f32;
    for &v in logits {
        let e = if v.is_finite() {
            (v - max_logit).exp()
        } else {
            0.0
        };
        sum += e;
        exps.push(e);
    }

    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }

    exps.into_iter().map(|e| e / sum).collect()
}

#[must_use]
fn sample_multinomial(probs: &[f32], rng: &mut impl Rng) -> usize {
    let r: f32 = rng.r#gen();
    let mut cum = 0.0_f32;
    for (idx, &p) in probs.iter().enumerate() {
        cum += p;
        if r < cum {
            return idx;
        }
    }
    // Rounding can leave cum just below r: take the last candidate with mass.
    probs.iter().rposition(|p| *p > 0.0).unwrap_or(0)
}
