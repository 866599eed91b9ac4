//! Pair-HMM read-versus-haplotype likelihood.
//!
//! A three-state (match / read-insertion / read-deletion) affine-gap HMM
//! evaluated with the forward algorithm in natural-log space. Emission
//! probabilities come from the read base qualities (an `N` on either side
//! emits freely); gap-open probabilities come from the context indel error
//! model's per-base penalty vector; the read may align anywhere along the
//! haplotype (free start and end).

use crate::core::maths::{log_sum_exp, log_sum_exp2, LN10_DIV_10};
use crate::models::indel_error::GapPenalties;

#[inline]
fn ln_phred(penalty: u8) -> f64 {
    -(penalty as f64) * LN10_DIV_10
}

/// Emission log-probability of read base `r` with quality `q` against
/// haplotype base `h`.
///
/// The error probability is capped at 3/4 so quality-masked bases (for
/// example soft-clip masking writes quality 0) emit neutrally instead of
/// vetoing matches.
#[inline]
fn ln_emission(r: u8, q: u8, h: u8) -> f64 {
    let e = (ln_phred(q)).exp().min(0.75);
    if r == h || r == b'N' || h == b'N' {
        (1.0 - e).max(f64::MIN_POSITIVE).ln()
    } else {
        (e / 3.0).max(f64::MIN_POSITIVE).ln()
    }
}

/// `ln P(read | haplotype)` under the affine-gap pair-HMM.
///
/// `penalties.open` must have one entry per haplotype base.
pub fn log_likelihood(
    read: &[u8],
    base_qualities: &[u8],
    haplotype: &[u8],
    penalties: &GapPenalties,
) -> f64 {
    debug_assert_eq!(read.len(), base_qualities.len());
    debug_assert_eq!(haplotype.len(), penalties.open.len());
    let n = read.len();
    let m = haplotype.len();
    if n == 0 {
        return 0.0;
    }
    if m == 0 {
        return f64::NEG_INFINITY;
    }

    let ln_extend = ln_phred(penalties.extend);
    let ln_gap_to_match = (1.0 - ln_extend.exp()).max(f64::MIN_POSITIVE).ln();
    // per-haplotype-base transitions out of the match state
    let ln_open: Vec<f64> = penalties.open.iter().map(|&p| ln_phred(p)).collect();
    let ln_match_to_match: Vec<f64> = penalties
        .open
        .iter()
        .map(|&p| {
            let open = ln_phred(p).exp();
            (1.0 - 2.0 * open).max(f64::MIN_POSITIVE).ln()
        })
        .collect();

    let ln_initial = -(m as f64).ln();
    let neg_inf = f64::NEG_INFINITY;

    // rows over the read; columns 0..=m over the haplotype
    let mut match_prev = vec![neg_inf; m + 1];
    let mut insert_prev = vec![neg_inf; m + 1];
    let mut delete_prev = vec![neg_inf; m + 1];
    let mut match_curr = vec![neg_inf; m + 1];
    let mut insert_curr = vec![neg_inf; m + 1];
    let mut delete_curr = vec![neg_inf; m + 1];

    // virtual row 0: the read may start opposite any haplotype base
    for j in 0..=m {
        match_prev[j] = ln_initial;
    }

    for i in 1..=n {
        match_curr[0] = neg_inf;
        insert_curr[0] = neg_inf;
        delete_curr[0] = neg_inf;
        for j in 1..=m {
            let emission = ln_emission(read[i - 1], base_qualities[i - 1], haplotype[j - 1]);
            match_curr[j] = emission
                + log_sum_exp(&[
                    match_prev[j - 1] + ln_match_to_match[j - 1],
                    insert_prev[j - 1] + ln_gap_to_match,
                    delete_prev[j - 1] + ln_gap_to_match,
                ]);
            insert_curr[j] = log_sum_exp2(
                match_prev[j] + ln_open[j - 1],
                insert_prev[j] + ln_extend,
            );
            delete_curr[j] = log_sum_exp2(
                match_curr[j - 1] + ln_open[j - 1],
                delete_curr[j - 1] + ln_extend,
            );
        }
        std::mem::swap(&mut match_prev, &mut match_curr);
        std::mem::swap(&mut insert_prev, &mut insert_curr);
        std::mem::swap(&mut delete_prev, &mut delete_curr);
    }

    // free end: the read may stop opposite any haplotype base
    let mut terms = Vec::with_capacity(2 * m);
    for j in 1..=m {
        terms.push(match_prev[j]);
        terms.push(insert_prev[j]);
    }
    log_sum_exp(&terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_penalties(len: usize) -> GapPenalties {
        GapPenalties {
            open: vec![45; len],
            extend: 3,
        }
    }

    #[test]
    fn perfect_match_scores_near_zero() {
        let hap = b"ACGTACGTACGT";
        let read = b"GTACGT";
        let quals = vec![40u8; read.len()];
        let ll = log_likelihood(read, &quals, hap, &flat_penalties(hap.len()));
        // ln(1/m) for the free start plus per-base (1 - 1e-4) terms
        assert!(ll > -(hap.len() as f64).ln() - 0.1);
        assert!(ll <= 0.0);
    }

    #[test]
    fn mismatch_costs_roughly_base_quality() {
        let hap = b"ACGTACGTACGT";
        let matching = b"GTACGT";
        let mismatching = b"GTCCGT";
        let quals = vec![30u8; matching.len()];
        let penalties = flat_penalties(hap.len());
        let good = log_likelihood(matching, &quals, hap, &penalties);
        let bad = log_likelihood(mismatching, &quals, hap, &penalties);
        let drop = good - bad;
        let expected = 30.0 * LN10_DIV_10 + (3f64).ln();
        assert!((drop - expected).abs() < 0.5, "drop {} expected {}", drop, expected);
    }

    #[test]
    fn n_bases_are_wildcards() {
        let hap = b"ACGTACGT";
        let read = b"GTNC";
        let quals = vec![35u8; read.len()];
        let with_n = log_likelihood(read, &quals, hap, &flat_penalties(hap.len()));
        let exact = log_likelihood(b"GTAC", &quals, hap, &flat_penalties(hap.len()));
        // the N read matches everywhere the exact read does, plus a little
        // extra mass from alignments that only disagreed at the N
        assert!(with_n >= exact);
        assert!((with_n - exact).abs() < 1e-2);
    }

    #[test]
    fn low_open_penalty_softens_gaps() {
        let hap = b"AAAAAAAAAACCCC";
        // read with a one-base deletion relative to the haplotype
        let read = b"AAAAAAAAACCCC";
        let quals = vec![35u8; read.len()];
        let strict = log_likelihood(read, &quals, hap, &flat_penalties(hap.len()));
        let lenient = log_likelihood(
            read,
            &quals,
            hap,
            &GapPenalties {
                open: vec![10; hap.len()],
                extend: 3,
            },
        );
        assert!(lenient > strict);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(
            log_likelihood(b"", &[], b"ACGT", &flat_penalties(4)),
            0.0
        );
        assert_eq!(
            log_likelihood(b"A", &[30], b"", &flat_penalties(0)),
            f64::NEG_INFINITY
        );
    }
}
