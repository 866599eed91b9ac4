//! Log-space numerics shared across the inference models.
//!
//! Everything downstream of the pair-HMM works in natural-log space; this
//! module holds the conversions between phred, probability and log
//! probability, the log-sum-exp reductions and the handful of distribution
//! tails (Poisson survival for the misalignment test, Beta tails for strand
//! bias) that the candidate scanner needs.

use serde::Serialize;
use statrs::distribution::{Beta, ContinuousCDF, DiscreteCDF, Poisson};

/// ln(10) / 10, the factor converting phred to natural-log error probability.
pub const LN10_DIV_10: f64 = std::f64::consts::LN_10 / 10.0;

/// A quality on the phred scale: `-10 log10(error probability)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Phred(f64);

impl Phred {
    pub fn new(score: f64) -> Self {
        Phred(score.max(0.0))
    }

    /// Largest score emitted; keeps infinities out of output records.
    pub const MAX: f64 = 3_000.0;

    /// Phred score of the given error probability.
    pub fn from_error_probability(error: f64) -> Self {
        if error <= 0.0 {
            Phred(Self::MAX)
        } else {
            Phred((-10.0 * error.log10()).clamp(0.0, Self::MAX))
        }
    }

    pub fn score(self) -> f64 {
        self.0
    }

    /// The error probability this score encodes: `10^(-q/10)`.
    pub fn error_probability(self) -> f64 {
        10f64.powf(-self.0 / 10.0)
    }

    /// The complement of [`error_probability`](Self::error_probability).
    pub fn probability_true(self) -> f64 {
        1.0 - self.error_probability()
    }
}

/// Phred score of an event given the probability it did NOT occur.
#[inline]
pub fn probability_to_phred(not_probability: f64) -> Phred {
    Phred::from_error_probability(not_probability.max(0.0))
}

/// Natural-log probability that a base with this quality was read correctly.
#[inline]
pub fn ln_probability_correct(base_quality: u8) -> f64 {
    let e = phred_to_probability_wrong(base_quality as f64);
    (1.0 - e).ln()
}

/// `10^(-q/10)` for a raw phred value.
#[inline]
pub fn phred_to_probability_wrong(quality: f64) -> f64 {
    10f64.powf(-quality / 10.0)
}

/// Numerically stable `ln(e^a + e^b)`.
#[inline]
pub fn log_sum_exp2(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if hi == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        hi + (lo - hi).exp().ln_1p()
    }
}

/// Numerically stable `ln(sum_i e^(x_i))`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// `ln P(X > k)` for `X ~ Poisson(mu)`.
///
/// Used once per read by the misalignment test, so the plain `statrs`
/// survival function is fine; underflow falls back to the leading term of
/// the tail series.
pub fn log_poisson_sf(k: u32, mu: f64) -> f64 {
    if mu <= 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    match Poisson::new(mu) {
        Ok(dist) => {
            let sf = dist.sf(k as u64);
            if sf > 0.0 {
                sf.ln()
            } else {
                // ln pmf(k + 1) = -mu + (k+1) ln mu - ln (k+1)!
                let kp1 = (k + 1) as f64;
                -mu + kp1 * mu.ln() - ln_factorial(k + 1)
            }
        }
        Err(_) => f64::NEG_INFINITY,
    }
}

fn ln_factorial(n: u32) -> f64 {
    (1..=n).map(|i| (i as f64).ln()).sum()
}

/// Mass of `Beta(alpha, beta)` within `tail_mass` of either extreme.
///
/// A value near 1 means the distribution is concentrated at 0 or 1, which
/// for strand counts means near-total strand bias.
pub fn beta_tail_probability(alpha: f64, beta: f64, tail_mass: f64) -> f64 {
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.cdf(tail_mass) + (1.0 - dist.cdf(1.0 - tail_mass)),
        Err(_) => 0.0,
    }
}

/// Median of an unsorted sample.
pub fn median(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Multiset coefficient `C(n + k - 1, k)`: the number of genotypes of
/// ploidy `k` over `n` haplotypes.
pub fn num_multisets(n: usize, k: usize) -> usize {
    if n == 0 {
        return if k == 0 { 1 } else { 0 };
    }
    let mut result = 1usize;
    for i in 0..k {
        result = result * (n + i) / (i + 1);
    }
    result
}
