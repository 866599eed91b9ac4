//! Candidate inclusion predicates.
//!
//! A candidate that made it through aggregation still has to earn its
//! place: the germline predicate stages its rules by depth and variant
//! class, the somatic predicate runs a stricter strand-bias ladder and a
//! VAF floor, and the threshold predicate is a plain observation count for
//! permissive re-genotyping runs.

use crate::basics::variant::Variant;
use crate::core::maths::{beta_tail_probability, median};
use crate::scanner::cigar_scanner::{SampleObservation, VariantObservation};

/// How candidate admission is decided.
#[derive(Debug, Clone)]
pub enum InclusionPolicy {
    /// The staged germline rules.
    Germline,
    /// Somatic rules for tumor samples; the normal sample (when named)
    /// falls back to the germline rules.
    Somatic {
        normal_sample: Option<usize>,
        min_expected_vaf: f64,
    },
    /// Admit anything with at least this many supporting observations.
    Threshold { min_observations: usize },
}

impl InclusionPolicy {
    pub fn include(&self, observation: &VariantObservation) -> bool {
        match self {
            InclusionPolicy::Germline => {
                observation
                    .samples
                    .iter()
                    .any(|s| is_good_germline(&observation.variant, s))
                    || (observation.samples.len() > 1 && is_good_germline_pooled(observation))
            }
            InclusionPolicy::Somatic {
                normal_sample,
                min_expected_vaf,
            } => observation.samples.iter().any(|s| {
                if Some(s.sample_index) == *normal_sample {
                    is_good_germline(&observation.variant, s)
                } else {
                    is_good_somatic(&observation.variant, s, *min_expected_vaf)
                }
            }),
            InclusionPolicy::Threshold { min_observations } => {
                observation
                    .samples
                    .iter()
                    .map(|s| s.observed_base_qualities.len())
                    .sum::<usize>()
                    >= *min_observations
            }
        }
    }
}

fn sum(observed_qualities: &[u32]) -> u64 {
    observed_qualities.iter().map(|&q| q as u64).sum()
}

fn erase_below(observed_qualities: &mut Vec<u32>, min: u32) {
    observed_qualities.retain(|&q| q >= min);
}

fn is_completely_strand_biased(forward: u32, reverse: u32) -> bool {
    let support = forward + reverse;
    support > 0 && (forward == 0 || forward == support)
}

fn is_almost_completely_strand_biased(forward: u32, reverse: u32) -> bool {
    let support = forward + reverse;
    support > 0 && (forward <= 1 || forward >= support.saturating_sub(1))
}

fn is_strand_biased(forward: u32, reverse: u32, tail_mass: f64) -> bool {
    beta_tail_probability(forward as f64 + 0.5, reverse as f64 + 0.5, tail_mass) >= 0.99
}

fn is_strongly_strand_biased(forward: u32, reverse: u32) -> bool {
    is_strand_biased(forward, reverse, 0.01)
}

#[allow(dead_code)]
fn is_weakly_strand_biased(forward: u32, reverse: u32) -> bool {
    is_strand_biased(forward, reverse, 0.05)
}

/// A run-through artifact: plenty of observations, all on one strand, with
/// poor median base quality.
fn is_likely_runthrough_artifact(
    forward_support: u32,
    reverse_support: u32,
    observed_qualities: &[u32],
) -> bool {
    let num_observations = forward_support + reverse_support;
    if num_observations < 10 || !is_completely_strand_biased(forward_support, reverse_support) {
        return false;
    }
    median(observed_qualities) < 15.0
}

fn is_good_germline(variant: &Variant, observation: &SampleObservation) -> bool {
    is_good_germline_parts(
        variant,
        observation.depth,
        observation.forward_depth,
        observation.forward_support,
        observation.observed_base_qualities.clone(),
    )
}

fn is_good_germline_parts(
    variant: &Variant,
    depth: u32,
    forward_depth: u32,
    forward_support: u32,
    mut observed_qualities: Vec<u32>,
) -> bool {
    let support = observed_qualities.len() as u32;
    if depth < 4 {
        return support > 1 || sum(&observed_qualities) >= 30 || variant.is_deletion();
    }
    let reverse_depth = depth.saturating_sub(forward_depth);
    let reverse_support = support.saturating_sub(forward_support);
    if support > 20
        && forward_depth.min(reverse_depth) > 1
        && is_completely_strand_biased(forward_support, reverse_support)
    {
        return false;
    }
    if variant.is_snv() {
        if is_likely_runthrough_artifact(forward_support, reverse_support, &observed_qualities) {
            return false;
        }
        erase_below(&mut observed_qualities, 20);
        if depth <= 10 {
            return observed_qualities.len() > 1;
        }
        observed_qualities.len() > 2 && observed_qualities.len() as f64 / depth as f64 > 0.1
    } else if variant.is_insertion() {
        let alt_len = variant.alt_sequence_len();
        if support == 1 && alt_len > 10 {
            return false;
        }
        if depth < 10 {
            support > 1 || (alt_len > 3 && variant.alt_allele().is_tandem_repeat(4))
        } else if depth <= 30 {
            support > 1
        } else if depth <= 60 {
            if support == 1 {
                return false;
            }
            if support as f64 / depth as f64 > 0.3 {
                return true;
            }
            erase_below(&mut observed_qualities, 25);
            if observed_qualities.len() <= 1 {
                return false;
            }
            if observed_qualities.len() > 2 {
                return true;
            }
            observed_qualities.sort_unstable_by(|a, b| b.cmp(a));
            observed_qualities[0] as f64 / alt_len as f64 > 20.0
        } else {
            if support == 1 {
                return false;
            }
            if support as f64 / depth as f64 > 0.35 {
                return true;
            }
            erase_below(&mut observed_qualities, 20);
            if observed_qualities.len() <= 1 {
                return false;
            }
            if observed_qualities.len() > 3 {
                return true;
            }
            observed_qualities.sort_unstable_by(|a, b| b.cmp(a));
            observed_qualities[0] as f64 / alt_len as f64 > 20.0
        }
    } else {
        // deletion or MNV
        if variant.region().size() < 10 {
            support > 1 && support as f64 / depth as f64 > 0.05
        } else {
            support as f64 / (depth as f64 - (depth as f64).sqrt()) > 0.1
        }
    }
}

fn is_good_germline_pooled(observation: &VariantObservation) -> bool {
    let forward_depth: u32 = observation.samples.iter().map(|s| s.forward_depth).sum();
    let forward_support: u32 = observation.samples.iter().map(|s| s.forward_support).sum();
    let mut qualities = Vec::new();
    for sample in &observation.samples {
        qualities.extend_from_slice(&sample.observed_base_qualities);
    }
    is_good_germline_parts(
        &observation.variant,
        observation.total_depth,
        forward_depth,
        forward_support,
        qualities,
    )
}

fn is_good_somatic(
    variant: &Variant,
    observation: &SampleObservation,
    min_expected_vaf: f64,
) -> bool {
    let depth = observation.depth;
    if depth == 0 {
        return false;
    }
    let mut observed_qualities = observation.observed_base_qualities.clone();
    let support = observed_qualities.len() as u32;
    let forward_support = observation.forward_support;
    let reverse_support = support.saturating_sub(forward_support);
    if support > 15 && is_completely_strand_biased(forward_support, reverse_support) {
        return false;
    }
    if support > 25 && is_almost_completely_strand_biased(forward_support, reverse_support) {
        return false;
    }
    if support > 50 && is_strongly_strand_biased(forward_support, reverse_support) {
        return false;
    }
    let adjusted_depth = depth - ((depth as f64).sqrt() as u32).min(depth.saturating_sub(1));
    let approx_vaf = support as f64 / adjusted_depth.max(1) as f64;
    if variant.is_snv() {
        if is_likely_runthrough_artifact(forward_support, reverse_support, &observed_qualities) {
            return false;
        }
        erase_below(&mut observed_qualities, 15);
        if observed_qualities.len() >= 2
            && approx_vaf >= min_expected_vaf
            && observation.edge_support < support
        {
            approx_vaf >= 0.01 || !is_completely_strand_biased(forward_support, reverse_support)
        } else {
            false
        }
    } else if variant.is_insertion() {
        let alt_len = variant.alt_sequence_len();
        if support == 1 && alt_len > 8 {
            return false;
        }
        erase_below(&mut observed_qualities, 15);
        if alt_len < 10 {
            observed_qualities.len() >= 2 && approx_vaf >= min_expected_vaf
        } else {
            observed_qualities.len() >= 2 && approx_vaf >= min_expected_vaf / 3.0
        }
    } else {
        // deletion or MNV
        if variant.region().size() < 10 {
            support > 1 && approx_vaf >= min_expected_vaf
        } else {
            approx_vaf >= min_expected_vaf / 3.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::region::GenomeRegion;

    fn snv() -> Variant {
        Variant::from_parts(GenomeRegion::new("chr1", 100, 101), *b"G", *b"A")
    }

    fn observation(
        variant: Variant,
        depth: u32,
        forward_depth: u32,
        qualities: Vec<u32>,
        forward_support: u32,
    ) -> VariantObservation {
        VariantObservation {
            variant,
            total_depth: depth,
            samples: vec![SampleObservation {
                sample_index: 0,
                depth,
                forward_depth,
                observed_base_qualities: qualities,
                observed_mapping_qualities: vec![60; 4],
                forward_support,
                edge_support: 0,
            }],
        }
    }

    #[test]
    fn balanced_well_supported_snv_is_admitted() {
        let obs = observation(snv(), 20, 10, vec![35; 10], 5);
        assert!(InclusionPolicy::Germline.include(&obs));
    }

    #[test]
    fn singleton_low_quality_snv_is_rejected() {
        let obs = observation(snv(), 20, 10, vec![12], 1);
        assert!(!InclusionPolicy::Germline.include(&obs));
    }

    #[test]
    fn low_depth_deletion_is_admitted() {
        let del = Variant::from_parts(GenomeRegion::new("chr1", 100, 105), *b"GGGGG", *b"");
        let obs = observation(del, 3, 2, vec![0], 1);
        assert!(InclusionPolicy::Germline.include(&obs));
    }

    #[test]
    fn completely_biased_strong_support_is_rejected() {
        // 30 forward supports out of 30, with both strands well covered
        let obs = observation(snv(), 60, 30, vec![35; 30], 30);
        assert!(!InclusionPolicy::Germline.include(&obs));
    }

    #[test]
    fn runthrough_artifact_is_rejected() {
        // one-sided and poor quality
        let obs = observation(snv(), 15, 12, vec![10; 12], 12);
        assert!(!InclusionPolicy::Germline.include(&obs));
    }

    #[test]
    fn somatic_low_vaf_needs_the_floor() {
        let policy = InclusionPolicy::Somatic {
            normal_sample: None,
            min_expected_vaf: 0.05,
        };
        let strong = observation(snv(), 100, 50, vec![35; 10], 5);
        assert!(policy.include(&strong));
        let weak = observation(snv(), 100, 50, vec![35; 2], 1);
        assert!(!policy.include(&weak));
    }

    #[test]
    fn somatic_bias_ladder_rejects_one_sided_support() {
        let policy = InclusionPolicy::Somatic {
            normal_sample: None,
            min_expected_vaf: 0.01,
        };
        let biased = observation(snv(), 100, 50, vec![35; 20], 20);
        assert!(!policy.include(&biased));
    }

    #[test]
    fn threshold_policy_counts_observations() {
        let policy = InclusionPolicy::Threshold { min_observations: 3 };
        assert!(policy.include(&observation(snv(), 10, 5, vec![30; 3], 2)));
        assert!(!policy.include(&observation(snv(), 10, 5, vec![30; 2], 1)));
    }
}
