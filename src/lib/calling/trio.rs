//! Joint trio inference.
//!
//! Scores every eligible (maternal, paternal, child) genotype triple with
//! germline priors for the parents, the de-novo transition for the child
//! and the per-sample read likelihoods, normalises to a joint posterior
//! table, and marginalises to per-sample genotype and per-haplotype
//! posteriors. When the triple space exceeds `max_joint_genotypes` an
//! independent proposal (per-slot marginal evidences) selects the triples
//! that are evaluated exactly.

use crate::basics::read::AlignedRead;
use crate::core::errors::{CallerError, Result};
use crate::core::maths::{log_sum_exp, log_sum_exp2};
use crate::haplotype::genotype::{inverse_table, Genotype};
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use crate::models::denovo::DeNovoModel;
use crate::models::likelihood::{HaplotypeLikelihoods, ReadId};
use crate::models::priors::PriorModel;

pub const DEFAULT_MAX_JOINT_GENOTYPES: usize = 1_000_000;

/// Prior probability that the configured-ploidy model is the right one,
/// against the dummy higher-ploidy model.
const NORMAL_MODEL_PRIOR: f64 = 1.0 - 1e-7;

/// Sample identifiers for a trio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trio {
    pub mother: String,
    pub father: String,
    pub child: String,
}

/// One entry of the joint posterior table; indices refer to the shared
/// genotype list.
#[derive(Debug, Clone, Copy)]
pub struct JointProbability {
    pub maternal: usize,
    pub paternal: usize,
    pub child: usize,
    pub probability: f64,
}

#[derive(Debug)]
pub struct TrioLatents {
    pub genotypes: Vec<Genotype>,
    pub joint: Vec<JointProbability>,
    pub log_evidence: f64,
    pub marginal_maternal: Vec<f64>,
    pub marginal_paternal: Vec<f64>,
    pub marginal_child: Vec<f64>,
    /// `(haplotype, posterior that at least one sample carries it)`.
    pub haplotype_posteriors: Vec<(HaplotypeId, f64)>,
}

pub struct TrioModelOptions {
    pub max_joint_genotypes: usize,
}

impl Default for TrioModelOptions {
    fn default() -> Self {
        TrioModelOptions {
            max_joint_genotypes: DEFAULT_MAX_JOINT_GENOTYPES,
        }
    }
}

/// Per-sample reads, ids assigned by the driver.
pub type SampleReads = Vec<(ReadId, AlignedRead)>;

pub struct TrioModel<'a> {
    pub arena: &'a HaplotypeArena,
    pub priors: &'a mut PriorModel,
    pub denovo: &'a mut DeNovoModel,
    pub likelihoods: &'a mut HaplotypeLikelihoods,
    pub options: TrioModelOptions,
}

impl<'a> TrioModel<'a> {
    /// Evaluate the joint posterior over genotype triples. All three
    /// samples share the genotype list (equal ploidies are enforced at
    /// configuration time).
    pub fn evaluate(
        &mut self,
        genotypes: &[Genotype],
        maternal_reads: &SampleReads,
        paternal_reads: &SampleReads,
        child_reads: &SampleReads,
    ) -> Result<(Vec<JointProbability>, f64)> {
        if genotypes.is_empty() {
            return Err(CallerError::Numeric(
                "trio model invoked with no genotypes".to_string(),
            ));
        }
        let priors = self.priors.log_priors(genotypes, self.arena);
        let maternal_lls =
            self.likelihoods
                .per_genotype_log_likelihoods(maternal_reads, genotypes, self.arena);
        let paternal_lls =
            self.likelihoods
                .per_genotype_log_likelihoods(paternal_reads, genotypes, self.arena);
        let child_lls =
            self.likelihoods
                .per_genotype_log_likelihoods(child_reads, genotypes, self.arena);

        let n = genotypes.len();
        let total = n.saturating_mul(n).saturating_mul(n);
        let slots: Vec<usize> = if total > self.options.max_joint_genotypes {
            let per_slot = (self.options.max_joint_genotypes as f64)
                .cbrt()
                .floor()
                .max(1.0) as usize;
            log::debug!(
                "pruning joint genotype space {}^3 to {}^3 by independent proposal",
                n,
                per_slot
            );
            top_indices_by(
                n,
                per_slot,
                |i| priors[i] + maternal_lls[i] + paternal_lls[i] + child_lls[i],
            )
        } else {
            (0..n).collect()
        };

        let mut scored: Vec<(usize, usize, usize, f64)> = Vec::new();
        for &m in &slots {
            for &p in &slots {
                for &c in &slots {
                    let transition = self.denovo.log_genotype_transition(
                        &genotypes[c],
                        &genotypes[m],
                        &genotypes[p],
                        self.arena,
                    );
                    let score = priors[m]
                        + priors[p]
                        + transition
                        + maternal_lls[m]
                        + paternal_lls[p]
                        + child_lls[c];
                    if score.is_nan() {
                        return Err(CallerError::Numeric(format!(
                            "non-finite joint score for triple ({}, {}, {})",
                            m, p, c
                        )));
                    }
                    scored.push((m, p, c, score));
                }
            }
        }

        let log_evidence = log_sum_exp(
            &scored.iter().map(|&(_, _, _, s)| s).collect::<Vec<f64>>(),
        );
        if !log_evidence.is_finite() {
            return Err(CallerError::Numeric(
                "trio joint evidence underflowed".to_string(),
            ));
        }
        let joint = scored
            .into_iter()
            .map(|(m, p, c, score)| JointProbability {
                maternal: m,
                paternal: p,
                child: c,
                probability: (score - log_evidence).exp(),
            })
            .collect();
        Ok((joint, log_evidence))
    }

    /// Full inference: the joint table plus every marginal the call
    /// extractor needs.
    pub fn infer(
        &mut self,
        haplotypes: &[HaplotypeId],
        genotypes: Vec<Genotype>,
        maternal_reads: &SampleReads,
        paternal_reads: &SampleReads,
        child_reads: &SampleReads,
    ) -> Result<TrioLatents> {
        let (joint, log_evidence) =
            self.evaluate(&genotypes, maternal_reads, paternal_reads, child_reads)?;
        let marginal_maternal = marginalise(&genotypes, &joint, |jp| jp.maternal);
        let marginal_paternal = marginalise(&genotypes, &joint, |jp| jp.paternal);
        let marginal_child = marginalise(&genotypes, &joint, |jp| jp.child);
        let haplotype_posteriors = haplotype_posteriors(
            haplotypes,
            &genotypes,
            &[&marginal_maternal, &marginal_paternal, &marginal_child],
        );
        Ok(TrioLatents {
            genotypes,
            joint,
            log_evidence,
            marginal_maternal,
            marginal_paternal,
            marginal_child,
            haplotype_posteriors,
        })
    }
}

/// Sum joint probabilities over all but one slot.
pub fn marginalise(
    genotypes: &[Genotype],
    joint: &[JointProbability],
    slot: impl Fn(&JointProbability) -> usize,
) -> Vec<f64> {
    let mut result = vec![0.0; genotypes.len()];
    for jp in joint {
        result[slot(jp)] += jp.probability;
    }
    result
}

/// Per-haplotype posterior: one minus the probability that no sample
/// carries the haplotype, computed through the inverse genotype table.
pub fn haplotype_posteriors(
    haplotypes: &[HaplotypeId],
    genotypes: &[Genotype],
    sample_marginals: &[&Vec<f64>],
) -> Vec<(HaplotypeId, f64)> {
    let table = inverse_table(haplotypes, genotypes);
    let all_indices: Vec<usize> = (0..genotypes.len()).collect();
    haplotypes
        .iter()
        .zip(table.iter())
        .map(|(&haplotype, containing)| {
            let noncontaining: Vec<usize> = all_indices
                .iter()
                .copied()
                .filter(|i| containing.binary_search(i).is_err())
                .collect();
            let mut prob_not_observed = 1.0;
            for marginal in sample_marginals {
                prob_not_observed *= noncontaining.iter().map(|&i| marginal[i]).sum::<f64>();
            }
            (haplotype, 1.0 - prob_not_observed)
        })
        .collect()
}

/// Probability the configured-ploidy model explains the data better than a
/// dummy model with one extra haplotype copy.
pub fn model_posterior(normal_log_evidence: f64, dummy_log_evidence: f64) -> f64 {
    let normal = NORMAL_MODEL_PRIOR.ln() + normal_log_evidence;
    let dummy = (1.0 - NORMAL_MODEL_PRIOR).ln() + dummy_log_evidence;
    (normal - log_sum_exp2(normal, dummy)).exp()
}

/// Indices of the `k` best-scoring slots.
fn top_indices_by(n: usize, k: usize, score: impl Fn(usize) -> f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices.truncate(k.max(1));
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::allele::Allele;
    use crate::basics::read::{CigarOp, CigarOpKind, ReadFlags};
    use crate::basics::region::GenomeRegion;
    use crate::haplotype::genotype::generate_all_genotypes;
    use crate::haplotype::haplotype::Haplotype;
    use crate::models::indel_error::IndelErrorModel;

    const REF: &[u8] = b"ACGTACGTACGTACGT";

    fn window() -> GenomeRegion {
        GenomeRegion::new("chr1", 100, 116)
    }

    fn read_matching(sequence: &[u8], begin: u64, id: u32) -> (ReadId, AlignedRead) {
        (
            ReadId(id),
            AlignedRead::new(
                format!("r{}", id),
                "chr1",
                begin,
                sequence.to_vec(),
                vec![35; sequence.len()],
                60,
                vec![CigarOp::new(
                    CigarOpKind::AlignmentMatch,
                    sequence.len() as u32,
                )],
                ReadFlags::default(),
                None,
            )
            .unwrap(),
        )
    }

    struct Fixture {
        arena: HaplotypeArena,
        reference: HaplotypeId,
        alt: HaplotypeId,
    }

    fn fixture() -> Fixture {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let snv = Allele::new(GenomeRegion::new("chr1", 105, 106), *b"T");
        let alt = arena.intern(Haplotype::new(window(), vec![snv], REF).unwrap());
        Fixture {
            arena,
            reference,
            alt,
        }
    }

    fn reads_for(arena: &HaplotypeArena, hap: HaplotypeId, count: u32, id_base: u32) -> SampleReads {
        let sequence = arena.get(hap).sequence().to_vec();
        (0..count)
            .map(|i| read_matching(&sequence, 100, id_base + i))
            .collect()
    }

    #[test]
    fn posteriors_normalise_and_marginals_sum_to_one() {
        let f = fixture();
        let haplotypes = vec![f.reference, f.alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);

        let mut priors = PriorModel::coalescent(1e-3, 1e-4);
        priors.reset(2);
        let mut denovo = DeNovoModel::new(1e-8);
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&f.arena, &haplotypes);

        let maternal = reads_for(&f.arena, f.reference, 6, 0);
        let paternal = reads_for(&f.arena, f.reference, 6, 100);
        let child = reads_for(&f.arena, f.reference, 6, 200);

        let mut model = TrioModel {
            arena: &f.arena,
            priors: &mut priors,
            denovo: &mut denovo,
            likelihoods: &mut likelihoods,
            options: TrioModelOptions::default(),
        };
        let latents = model
            .infer(&haplotypes, genotypes, &maternal, &paternal, &child)
            .unwrap();

        let total: f64 = latents.joint.iter().map(|jp| jp.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for marginal in [
            &latents.marginal_maternal,
            &latents.marginal_paternal,
            &latents.marginal_child,
        ] {
            assert!((marginal.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn hom_ref_reads_give_hom_ref_map() {
        let f = fixture();
        let haplotypes = vec![f.reference, f.alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);
        let hom_ref_index = genotypes
            .iter()
            .position(|g| g == &Genotype::homozygous(f.reference, 2))
            .unwrap();

        let mut priors = PriorModel::coalescent(1e-3, 1e-4);
        priors.reset(2);
        let mut denovo = DeNovoModel::new(1e-8);
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&f.arena, &haplotypes);

        let maternal = reads_for(&f.arena, f.reference, 8, 0);
        let paternal = reads_for(&f.arena, f.reference, 8, 100);
        let child = reads_for(&f.arena, f.reference, 8, 200);

        let mut model = TrioModel {
            arena: &f.arena,
            priors: &mut priors,
            denovo: &mut denovo,
            likelihoods: &mut likelihoods,
            options: TrioModelOptions::default(),
        };
        let latents = model
            .infer(&haplotypes, genotypes, &maternal, &paternal, &child)
            .unwrap();

        let map = latents
            .joint
            .iter()
            .max_by(|a, b| a.probability.partial_cmp(&b.probability).unwrap())
            .unwrap();
        assert_eq!(map.maternal, hom_ref_index);
        assert_eq!(map.paternal, hom_ref_index);
        assert_eq!(map.child, hom_ref_index);

        // the reference haplotype is certainly present, the alt almost
        // certainly absent
        let reference_posterior = latents
            .haplotype_posteriors
            .iter()
            .find(|(h, _)| *h == f.reference)
            .unwrap()
            .1;
        let alt_posterior = latents
            .haplotype_posteriors
            .iter()
            .find(|(h, _)| *h == f.alt)
            .unwrap()
            .1;
        assert!(reference_posterior > 0.99);
        assert!(alt_posterior < 0.5);
    }

    #[test]
    fn haplotype_posterior_identity_holds() {
        let f = fixture();
        let haplotypes = vec![f.reference, f.alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);

        let mut priors = PriorModel::Uniform;
        let mut denovo = DeNovoModel::new(1e-8);
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&f.arena, &haplotypes);

        let maternal = reads_for(&f.arena, f.alt, 4, 0);
        let paternal = reads_for(&f.arena, f.reference, 4, 100);
        let child = reads_for(&f.arena, f.alt, 4, 200);

        let mut model = TrioModel {
            arena: &f.arena,
            priors: &mut priors,
            denovo: &mut denovo,
            likelihoods: &mut likelihoods,
            options: TrioModelOptions::default(),
        };
        let latents = model
            .infer(&haplotypes, genotypes.clone(), &maternal, &paternal, &child)
            .unwrap();

        // verify directly from the joint table
        for (h_index, &haplotype) in [f.reference, f.alt].iter().enumerate() {
            let mut prob_not = 1.0;
            for marginal in [
                &latents.marginal_maternal,
                &latents.marginal_paternal,
                &latents.marginal_child,
            ] {
                let sum: f64 = genotypes
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| !g.contains_id(haplotype))
                    .map(|(i, _)| marginal[i])
                    .sum();
                prob_not *= sum;
            }
            let expected = 1.0 - prob_not;
            let computed = latents.haplotype_posteriors[h_index].1;
            assert!((computed - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn model_posterior_prefers_the_better_evidence() {
        assert!(model_posterior(-10.0, -50.0) > 0.999);
        assert!(model_posterior(-50.0, -10.0) < 0.5);
        let balanced = model_posterior(-10.0, -10.0);
        assert!(balanced > 0.999); // the dummy prior is tiny
    }
}
