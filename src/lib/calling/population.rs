//! Multi-sample germline inference.
//!
//! Cohort calling runs each sample through the individual model under the
//! shared coalescent prior and combines the evidence per allele: the
//! probability no sample carries the allele is the product of the
//! per-sample complements. Exact joint inference over arbitrary cohorts
//! is out of scope; the trio model is the exact joint caller.

use crate::basics::variant::Variant;
use crate::calling::individual::{infer_individual, IndividualLatents};
use crate::calling::trio::SampleReads;
use crate::core::errors::Result;
use crate::core::maths::{probability_to_phred, Phred};
use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use crate::models::likelihood::HaplotypeLikelihoods;
use crate::models::priors::PriorModel;
use crate::pipeline::providers::{CallKind, CallRecord, SampleCall};

#[derive(Debug)]
pub struct PopulationLatents {
    pub samples: Vec<String>,
    pub per_sample: Vec<IndividualLatents>,
}

pub fn infer_population(
    haplotypes: &[HaplotypeId],
    genotypes: &[Genotype],
    samples: &[String],
    reads_per_sample: &[SampleReads],
    priors: &mut PriorModel,
    likelihoods: &mut HaplotypeLikelihoods,
    arena: &HaplotypeArena,
) -> Result<PopulationLatents> {
    debug_assert_eq!(samples.len(), reads_per_sample.len());
    let mut per_sample = Vec::with_capacity(samples.len());
    for reads in reads_per_sample {
        per_sample.push(infer_individual(
            haplotypes,
            genotypes.to_vec(),
            reads,
            priors,
            likelihoods,
            arena,
        )?);
    }
    Ok(PopulationLatents {
        samples: samples.to_vec(),
        per_sample,
    })
}

impl PopulationLatents {
    /// Posterior mass that at least one cohort sample carries the
    /// haplotype; used for cross-window retention.
    pub fn haplotype_posteriors(&self) -> Vec<(HaplotypeId, f64)> {
        let Some(first) = self.per_sample.first() else {
            return Vec::new();
        };
        first
            .haplotype_posteriors
            .iter()
            .enumerate()
            .map(|(h, &(haplotype, _))| {
                let prob_not: f64 = self
                    .per_sample
                    .iter()
                    .map(|latents| 1.0 - latents.haplotype_posteriors[h].1)
                    .product();
                (haplotype, 1.0 - prob_not)
            })
            .collect()
    }
}

/// Cohort call records: one per admitted candidate, with every sample's
/// MAP genotype attached.
pub fn call_population_variants(
    candidates: &[Variant],
    latents: &PopulationLatents,
    arena: &HaplotypeArena,
    min_variant_posterior: Phred,
) -> Vec<CallRecord> {
    let map_genotypes: Vec<&Genotype> = latents
        .per_sample
        .iter()
        .map(|l| &l.genotypes[l.map_genotype_index()])
        .collect();
    let mut records = Vec::new();
    for candidate in candidates {
        let allele = candidate.alt_allele();
        // probability no sample carries the allele
        let prob_none: f64 = latents
            .per_sample
            .iter()
            .map(|l| l.allele_posterior(allele, arena).error_probability())
            .product();
        let posterior = probability_to_phred(prob_none);
        if posterior < min_variant_posterior {
            continue;
        }
        if !map_genotypes
            .iter()
            .any(|g| g.contains_allele(arena, allele))
        {
            continue;
        }
        let samples: Vec<SampleCall> = latents
            .samples
            .iter()
            .zip(latents.per_sample.iter())
            .zip(map_genotypes.iter())
            .map(|((sample, individual), genotype)| {
                let gt_indices: Vec<u8> = genotype
                    .iter()
                    .map(|id| match arena.get(id).copy_sequence(candidate.region()) {
                        Some(seq) if seq == allele.sequence() => 1,
                        _ => 0,
                    })
                    .collect();
                let map_index = individual.map_genotype_index();
                let mass_other: f64 = individual
                    .posteriors
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != map_index)
                    .map(|(_, p)| p)
                    .sum();
                SampleCall {
                    sample: sample.clone(),
                    gt_indices,
                    phased: false,
                    phase_set: None,
                    genotype_quality: probability_to_phred(mass_other).score(),
                }
            })
            .collect();
        records.push(CallRecord {
            kind: CallKind::Germline,
            variant: candidate.clone(),
            posterior,
            depth: 0,
            mapping_quality: 0.0,
            samples,
            info: vec![("PP".to_string(), format!("{:.2}", posterior.score()))],
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::allele::Allele;
    use crate::basics::read::{AlignedRead, CigarOp, CigarOpKind, ReadFlags};
    use crate::basics::region::GenomeRegion;
    use crate::haplotype::genotype::generate_all_genotypes;
    use crate::haplotype::haplotype::Haplotype;
    use crate::models::indel_error::IndelErrorModel;
    use crate::models::likelihood::ReadId;

    const REF: &[u8] = b"ACGTACGTACGTACGT";

    fn window() -> GenomeRegion {
        GenomeRegion::new("chr1", 100, 116)
    }

    fn reads_of(sequence: &[u8], count: u32, base: u32) -> SampleReads {
        (0..count)
            .map(|i| {
                (
                    ReadId(base + i),
                    AlignedRead::new(
                        format!("r{}", base + i),
                        "chr1",
                        100,
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
            })
            .collect()
    }

    #[test]
    fn variant_in_one_cohort_member_is_called_for_the_cohort() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let allele = Allele::new(GenomeRegion::new("chr1", 105, 106), *b"T");
        let alt_hap = Haplotype::new(window(), vec![allele.clone()], REF).unwrap();
        let alt_sequence = alt_hap.sequence().to_vec();
        let alt = arena.intern(alt_hap);
        let haplotypes = vec![reference, alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);

        let mut priors = PriorModel::coalescent(1e-3, 1e-4);
        priors.reset(haplotypes.len());
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&arena, &haplotypes);

        let carrier: SampleReads = {
            let mut reads = reads_of(REF, 5, 0);
            reads.extend(reads_of(&alt_sequence, 5, 50));
            reads
        };
        let non_carrier = reads_of(REF, 10, 100);

        let latents = infer_population(
            &haplotypes,
            &genotypes,
            &["s1".to_string(), "s2".to_string()],
            &[carrier, non_carrier],
            &mut priors,
            &mut likelihoods,
            &arena,
        )
        .unwrap();

        let variant = Variant::new(
            Allele::new(GenomeRegion::new("chr1", 105, 106), *b"C"),
            allele,
        );
        let records =
            call_population_variants(&[variant], &latents, &arena, Phred::new(2.0));
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.samples.len(), 2);
        let s1 = record.samples.iter().find(|s| s.sample == "s1").unwrap();
        let s2 = record.samples.iter().find(|s| s.sample == "s2").unwrap();
        assert_eq!(s1.gt_string(), "0/1");
        assert_eq!(s2.gt_string(), "0/0");
    }
}
