//! Single-sample genotype inference.

use crate::calling::trio::SampleReads;
use crate::core::errors::{CallerError, Result};
use crate::core::maths::{log_sum_exp, probability_to_phred, Phred};
use crate::haplotype::genotype::{inverse_table, Genotype};
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use crate::models::likelihood::HaplotypeLikelihoods;
use crate::models::priors::PriorModel;
use crate::basics::variant::Variant;
use crate::pipeline::providers::{CallKind, CallRecord, SampleCall};

#[derive(Debug)]
pub struct IndividualLatents {
    pub genotypes: Vec<Genotype>,
    pub posteriors: Vec<f64>,
    pub log_evidence: f64,
    pub haplotype_posteriors: Vec<(HaplotypeId, f64)>,
}

/// Posterior over one sample's genotypes: prior times read likelihood,
/// normalised.
pub fn infer_individual(
    haplotypes: &[HaplotypeId],
    genotypes: Vec<Genotype>,
    reads: &SampleReads,
    priors: &mut PriorModel,
    likelihoods: &mut HaplotypeLikelihoods,
    arena: &HaplotypeArena,
) -> Result<IndividualLatents> {
    if genotypes.is_empty() {
        return Err(CallerError::Numeric(
            "individual model invoked with no genotypes".to_string(),
        ));
    }
    let prior_values = priors.log_priors(&genotypes, arena);
    let likelihood_values = likelihoods.per_genotype_log_likelihoods(reads, &genotypes, arena);
    let scores: Vec<f64> = prior_values
        .iter()
        .zip(likelihood_values.iter())
        .map(|(p, l)| p + l)
        .collect();
    let log_evidence = log_sum_exp(&scores);
    if !log_evidence.is_finite() {
        return Err(CallerError::Numeric(
            "individual evidence underflowed".to_string(),
        ));
    }
    let posteriors: Vec<f64> = scores
        .iter()
        .map(|s| (s - log_evidence).exp())
        .collect();

    let table = inverse_table(haplotypes, &genotypes);
    let haplotype_posteriors = haplotypes
        .iter()
        .zip(table.iter())
        .map(|(&haplotype, containing)| {
            let contained_mass: f64 = containing.iter().map(|&i| posteriors[i]).sum();
            (haplotype, contained_mass)
        })
        .collect();

    Ok(IndividualLatents {
        genotypes,
        posteriors,
        log_evidence,
        haplotype_posteriors,
    })
}

impl IndividualLatents {
    pub fn map_genotype_index(&self) -> usize {
        self.posteriors
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Mass of genotypes containing the allele, as phred of the rest.
    pub fn allele_posterior(&self, allele: &crate::basics::allele::Allele, arena: &HaplotypeArena) -> Phred {
        let not_contained: f64 = self
            .genotypes
            .iter()
            .zip(self.posteriors.iter())
            .filter(|(g, _)| !g.contains_allele(arena, allele))
            .map(|(_, p)| p)
            .sum();
        probability_to_phred(not_contained)
    }
}

/// Extract calls for one sample from its individual latents.
pub fn call_individual_variants(
    candidates: &[Variant],
    latents: &IndividualLatents,
    arena: &HaplotypeArena,
    sample: &str,
    min_variant_posterior: Phred,
) -> Vec<CallRecord> {
    let map_index = latents.map_genotype_index();
    let map_genotype = &latents.genotypes[map_index];
    let mut records = Vec::new();
    for candidate in candidates {
        let allele = candidate.alt_allele();
        let posterior = latents.allele_posterior(allele, arena);
        if posterior < min_variant_posterior {
            continue;
        }
        if !map_genotype.contains_allele(arena, allele) {
            continue;
        }
        let gt_indices: Vec<u8> = map_genotype
            .iter()
            .map(|id| match arena.get(id).copy_sequence(candidate.region()) {
                Some(seq) if seq == allele.sequence() => 1,
                _ => 0,
            })
            .collect();
        let mass_other: f64 = latents
            .genotypes
            .iter()
            .zip(latents.posteriors.iter())
            .filter(|(g, _)| *g != map_genotype)
            .map(|(_, p)| p)
            .sum();
        records.push(CallRecord {
            kind: CallKind::Germline,
            variant: candidate.clone(),
            posterior,
            depth: 0,
            mapping_quality: 0.0,
            samples: vec![SampleCall {
                sample: sample.to_string(),
                gt_indices,
                phased: false,
                phase_set: None,
                genotype_quality: probability_to_phred(mass_other).score(),
            }],
            info: vec![("PP".to_string(), format!("{:.2}", posterior.score()))],
        });
    }
    records
}
