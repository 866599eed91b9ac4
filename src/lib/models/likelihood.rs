//! Memoised read-versus-haplotype likelihoods.
//!
//! One cache lives per worker and is scoped to the active haplotype set:
//! [`HaplotypeLikelihoods::prime`] computes gap penalties for the window's
//! haplotypes and clears all memoised scores. Keys are arena indices, so
//! they stay small and copyable.

use crate::basics::read::AlignedRead;
use crate::core::maths::log_sum_exp;
use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use crate::models::indel_error::{GapPenalties, IndelErrorModel};
use crate::models::pair_hmm;
use rustc_hash::FxHashMap;

/// Identifier of a read within the active region, assigned at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadId(pub u32);

#[derive(Debug)]
pub struct HaplotypeLikelihoods {
    error_model: IndelErrorModel,
    penalties: FxHashMap<HaplotypeId, GapPenalties>,
    scores: FxHashMap<(u32, u32), f64>,
}

impl HaplotypeLikelihoods {
    pub fn new(error_model: IndelErrorModel) -> Self {
        HaplotypeLikelihoods {
            error_model,
            penalties: FxHashMap::default(),
            scores: FxHashMap::default(),
        }
    }

    /// Scope the cache to a new active haplotype set. All previously
    /// memoised scores are dropped.
    pub fn prime(&mut self, arena: &HaplotypeArena, haplotypes: &[HaplotypeId]) {
        self.scores.clear();
        self.penalties.clear();
        for &id in haplotypes {
            self.penalties
                .insert(id, self.error_model.evaluate(arena.get(id)));
        }
    }

    /// `ln P(read | haplotype)`, memoised per `(read, haplotype)` pair.
    pub fn log_likelihood(
        &mut self,
        read_id: ReadId,
        read: &AlignedRead,
        haplotype: HaplotypeId,
        arena: &HaplotypeArena,
    ) -> f64 {
        let key = (read_id.0, haplotype.0);
        if let Some(&score) = self.scores.get(&key) {
            return score;
        }
        let error_model = self.error_model;
        let penalties = self
            .penalties
            .entry(haplotype)
            .or_insert_with(|| error_model.evaluate(arena.get(haplotype)));
        let score = pair_hmm::log_likelihood(
            &read.sequence,
            &read.base_qualities,
            arena.get(haplotype).sequence(),
            penalties,
        );
        self.scores.insert(key, score);
        score
    }

    /// `ln P(reads | genotype)`: per read, the mixture over the genotype's
    /// haplotypes weighted uniformly by ploidy, summed over reads.
    pub fn genotype_log_likelihood(
        &mut self,
        reads: &[(ReadId, AlignedRead)],
        genotype: &Genotype,
        arena: &HaplotypeArena,
    ) -> f64 {
        let ln_ploidy = (genotype.ploidy() as f64).ln();
        let mut total = 0.0;
        let mut terms = Vec::with_capacity(genotype.ploidy());
        for (read_id, read) in reads {
            terms.clear();
            for haplotype in genotype.iter() {
                terms.push(self.log_likelihood(*read_id, read, haplotype, arena));
            }
            total += log_sum_exp(&terms) - ln_ploidy;
        }
        total
    }

    /// Likelihoods for a whole genotype list, in order.
    pub fn per_genotype_log_likelihoods(
        &mut self,
        reads: &[(ReadId, AlignedRead)],
        genotypes: &[Genotype],
        arena: &HaplotypeArena,
    ) -> Vec<f64> {
        genotypes
            .iter()
            .map(|genotype| self.genotype_log_likelihood(reads, genotype, arena))
            .collect()
    }

    pub fn cached_scores(&self) -> usize {
        self.scores.len()
    }
}
