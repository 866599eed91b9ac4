//! Population genotype priors.
//!
//! Two models: a flat prior, and a coalescent-flavoured prior that weighs
//! each genotype by the mutations its distinct haplotypes carry against
//! the reference (SNVs under the SNP heterozygosity, indels under the
//! indel heterozygosity), a multiset-permutation term favouring
//! heterozygous arrangements, and a Watterson-style normaliser over the
//! window's haplotype count. Results are cached by genotype id tuple and
//! are scoped to the active window.

use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub const DEFAULT_SNP_HETEROZYGOSITY: f64 = 1e-3;
pub const DEFAULT_INDEL_HETEROZYGOSITY: f64 = 1e-4;

#[derive(Debug)]
pub enum PriorModel {
    Uniform,
    Coalescent(CoalescentPrior),
}

impl PriorModel {
    pub fn coalescent(snp_heterozygosity: f64, indel_heterozygosity: f64) -> Self {
        PriorModel::Coalescent(CoalescentPrior::new(
            snp_heterozygosity,
            indel_heterozygosity,
        ))
    }

    /// `ln pi(genotype)`.
    pub fn log_prior(&mut self, genotype: &Genotype, arena: &HaplotypeArena) -> f64 {
        match self {
            PriorModel::Uniform => 0.0,
            PriorModel::Coalescent(model) => model.log_prior(genotype, arena),
        }
    }

    /// Priors for a whole genotype list, in order.
    pub fn log_priors(&mut self, genotypes: &[Genotype], arena: &HaplotypeArena) -> Vec<f64> {
        genotypes
            .iter()
            .map(|genotype| self.log_prior(genotype, arena))
            .collect()
    }

    /// Drop cached values when the haplotype set changes.
    pub fn reset(&mut self, num_haplotypes: usize) {
        if let PriorModel::Coalescent(model) = self {
            model.reset(num_haplotypes);
        }
    }
}

#[derive(Debug)]
pub struct CoalescentPrior {
    snp_heterozygosity: f64,
    indel_heterozygosity: f64,
    watterson_norm: f64,
    cache: FxHashMap<SmallVec<[HaplotypeId; 2]>, f64>,
}

impl CoalescentPrior {
    pub fn new(snp_heterozygosity: f64, indel_heterozygosity: f64) -> Self {
        CoalescentPrior {
            snp_heterozygosity,
            indel_heterozygosity,
            watterson_norm: 0.0,
            cache: FxHashMap::default(),
        }
    }

    /// Rescope to a window with `num_haplotypes` candidate haplotypes.
    pub fn reset(&mut self, num_haplotypes: usize) {
        self.cache.clear();
        let theta = self.snp_heterozygosity + self.indel_heterozygosity;
        let a_n: f64 = (1..num_haplotypes.max(1))
            .map(|k| 1.0 / k as f64)
            .sum();
        self.watterson_norm = (1.0 + a_n * theta).ln();
    }

    pub fn log_prior(&mut self, genotype: &Genotype, arena: &HaplotypeArena) -> f64 {
        let key: SmallVec<[HaplotypeId; 2]> = SmallVec::from_slice(genotype.ids());
        if let Some(&cached) = self.cache.get(&key) {
            return cached;
        }
        let mut log = 0.0;
        for &id in genotype.distinct_ids().iter() {
            let (snvs, indels) = arena.get(id).mutation_counts();
            log += snvs as f64 * self.snp_heterozygosity.ln();
            log += indels as f64 * self.indel_heterozygosity.ln();
        }
        log += ln_multiset_permutations(genotype);
        log -= self.watterson_norm;
        self.cache.insert(key, log);
        log
    }
}

/// `ln(ploidy! / prod(count_h!))`: the number of ordered arrangements of
/// the genotype's multiset.
fn ln_multiset_permutations(genotype: &Genotype) -> f64 {
    let mut log = ln_factorial(genotype.ploidy());
    let mut run = 1usize;
    let ids = genotype.ids();
    for i in 1..=ids.len() {
        if i < ids.len() && ids[i] == ids[i - 1] {
            run += 1;
        } else {
            log -= ln_factorial(run);
            run = 1;
        }
    }
    log
}

fn ln_factorial(n: usize) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::allele::Allele;
    use crate::basics::region::GenomeRegion;
    use crate::haplotype::haplotype::Haplotype;

    const REF: &[u8] = b"ACGTACGTAC";

    fn window() -> GenomeRegion {
        GenomeRegion::new("chr1", 100, 110)
    }

    fn arena_with_snv() -> (HaplotypeArena, HaplotypeId, HaplotypeId) {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let snv = Allele::new(GenomeRegion::new("chr1", 102, 103), *b"T");
        let alt = arena.intern(Haplotype::new(window(), vec![snv], REF).unwrap());
        (arena, reference, alt)
    }

    #[test]
    fn uniform_prior_is_flat() {
        let (arena, reference, alt) = arena_with_snv();
        let mut prior = PriorModel::Uniform;
        let hom = Genotype::homozygous(reference, 2);
        let het = Genotype::from_ids(&[reference, alt]);
        assert_eq!(prior.log_prior(&hom, &arena), prior.log_prior(&het, &arena));
    }

    #[test]
    fn coalescent_prior_orders_genotypes_sensibly() {
        let (arena, reference, alt) = arena_with_snv();
        let mut prior =
            PriorModel::coalescent(DEFAULT_SNP_HETEROZYGOSITY, DEFAULT_INDEL_HETEROZYGOSITY);
        prior.reset(arena.len());

        let hom_ref = prior.log_prior(&Genotype::homozygous(reference, 2), &arena);
        let het = prior.log_prior(&Genotype::from_ids(&[reference, alt]), &arena);
        let hom_alt = prior.log_prior(&Genotype::homozygous(alt, 2), &arena);

        // reference is most probable; the het carries one mutation with two
        // orderings, the hom-alt the same mutation with one ordering
        assert!(hom_ref > het);
        assert!(het > hom_alt);
        assert!((het - hom_alt - 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn indels_are_rarer_than_snvs() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let snv = Allele::new(GenomeRegion::new("chr1", 102, 103), *b"T");
        let del = Allele::new(GenomeRegion::new("chr1", 104, 106), *b"");
        let snv_hap = arena.intern(Haplotype::new(window(), vec![snv], REF).unwrap());
        let del_hap = arena.intern(Haplotype::new(window(), vec![del], REF).unwrap());

        let mut prior =
            PriorModel::coalescent(DEFAULT_SNP_HETEROZYGOSITY, DEFAULT_INDEL_HETEROZYGOSITY);
        prior.reset(arena.len());
        let het_snv = prior.log_prior(&Genotype::from_ids(&[reference, snv_hap]), &arena);
        let het_del = prior.log_prior(&Genotype::from_ids(&[reference, del_hap]), &arena);
        assert!(het_snv > het_del);
    }
}
