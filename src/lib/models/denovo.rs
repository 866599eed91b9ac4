//! The de-novo mutation model.
//!
//! Scores the log-probability that a child haplotype arose from a parental
//! haplotype through small mutations, and lifts that to genotype
//! transitions by marginalising the inheritance assignment (one haplotype
//! from each parent, both child orderings). Haplotype-pair scores are
//! cached by arena id.

use crate::core::maths::{log_sum_exp, log_sum_exp2};
use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use rustc_hash::FxHashMap;

pub const DEFAULT_DENOVO_MUTATION_RATE: f64 = 1e-8;

#[derive(Debug)]
pub struct DeNovoModel {
    mutation_rate: f64,
    cache: FxHashMap<(u32, u32), f64>,
}

impl DeNovoModel {
    pub fn new(mutation_rate: f64) -> Self {
        DeNovoModel {
            mutation_rate,
            cache: FxHashMap::default(),
        }
    }

    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// `ln P(child haplotype | parent haplotype)`: each base mutates
    /// independently at the model rate, so `d` edits over length `L` cost
    /// `d ln(mu) + (L - d) ln(1 - mu)`.
    pub fn log_haplotype_transition(
        &mut self,
        child: HaplotypeId,
        parent: HaplotypeId,
        arena: &HaplotypeArena,
    ) -> f64 {
        let key = (child.0, parent.0);
        if let Some(&cached) = self.cache.get(&key) {
            return cached;
        }
        let child_seq = arena.get(child).sequence();
        let parent_seq = arena.get(parent).sequence();
        let edits = edit_distance(child_seq, parent_seq);
        let length = child_seq.len().max(parent_seq.len()).max(1);
        let log = edits as f64 * self.mutation_rate.ln()
            + (length - edits.min(length)) as f64 * (1.0 - self.mutation_rate).ln();
        self.cache.insert(key, log);
        log
    }

    /// `ln P(child genotype | maternal, paternal)`.
    ///
    /// For diploid samples this is exact: the child draws one haplotype
    /// from each parent (uniformly over the parent's copies), each
    /// possibly mutated, and the two child slots are unordered. Other
    /// ploidies (the dummy higher-ploidy model) fall back to drawing each
    /// child haplotype independently from the pooled parental copies.
    pub fn log_genotype_transition(
        &mut self,
        child: &Genotype,
        maternal: &Genotype,
        paternal: &Genotype,
        arena: &HaplotypeArena,
    ) -> f64 {
        if child.ploidy() != 2 {
            return self.log_pooled_transition(child, maternal, paternal, arena);
        }
        let c0 = child.ids()[0];
        let c1 = child.ids()[1];
        let mut terms =
            Vec::with_capacity(maternal.ploidy() * paternal.ploidy());
        for m in maternal.iter() {
            for p in paternal.iter() {
                let direct = self.log_haplotype_transition(c0, m, arena)
                    + self.log_haplotype_transition(c1, p, arena);
                let swapped = self.log_haplotype_transition(c1, m, arena)
                    + self.log_haplotype_transition(c0, p, arena);
                terms.push(0.5f64.ln() + log_sum_exp2(direct, swapped));
            }
        }
        log_sum_exp(&terms) - ((maternal.ploidy() * paternal.ploidy()) as f64).ln()
    }

    fn log_pooled_transition(
        &mut self,
        child: &Genotype,
        maternal: &Genotype,
        paternal: &Genotype,
        arena: &HaplotypeArena,
    ) -> f64 {
        let pool: Vec<_> = maternal.iter().chain(paternal.iter()).collect();
        let ln_pool = (pool.len() as f64).ln();
        let child_ids: Vec<_> = child.iter().collect();
        let mut total = 0.0;
        for c in child_ids {
            let terms: Vec<f64> = pool
                .iter()
                .map(|&p| self.log_haplotype_transition(c, p, arena))
                .collect();
            total += log_sum_exp(&terms) - ln_pool;
        }
        total
    }
}

/// Plain Levenshtein distance; haplotype windows are short enough that the
/// quadratic table is irrelevant next to the pair-HMM.
fn edit_distance(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
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

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance(b"ACGT", b"ACGT"), 0);
        assert_eq!(edit_distance(b"ACGT", b"ACTT"), 1);
        assert_eq!(edit_distance(b"ACGT", b"ACT"), 1);
        assert_eq!(edit_distance(b"", b"ACT"), 3);
    }

    #[test]
    fn identical_haplotypes_transition_almost_surely() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let mut model = DeNovoModel::new(DEFAULT_DENOVO_MUTATION_RATE);
        let log = model.log_haplotype_transition(reference, reference, &arena);
        assert!(log > -1e-6);
    }

    #[test]
    fn each_edit_costs_the_mutation_rate() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let snv = Allele::new(GenomeRegion::new("chr1", 102, 103), *b"T");
        let alt = arena.intern(Haplotype::new(window(), vec![snv], REF).unwrap());

        let mut model = DeNovoModel::new(1e-8);
        let log = model.log_haplotype_transition(alt, reference, &arena);
        assert!((log - 1e-8f64.ln()).abs() < 1e-3);
    }

    #[test]
    fn inherited_genotype_beats_denovo() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let snv = Allele::new(GenomeRegion::new("chr1", 102, 103), *b"T");
        let alt = arena.intern(Haplotype::new(window(), vec![snv], REF).unwrap());

        let mut model = DeNovoModel::new(1e-8);
        let hom_ref = Genotype::homozygous(reference, 2);
        let het = Genotype::from_ids(&[reference, alt]);

        // child het with a het mother: inheritance explains it
        let inherited = model.log_genotype_transition(&het, &het, &hom_ref, &arena);
        // child het with hom-ref parents: requires a new mutation
        let denovo = model.log_genotype_transition(&het, &hom_ref, &hom_ref, &arena);
        assert!(inherited > denovo);
        assert!((denovo - 1e-8f64.ln()).abs() < 1.0);
    }
}
