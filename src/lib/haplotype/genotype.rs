//! Genotypes: ploidy-sized multisets of haplotype ids.

use crate::basics::allele::Allele;
use crate::core::maths::num_multisets;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

/// A sorted multiset of haplotype ids; the ids index a [`HaplotypeArena`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genotype {
    ids: SmallVec<[HaplotypeId; 2]>,
}

impl Genotype {
    pub fn new(mut ids: SmallVec<[HaplotypeId; 2]>) -> Self {
        ids.sort_unstable();
        Genotype { ids }
    }

    pub fn from_ids(ids: &[HaplotypeId]) -> Self {
        Self::new(SmallVec::from_slice(ids))
    }

    /// The homozygous genotype `ploidy x haplotype`.
    pub fn homozygous(id: HaplotypeId, ploidy: usize) -> Self {
        Genotype {
            ids: std::iter::repeat(id).take(ploidy).collect(),
        }
    }

    pub fn ploidy(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[HaplotypeId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = HaplotypeId> + '_ {
        self.ids.iter().copied()
    }

    pub fn contains_id(&self, id: HaplotypeId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn count_id(&self, id: HaplotypeId) -> usize {
        self.ids.iter().filter(|&&h| h == id).count()
    }

    /// Number of distinct haplotypes.
    pub fn zygosity(&self) -> usize {
        let mut distinct = 0;
        let mut last: Option<HaplotypeId> = None;
        for &id in &self.ids {
            if last != Some(id) {
                distinct += 1;
                last = Some(id);
            }
        }
        distinct
    }

    pub fn is_homozygous(&self) -> bool {
        self.zygosity() <= 1
    }

    pub fn distinct_ids(&self) -> SmallVec<[HaplotypeId; 2]> {
        let mut out: SmallVec<[HaplotypeId; 2]> = SmallVec::new();
        for &id in &self.ids {
            if out.last() != Some(&id) {
                out.push(id);
            }
        }
        out
    }

    /// Whether any contained haplotype carries the allele.
    pub fn contains_allele(&self, arena: &HaplotypeArena, allele: &Allele) -> bool {
        self.distinct_ids()
            .iter()
            .any(|&id| arena.get(id).contains(allele))
    }

    /// How many copies carry the allele.
    pub fn allele_count(&self, arena: &HaplotypeArena, allele: &Allele) -> usize {
        self.ids
            .iter()
            .filter(|&&id| arena.get(id).contains(allele))
            .count()
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

/// All multisets of size `ploidy` over the given haplotypes, in
/// lexicographic id order. The result has `C(n + ploidy - 1, ploidy)`
/// entries.
pub fn generate_all_genotypes(haplotypes: &[HaplotypeId], ploidy: usize) -> Vec<Genotype> {
    if haplotypes.is_empty() || ploidy == 0 {
        return Vec::new();
    }
    let expected = num_multisets(haplotypes.len(), ploidy);
    let mut result = Vec::with_capacity(expected);
    let mut stack: SmallVec<[HaplotypeId; 2]> = SmallVec::new();
    fill_genotypes(haplotypes, ploidy, 0, &mut stack, &mut result);
    debug_assert_eq!(result.len(), expected);
    result
}

fn fill_genotypes(
    haplotypes: &[HaplotypeId],
    ploidy: usize,
    from: usize,
    stack: &mut SmallVec<[HaplotypeId; 2]>,
    out: &mut Vec<Genotype>,
) {
    if stack.len() == ploidy {
        out.push(Genotype {
            ids: stack.clone(),
        });
        return;
    }
    for i in from..haplotypes.len() {
        stack.push(haplotypes[i]);
        fill_genotypes(haplotypes, ploidy, i, stack, out);
        stack.pop();
    }
}

/// For each haplotype, the sorted indices of the genotypes containing it.
///
/// Lets marginalisation over "genotypes excluding h" run as a set
/// difference instead of a scan per haplotype.
pub fn inverse_table(haplotypes: &[HaplotypeId], genotypes: &[Genotype]) -> Vec<Vec<usize>> {
    let slot: FxHashMap<HaplotypeId, usize> = haplotypes
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();
    let mut table: Vec<Vec<usize>> = vec![Vec::new(); haplotypes.len()];
    for (genotype_index, genotype) in genotypes.iter().enumerate() {
        for &id in genotype.distinct_ids().iter() {
            if let Some(&h) = slot.get(&id) {
                table[h].push(genotype_index);
            }
        }
    }
    // insertion order is already ascending per haplotype
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: u32) -> Vec<HaplotypeId> {
        (0..n).map(HaplotypeId).collect()
    }

    #[test]
    fn multiset_enumeration_count() {
        assert_eq!(generate_all_genotypes(&ids(4), 2).len(), 10);
        assert_eq!(generate_all_genotypes(&ids(1), 2).len(), 1);
        assert_eq!(generate_all_genotypes(&ids(3), 1).len(), 3);
        assert!(generate_all_genotypes(&[], 2).is_empty());
    }

    #[test]
    fn genotypes_are_sorted_multisets() {
        let genotypes = generate_all_genotypes(&ids(3), 2);
        for g in &genotypes {
            assert!(g.ids().windows(2).all(|w| w[0] <= w[1]));
        }
        // all unique
        let mut seen = genotypes.clone();
        seen.dedup();
        assert_eq!(seen.len(), genotypes.len());
    }

    #[test]
    fn zygosity_counts_distinct() {
        let hom = Genotype::homozygous(HaplotypeId(1), 2);
        assert_eq!(hom.zygosity(), 1);
        assert!(hom.is_homozygous());

        let het = Genotype::from_ids(&[HaplotypeId(1), HaplotypeId(0)]);
        assert_eq!(het.zygosity(), 2);
        assert!(!het.is_homozygous());
        assert_eq!(het.ids(), &[HaplotypeId(0), HaplotypeId(1)]);
    }

    #[test]
    fn inverse_table_inverts_membership() {
        let haplotypes = ids(3);
        let genotypes = generate_all_genotypes(&haplotypes, 2);
        let table = inverse_table(&haplotypes, &genotypes);
        for (h, contained) in table.iter().enumerate() {
            for (g_index, genotype) in genotypes.iter().enumerate() {
                let expected = genotype.contains_id(HaplotypeId(h as u32));
                assert_eq!(contained.contains(&g_index), expected);
            }
            assert!(contained.windows(2).all(|w| w[0] < w[1]));
        }
    }

    proptest! {
        #[test]
        fn count_matches_multiset_coefficient(n in 1u32..7, ploidy in 1usize..4) {
            let genotypes = generate_all_genotypes(&ids(n), ploidy);
            prop_assert_eq!(genotypes.len(), num_multisets(n as usize, ploidy));
        }
    }
}
