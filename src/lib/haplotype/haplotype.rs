//! Haplotypes and the haplotype arena.
//!
//! A haplotype is a window of the reference with an ordered set of
//! non-overlapping alternate alleles woven in. Identity is structural: two
//! haplotypes are the same iff they cover the same region and materialise
//! to the same sequence. Haplotypes are interned into a [`HaplotypeArena`]
//! and handled by index everywhere else, which keeps genotype equality and
//! cache keys cheap.

use crate::basics::allele::Allele;
use crate::basics::region::GenomeRegion;
use crate::core::errors::{CallerError, Result};
use rustc_hash::FxHashMap;
use std::fmt;

/// Arena index of an interned haplotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HaplotypeId(pub u32);

impl fmt::Display for HaplotypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// Whether `next` can follow `prev` on one haplotype.
///
/// Non-empty regions must not overlap; two insertions must not share an
/// anchor point; an insertion may sit at the boundary of a neighbouring
/// allele.
pub fn alleles_compatible(prev: &Allele, next: &Allele) -> bool {
    let (a, b) = (prev.region(), next.region());
    if !a.same_contig(b) {
        return false;
    }
    match (a.is_empty(), b.is_empty()) {
        (true, true) => a.begin() != b.begin(),
        (true, false) => a.begin() <= b.begin(),
        (false, true) => a.end() <= b.begin(),
        (false, false) => a.end() <= b.begin(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Haplotype {
    region: GenomeRegion,
    alleles: Vec<Allele>,
    sequence: Vec<u8>,
}

impl Haplotype {
    /// The all-reference haplotype over `region`.
    ///
    /// `ref_bases` must cover exactly `region`.
    pub fn reference(region: GenomeRegion, ref_bases: &[u8]) -> Self {
        debug_assert_eq!(ref_bases.len() as u64, region.size());
        Haplotype {
            region,
            alleles: Vec::new(),
            sequence: ref_bases.to_vec(),
        }
    }

    /// Weave sorted, pairwise compatible alternate alleles into the
    /// reference window.
    pub fn new(region: GenomeRegion, alleles: Vec<Allele>, ref_bases: &[u8]) -> Result<Self> {
        if ref_bases.len() as u64 != region.size() {
            return Err(CallerError::Data(format!(
                "reference slice of {} bases does not cover {}",
                ref_bases.len(),
                region
            )));
        }
        for allele in &alleles {
            if !region.overlaps(allele.region())
                || allele.region().begin() < region.begin()
                || allele.region().end() > region.end()
            {
                return Err(CallerError::Data(format!(
                    "allele {} escapes haplotype window {}",
                    allele, region
                )));
            }
        }
        for pair in alleles.windows(2) {
            if !alleles_compatible(&pair[0], &pair[1]) {
                return Err(CallerError::Data(format!(
                    "alleles {} and {} overlap",
                    pair[0], pair[1]
                )));
            }
        }
        let mut sequence = Vec::with_capacity(ref_bases.len());
        let mut cursor = region.begin();
        for allele in &alleles {
            let gap = (allele.region().begin() - cursor) as usize;
            let offset = (cursor - region.begin()) as usize;
            sequence.extend_from_slice(&ref_bases[offset..offset + gap]);
            sequence.extend_from_slice(allele.sequence());
            cursor = allele.region().end().max(cursor + gap as u64);
        }
        let offset = (cursor - region.begin()) as usize;
        sequence.extend_from_slice(&ref_bases[offset..]);
        Ok(Haplotype {
            region,
            alleles,
            sequence,
        })
    }

    pub fn region(&self) -> &GenomeRegion {
        &self.region
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The alternate alleles woven into this haplotype, in region order.
    pub fn alleles(&self) -> &[Allele] {
        &self.alleles
    }

    pub fn is_reference(&self) -> bool {
        self.alleles.iter().all(|a| a.sequence().is_empty() && a.region().is_empty())
    }

    /// SNV-equivalent and indel mutation counts against the reference,
    /// used by the coalescent prior.
    pub fn mutation_counts(&self) -> (usize, usize) {
        let mut snvs = 0usize;
        let mut indels = 0usize;
        for allele in &self.alleles {
            if allele.is_indel() {
                indels += 1;
            } else if allele.is_snv() {
                snvs += 1;
            } else if allele.is_mnv() {
                snvs += allele.sequence_len();
            } else if !allele.sequence().is_empty() || !allele.region().is_empty() {
                indels += 1;
            }
        }
        (snvs, indels)
    }

    /// The haplotype's sequence over `query`, where defined.
    ///
    /// For an empty query region the result is the sequence inserted at
    /// that point (empty when none is). Insertions anchored exactly at a
    /// non-empty query's boundaries are excluded; a query that cuts
    /// through an indel has no well-defined copy and yields `None`.
    pub fn copy_sequence(&self, query: &GenomeRegion) -> Option<Vec<u8>> {
        if !self.region.same_contig(query)
            || query.begin() < self.region.begin()
            || query.end() > self.region.end()
        {
            return None;
        }
        if query.is_empty() {
            let anchor = query.begin();
            let mut out = Vec::new();
            for allele in &self.alleles {
                if allele.region().is_empty() && allele.region().begin() == anchor {
                    out.extend_from_slice(allele.sequence());
                }
            }
            return Some(out);
        }
        let mut out = Vec::new();
        let mut cursor = self.region.begin();
        let mut hap_offset = 0usize;
        for allele in &self.alleles {
            let a = allele.region();
            // reference segment before this allele
            let gap = (a.begin() - cursor) as usize;
            self.copy_reference_overlap(query, cursor, hap_offset, gap, &mut out);
            hap_offset += gap;
            cursor = a.begin();
            // the allele segment itself
            let alt_len = allele.sequence_len();
            if a.is_empty() {
                if query.begin() < cursor && cursor < query.end() {
                    out.extend_from_slice(allele.sequence());
                }
            } else if query.begin() <= a.begin() && a.end() <= query.end() {
                out.extend_from_slice(allele.sequence());
            } else if query.overlaps(a) {
                // partial overlap: only length-preserving alleles can be cut
                if a.size() == alt_len as u64 {
                    let from = query.begin().max(a.begin());
                    let to = query.end().min(a.end());
                    let lo = (from - a.begin()) as usize;
                    let hi = (to - a.begin()) as usize;
                    out.extend_from_slice(&allele.sequence()[lo..hi]);
                } else {
                    return None;
                }
            }
            hap_offset += alt_len;
            cursor = a.end();
        }
        let tail = (self.region.end() - cursor) as usize;
        self.copy_reference_overlap(query, cursor, hap_offset, tail, &mut out);
        Some(out)
    }

    fn copy_reference_overlap(
        &self,
        query: &GenomeRegion,
        segment_begin: u64,
        hap_offset: usize,
        segment_len: usize,
        out: &mut Vec<u8>,
    ) {
        if segment_len == 0 {
            return;
        }
        let segment_end = segment_begin + segment_len as u64;
        let from = query.begin().max(segment_begin);
        let to = query.end().min(segment_end);
        if from < to {
            let lo = hap_offset + (from - segment_begin) as usize;
            let hi = hap_offset + (to - segment_begin) as usize;
            out.extend_from_slice(&self.sequence[lo..hi]);
        }
    }

    /// Whether this haplotype carries the allele: its sequence over the
    /// allele's region equals the allele's sequence.
    pub fn contains(&self, allele: &Allele) -> bool {
        match self.copy_sequence(allele.region()) {
            Some(seq) => seq == allele.sequence(),
            None => false,
        }
    }
}

/// Interning store for the haplotypes of an active window.
#[derive(Debug, Default)]
pub struct HaplotypeArena {
    haplotypes: Vec<Haplotype>,
    index: FxHashMap<(GenomeRegion, Vec<u8>), HaplotypeId>,
}

impl HaplotypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a haplotype, returning the id of the stored copy. Structural
    /// duplicates collapse to one entry.
    pub fn intern(&mut self, haplotype: Haplotype) -> HaplotypeId {
        let key = (haplotype.region().clone(), haplotype.sequence().to_vec());
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = HaplotypeId(self.haplotypes.len() as u32);
        self.haplotypes.push(haplotype);
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: HaplotypeId) -> &Haplotype {
        &self.haplotypes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = HaplotypeId> + '_ {
        (0..self.haplotypes.len() as u32).map(HaplotypeId)
    }

    /// Drop everything; window advance starts from a fresh arena.
    pub fn clear(&mut self) {
        self.haplotypes.clear();
        self.index.clear();
    }
}
