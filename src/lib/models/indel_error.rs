//! Context-dependent indel error models.
//!
//! Each sequencer model maps the tandem-repeat context of a haplotype to a
//! per-base gap-open penalty vector for the pair-HMM. Penalties are on the
//! phred scale; the tables are fixed 50-entry arrays indexed directly by
//! the repeat periodicity, clamping to the final entry beyond that.

use crate::haplotype::haplotype::Haplotype;
use crate::models::repeats::find_tandem_repeats;

const MAX_REPEAT_PERIOD: usize = 4;
const DEFAULT_GAP_EXTEND: u8 = 3;

// HiSeq tables.
const HISEQ_HOMOPOLYMER: [u8; 50] = [
    60, 60, 50, 45, 41, 36, 30, 25, 23, 22, 21, 20, 19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 9, 9,
    8, 8, 7, 7, 6, 6, 5, 5, 5, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const HISEQ_DINUCLEOTIDE: [u8; 50] = [
    60, 60, 50, 46, 42, 37, 31, 27, 25, 24, 23, 22, 21, 20, 19, 18, 17, 16, 15, 14, 13, 12, 11,
    10, 9, 8, 7, 6, 6, 6, 5, 5, 5, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const HISEQ_TRINUCLEOTIDE: [u8; 50] = [
    60, 60, 50, 46, 42, 38, 32, 28, 26, 25, 24, 23, 22, 21, 18, 17, 17, 16, 15, 14, 13, 12, 11,
    10, 9, 8, 7, 6, 6, 6, 5, 5, 5, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const HISEQ_POLYNUCLEOTIDE: [u8; 50] = HISEQ_TRINUCLEOTIDE;

// NovaSeq tables; period 1 splits AT from CG homopolymers.
const NOVASEQ_AT_HOMOPOLYMER: [u8; 50] = [
    60, 60, 43, 41, 40, 36, 34, 30, 24, 20, 16, 13, 12, 11, 10, 10, 9, 9, 8, 8, 7, 7, 7, 6, 6, 6,
    6, 5, 5, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const NOVASEQ_CG_HOMOPOLYMER: [u8; 50] = [
    60, 60, 42, 40, 37, 33, 28, 22, 18, 15, 12, 10, 9, 8, 6, 6, 5, 5, 5, 5, 5, 5, 5, 4, 4, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const NOVASEQ_DINUCLEOTIDE: [u8; 50] = [
    60, 60, 38, 37, 32, 26, 21, 18, 16, 14, 14, 13, 13, 12, 12, 11, 11, 11, 10, 10, 10, 9, 9, 9,
    8, 8, 7, 7, 7, 7, 6, 6, 6, 5, 5, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const NOVASEQ_TRINUCLEOTIDE: [u8; 50] = [
    60, 60, 37, 32, 26, 22, 20, 19, 18, 17, 17, 16, 15, 15, 14, 13, 13, 12, 12, 11, 12, 10, 9, 9,
    8, 8, 7, 7, 7, 7, 6, 6, 5, 5, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];
const NOVASEQ_POLYNUCLEOTIDE: [u8; 50] = [
    60, 60, 50, 46, 42, 38, 32, 28, 26, 25, 24, 23, 22, 21, 18, 17, 17, 16, 15, 14, 13, 12, 11,
    10, 9, 8, 7, 6, 6, 6, 5, 5, 5, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];

#[inline]
fn min_penalty(penalties: &[u8; 50], periodicity: usize) -> u8 {
    if periodicity < penalties.len() {
        penalties[periodicity]
    } else {
        penalties[penalties.len() - 1]
    }
}

/// Per-base gap penalties for one haplotype.
#[derive(Debug, Clone)]
pub struct GapPenalties {
    pub open: Vec<u8>,
    pub extend: u8,
}

/// The available sequencer error models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndelErrorModel {
    HiSeq,
    NovaSeq,
}

impl Default for IndelErrorModel {
    fn default() -> Self {
        IndelErrorModel::NovaSeq
    }
}

impl IndelErrorModel {
    pub fn default_open_penalty(self) -> u8 {
        match self {
            IndelErrorModel::HiSeq => HISEQ_HOMOPOLYMER[0],
            IndelErrorModel::NovaSeq => NOVASEQ_AT_HOMOPOLYMER[0],
        }
    }

    pub fn default_extend_penalty(self) -> u8 {
        DEFAULT_GAP_EXTEND
    }

    fn open_penalty(self, motif: &[u8], periodicity: usize) -> u8 {
        match self {
            IndelErrorModel::HiSeq => match motif.len() {
                1 => min_penalty(&HISEQ_HOMOPOLYMER, periodicity),
                2 => min_penalty(&HISEQ_DINUCLEOTIDE, periodicity),
                3 => min_penalty(&HISEQ_TRINUCLEOTIDE, periodicity),
                _ => min_penalty(&HISEQ_POLYNUCLEOTIDE, periodicity),
            },
            IndelErrorModel::NovaSeq => match motif.len() {
                1 => {
                    if motif[0] == b'A' || motif[0] == b'T' {
                        min_penalty(&NOVASEQ_AT_HOMOPOLYMER, periodicity)
                    } else {
                        min_penalty(&NOVASEQ_CG_HOMOPOLYMER, periodicity)
                    }
                }
                2 => {
                    let mut penalty = min_penalty(&NOVASEQ_DINUCLEOTIDE, periodicity);
                    if penalty > 7 && (motif == b"CG" || motif == b"GC") {
                        penalty -= 2;
                    }
                    penalty
                }
                3 => min_penalty(&NOVASEQ_TRINUCLEOTIDE, periodicity),
                _ => min_penalty(&NOVASEQ_POLYNUCLEOTIDE, periodicity),
            },
        }
    }

    /// One gap-open penalty per haplotype base. Every maximal repeat
    /// lowers the penalty across the bases it covers; positions outside
    /// any repeat keep the default.
    pub fn evaluate(self, haplotype: &Haplotype) -> GapPenalties {
        let sequence = haplotype.sequence();
        let mut open = vec![self.default_open_penalty(); sequence.len()];
        for repeat in find_tandem_repeats(sequence, MAX_REPEAT_PERIOD) {
            let penalty = self.open_penalty(repeat.motif(sequence), repeat.periodicity());
            for slot in &mut open[repeat.begin..repeat.end] {
                if penalty < *slot {
                    *slot = penalty;
                }
            }
        }
        GapPenalties {
            open,
            extend: self.default_extend_penalty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::region::GenomeRegion;

    fn hap(sequence: &[u8]) -> Haplotype {
        Haplotype::reference(
            GenomeRegion::new("chr1", 0, sequence.len() as u64),
            sequence,
        )
    }

    #[test]
    fn non_repetitive_sequence_keeps_default() {
        let penalties = IndelErrorModel::NovaSeq.evaluate(&hap(b"ACGTGCA"));
        assert!(penalties.open.iter().all(|&p| p == 60));
        assert_eq!(penalties.extend, 3);
    }

    #[test]
    fn homopolymer_lowers_open_penalty() {
        let penalties = IndelErrorModel::NovaSeq.evaluate(&hap(b"ACGAAAAAAAAGT"));
        // periodicity 8 in the AT table
        assert_eq!(penalties.open[5], NOVASEQ_AT_HOMOPOLYMER[8]);
        assert_eq!(penalties.open[0], 60);
        assert_eq!(penalties.open[12], 60);
    }

    #[test]
    fn at_and_cg_homopolymers_differ_on_novaseq() {
        let at = IndelErrorModel::NovaSeq.evaluate(&hap(b"TAAAAAAAAAT"));
        let cg = IndelErrorModel::NovaSeq.evaluate(&hap(b"TGGGGGGGGGT"));
        assert!(cg.open[5] < at.open[5]);

        // HiSeq has a single homopolymer table
        let at_hiseq = IndelErrorModel::HiSeq.evaluate(&hap(b"TAAAAAAAAAT"));
        let cg_hiseq = IndelErrorModel::HiSeq.evaluate(&hap(b"TGGGGGGGGGT"));
        assert_eq!(at_hiseq.open[5], cg_hiseq.open[5]);
    }

    #[test]
    fn cg_dinucleotide_repeats_get_the_bonus() {
        // periodicity 4 dinucleotide: table value 32, > 7, motif CG => 30
        let penalties = IndelErrorModel::NovaSeq.evaluate(&hap(b"TTCGCGCGCGTT"));
        assert_eq!(penalties.open[4], NOVASEQ_DINUCLEOTIDE[4] - 2);
    }

    #[test]
    fn long_repeats_clamp_to_final_entry() {
        let long_run = vec![b'A'; 80];
        let penalties = IndelErrorModel::NovaSeq.evaluate(&hap(&long_run));
        assert_eq!(penalties.open[40], NOVASEQ_AT_HOMOPOLYMER[49]);
    }
}
