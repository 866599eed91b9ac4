//! Aligned reads as plain value objects.
//!
//! The alignment provider seam delivers reads in this shape; nothing in the
//! caller touches an alignment file directly. The CIGAR vocabulary follows
//! the SAM operation set, with `Substitution` covering the explicit
//! mismatch (`X`) operation.

use crate::basics::region::GenomeRegion;
use crate::core::errors::{CallerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// `M`: consumes both; bases may match or mismatch.
    AlignmentMatch,
    /// `=`: consumes both; bases match.
    SequenceMatch,
    /// `X`: consumes both; bases differ.
    Substitution,
    /// `I`: consumes the read only.
    Insertion,
    /// `D`: consumes the reference only.
    Deletion,
    /// `S`: consumes the read only.
    SoftClip,
    /// `H`: consumes neither.
    HardClip,
    /// `P`: consumes neither.
    Padding,
    /// `N`: consumes the reference only.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarOpKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        CigarOp { kind, len }
    }

    pub fn consumes_read(&self) -> bool {
        matches!(
            self.kind,
            CigarOpKind::AlignmentMatch
                | CigarOpKind::SequenceMatch
                | CigarOpKind::Substitution
                | CigarOpKind::Insertion
                | CigarOpKind::SoftClip
        )
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(
            self.kind,
            CigarOpKind::AlignmentMatch
                | CigarOpKind::SequenceMatch
                | CigarOpKind::Substitution
                | CigarOpKind::Deletion
                | CigarOpKind::Skipped
        )
    }
}

/// Reference bases consumed by a CIGAR.
pub fn reference_span(cigar: &[CigarOp]) -> u64 {
    cigar
        .iter()
        .filter(|op| op.consumes_reference())
        .map(|op| op.len as u64)
        .sum()
}

/// Read bases consumed by a CIGAR (soft clips included).
pub fn read_span(cigar: &[CigarOp]) -> usize {
    cigar
        .iter()
        .filter(|op| op.consumes_read())
        .map(|op| op.len as usize)
        .sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadFlags {
    pub reverse_strand: bool,
    pub duplicate: bool,
    pub secondary: bool,
    pub supplementary: bool,
    pub qc_fail: bool,
    pub unmapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MateInfo {
    pub contig: String,
    pub begin: u64,
    pub unmapped: bool,
}

/// A single aligned read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    pub name: String,
    pub region: GenomeRegion,
    pub sequence: Vec<u8>,
    pub base_qualities: Vec<u8>,
    pub mapping_quality: u8,
    pub cigar: Vec<CigarOp>,
    pub flags: ReadFlags,
    pub mate: Option<MateInfo>,
}

impl AlignedRead {
    /// Build a read, deriving its reference region from the alignment start
    /// and CIGAR. Rejects inconsistent records rather than letting them
    /// poison the scanner.
    pub fn new(
        name: impl Into<String>,
        contig: &str,
        position: u64,
        sequence: Vec<u8>,
        base_qualities: Vec<u8>,
        mapping_quality: u8,
        cigar: Vec<CigarOp>,
        flags: ReadFlags,
        mate: Option<MateInfo>,
    ) -> Result<Self> {
        let name = name.into();
        if sequence.len() != base_qualities.len() {
            return Err(CallerError::Data(format!(
                "read {}: {} bases but {} qualities",
                name,
                sequence.len(),
                base_qualities.len()
            )));
        }
        if read_span(&cigar) != sequence.len() {
            return Err(CallerError::Data(format!(
                "read {}: CIGAR consumes {} bases, sequence has {}",
                name,
                read_span(&cigar),
                sequence.len()
            )));
        }
        let region = GenomeRegion::new(contig, position, position + reference_span(&cigar));
        Ok(AlignedRead {
            name,
            region,
            sequence,
            base_qualities,
            mapping_quality,
            cigar,
            flags,
            mate,
        })
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn is_forward_strand(&self) -> bool {
        !self.flags.reverse_strand
    }

    /// Number of bases at or above the quality threshold.
    pub fn good_base_count(&self, min_quality: u8) -> usize {
        self.base_qualities
            .iter()
            .filter(|&&q| q >= min_quality)
            .count()
    }

    /// Zero out base qualities inside soft-clipped segments plus
    /// `boundary` adjacent aligned bases, so clipped sequence cannot
    /// contribute candidate evidence.
    pub fn mask_soft_clips(&mut self, boundary: usize) {
        let mut read_index = 0usize;
        let total = self.sequence.len();
        for op in self.cigar.clone() {
            let len = op.len as usize;
            if op.kind == CigarOpKind::SoftClip {
                let mask_begin = read_index.saturating_sub(boundary);
                let mask_end = (read_index + len + boundary).min(total);
                for q in &mut self.base_qualities[mask_begin..mask_end] {
                    *q = 0;
                }
            }
            if op.consumes_read() {
                read_index += len;
            }
        }
    }
}

/// Read-filter thresholds applied before candidate generation.
#[derive(Debug, Clone)]
pub struct ReadFilterOptions {
    pub min_mapping_quality: u8,
    pub good_base_quality: u8,
    pub min_good_bases: usize,
    pub min_good_base_fraction: Option<f64>,
    pub allow_duplicates: bool,
    pub allow_qc_fails: bool,
    pub allow_secondary: bool,
    pub allow_supplementary: bool,
}

impl Default for ReadFilterOptions {
    fn default() -> Self {
        ReadFilterOptions {
            min_mapping_quality: 20,
            good_base_quality: 20,
            min_good_bases: 20,
            min_good_base_fraction: None,
            allow_duplicates: false,
            allow_qc_fails: false,
            allow_secondary: false,
            allow_supplementary: false,
        }
    }
}

/// Whether a read passes the configured filters.
pub fn passes_filters(read: &AlignedRead, options: &ReadFilterOptions) -> bool {
    if read.flags.unmapped
        || (read.flags.duplicate && !options.allow_duplicates)
        || (read.flags.qc_fail && !options.allow_qc_fails)
        || (read.flags.secondary && !options.allow_secondary)
        || (read.flags.supplementary && !options.allow_supplementary)
    {
        return false;
    }
    if read.mapping_quality < options.min_mapping_quality {
        return false;
    }
    let good = read.good_base_count(options.good_base_quality);
    if good < options.min_good_bases.min(read.len()) {
        return false;
    }
    if let Some(fraction) = options.min_good_base_fraction {
        if read.len() > 0 && (good as f64 / read.len() as f64) < fraction {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_read(cigar: Vec<CigarOp>, len: usize) -> AlignedRead {
        AlignedRead::new(
            "r1",
            "chr1",
            100,
            vec![b'A'; len],
            vec![30; len],
            60,
            cigar,
            ReadFlags::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn region_follows_cigar() {
        let read = simple_read(
            vec![
                CigarOp::new(CigarOpKind::SoftClip, 5),
                CigarOp::new(CigarOpKind::AlignmentMatch, 20),
                CigarOp::new(CigarOpKind::Deletion, 3),
                CigarOp::new(CigarOpKind::AlignmentMatch, 10),
            ],
            35,
        );
        assert_eq!(read.region, GenomeRegion::new("chr1", 100, 133));
    }

    #[test]
    fn inconsistent_cigar_is_data_error() {
        let result = AlignedRead::new(
            "bad",
            "chr1",
            0,
            vec![b'A'; 10],
            vec![30; 10],
            60,
            vec![CigarOp::new(CigarOpKind::AlignmentMatch, 20)],
            ReadFlags::default(),
            None,
        );
        assert!(matches!(result, Err(CallerError::Data(_))));
    }

    #[test]
    fn soft_clip_masking_zeroes_qualities() {
        let mut read = simple_read(
            vec![
                CigarOp::new(CigarOpKind::SoftClip, 3),
                CigarOp::new(CigarOpKind::AlignmentMatch, 7),
            ],
            10,
        );
        read.mask_soft_clips(2);
        assert_eq!(&read.base_qualities[..5], &[0, 0, 0, 0, 0]);
        assert!(read.base_qualities[5..].iter().all(|&q| q == 30));
    }

    #[test]
    fn filters_apply_in_order() {
        let read = simple_read(vec![CigarOp::new(CigarOpKind::AlignmentMatch, 30)], 30);
        let mut options = ReadFilterOptions::default();
        assert!(passes_filters(&read, &options));
        options.min_mapping_quality = 61;
        assert!(!passes_filters(&read, &options));

        options.min_mapping_quality = 20;
        let mut dup = read.clone();
        dup.flags.duplicate = true;
        assert!(!passes_filters(&dup, &options));
        options.allow_duplicates = true;
        assert!(passes_filters(&dup, &options));
    }
}
