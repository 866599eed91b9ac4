//! Variants: a reference/alternate allele pair sharing one region.

use crate::basics::allele::{Allele, AlleleKind};
use crate::basics::region::GenomeRegion;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Variant {
    reference: Allele,
    alternate: Allele,
}

impl Variant {
    /// Pair a reference and alternate allele. Both must map to the same
    /// region and their sequences must differ.
    pub fn new(reference: Allele, alternate: Allele) -> Self {
        assert_eq!(reference.region(), alternate.region(), "allele regions differ");
        assert_ne!(
            reference.sequence(),
            alternate.sequence(),
            "reference and alternate sequences are identical"
        );
        Variant {
            reference,
            alternate,
        }
    }

    /// Convenience constructor from raw parts.
    pub fn from_parts(
        region: GenomeRegion,
        ref_sequence: impl Into<Vec<u8>>,
        alt_sequence: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(
            Allele::new(region.clone(), ref_sequence),
            Allele::new(region, alt_sequence),
        )
    }

    pub fn region(&self) -> &GenomeRegion {
        self.reference.region()
    }

    pub fn ref_allele(&self) -> &Allele {
        &self.reference
    }

    pub fn alt_allele(&self) -> &Allele {
        &self.alternate
    }

    pub fn kind(&self) -> AlleleKind {
        self.alternate.kind()
    }

    pub fn is_snv(&self) -> bool {
        self.alternate.is_snv()
    }

    pub fn is_mnv(&self) -> bool {
        self.alternate.is_mnv()
    }

    pub fn is_insertion(&self) -> bool {
        self.alternate.is_insertion()
    }

    pub fn is_deletion(&self) -> bool {
        self.alternate.is_deletion()
    }

    pub fn is_indel(&self) -> bool {
        self.alternate.is_indel()
    }

    pub fn alt_sequence_len(&self) -> usize {
        self.alternate.sequence_len()
    }

    /// Region-space footprint used for the size cutoff: the larger of the
    /// reference span and the alternate length.
    pub fn footprint(&self) -> u64 {
        self.region().size().max(self.alternate.sequence_len() as u64)
    }
}

pub fn are_same_type(lhs: &Variant, rhs: &Variant) -> bool {
    lhs.kind() == rhs.kind()
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region()
            .cmp(other.region())
            .then_with(|| self.alternate.cmp(&other.alternate))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}>{}",
            self.region(),
            String::from_utf8_lossy(self.reference.sequence()),
            String::from_utf8_lossy(self.alternate.sequence())
        )
    }
}
