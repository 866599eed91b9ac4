//! Core value types: genomic regions, alleles, variants and aligned reads.

pub mod allele;
pub mod read;
pub mod region;
pub mod variant;

pub use allele::{Allele, AlleleKind};
pub use read::{AlignedRead, CigarOp, CigarOpKind, ReadFlags};
pub use region::{ContigName, GenomeRegion};
pub use variant::Variant;
