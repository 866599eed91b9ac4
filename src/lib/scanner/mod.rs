//! Candidate variant generation from read alignments.

pub mod assembler;
pub mod cigar_scanner;
pub mod inclusion;

pub use assembler::{Assembler, AssemblerOptions};
pub use cigar_scanner::{
    CigarScanner, CoverageTracker, MisalignmentParameters, SampleObservation, ScannerOptions,
    VariantObservation,
};
pub use inclusion::InclusionPolicy;
