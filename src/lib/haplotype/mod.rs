//! Haplotypes, genotypes and the haplotype tree.

pub mod genotype;
#[allow(clippy::module_inception)]
pub mod haplotype;
pub mod tree;

pub use genotype::{generate_all_genotypes, inverse_table, Genotype};
pub use haplotype::{Haplotype, HaplotypeArena, HaplotypeId};
pub use tree::HaplotypeTree;
