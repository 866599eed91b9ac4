//! varweave: a Bayesian haplotype-based small-variant caller.
//!
//! The library is organised bottom-up:
//! - [`basics`]: genomic regions, alleles, variants and aligned reads
//! - [`haplotype`]: haplotype materialisation, genotypes and the
//!   haplotype tree
//! - [`models`]: context indel error models, the pair-HMM, likelihood
//!   memoisation, genotype priors and the de-novo model
//! - [`scanner`]: candidate generation from read alignments
//! - [`calling`]: joint inference (individual, population, trio,
//!   tumor/normal), call extraction and the windowed phaser
//! - [`pipeline`]: provider seams, the parallel region driver and sinks
//! - [`core`]: errors, numerics and thread-pool plumbing

pub mod basics;
pub mod calling;
pub mod core;
pub mod haplotype;
pub mod models;
pub mod pipeline;
pub mod scanner;
