//! Probabilistic models: context indel errors, the pair-HMM, likelihood
//! memoisation, genotype priors and the de-novo mutation model.

pub mod denovo;
pub mod indel_error;
pub mod likelihood;
pub mod pair_hmm;
pub mod priors;
pub mod repeats;

pub use denovo::DeNovoModel;
pub use indel_error::{GapPenalties, IndelErrorModel};
pub use likelihood::{HaplotypeLikelihoods, ReadId};
pub use priors::PriorModel;
