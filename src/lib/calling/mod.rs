//! Inference and call extraction.
//!
//! The caller variants are a sum type rather than a trait object: each
//! carries its own parameter record, and the pipeline driver dispatches on
//! it per window.

pub mod extract;
pub mod individual;
pub mod phaser;
pub mod population;
pub mod somatic;
pub mod trio;

pub use extract::{call_trio_variants, ExtractionOptions};
pub use phaser::{HaplotypeGenerator, HaplotypeGeneratorOptions, LaggingPolicy, WindowHaplotypes};
pub use somatic::SomaticOptions;
pub use trio::{Trio, TrioLatents, TrioModel, TrioModelOptions};

/// Which inference module drives calling.
#[derive(Debug, Clone, PartialEq)]
pub enum CallerKind {
    Individual,
    Population,
    Trio(Trio),
    TumorNormal {
        normal_sample: Option<String>,
    },
}
