//! The narrow seams to the outside world.
//!
//! Reference bases, aligned reads and optional externally supplied
//! candidates come in through these traits; calls go out through
//! [`CallSink`]. Everything inside the caller is I/O free.

use crate::basics::read::AlignedRead;
use crate::basics::region::{ContigName, GenomeRegion};
use crate::basics::variant::Variant;
use crate::core::errors::Result;
use crate::core::maths::Phred;
use serde::Serialize;
use std::collections::BTreeMap;

/// Read-only access to the reference genome.
pub trait ReferenceProvider: Send + Sync {
    fn fetch_sequence(&self, region: &GenomeRegion) -> Result<Vec<u8>>;
    fn contigs(&self) -> Vec<ContigName>;
    fn contig_size(&self, name: &str) -> Option<u64>;
}

/// Access to aligned reads, keyed by sample.
pub trait AlignmentProvider: Send + Sync {
    fn samples(&self) -> Vec<String>;

    /// Regions with any coverage for the sample, merged and sorted.
    fn possible_regions(&self, sample: &str) -> Result<Vec<GenomeRegion>>;

    fn fetch_reads(
        &self,
        samples: &[String],
        region: &GenomeRegion,
    ) -> Result<BTreeMap<String, Vec<AlignedRead>>>;

    fn count_reads(&self, sample: &str, region: &GenomeRegion) -> Result<usize>;

    /// The longest prefix of `region` whose combined read count stays
    /// within `max_reads`.
    fn find_covered_subregion(
        &self,
        samples: &[String],
        region: &GenomeRegion,
        max_reads: usize,
    ) -> Result<GenomeRegion>;
}

/// An optional external source of candidate variants merged with the
/// scanner's output (e.g. a local assembler or a known-sites file).
pub trait CandidateSource: Send + Sync {
    fn variants_in(&self, region: &GenomeRegion) -> Result<Vec<Variant>>;
}

/// The kind of call a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallKind {
    Germline,
    Denovo,
    Somatic,
    Reference,
}

/// One sample's genotype at a called site.
#[derive(Debug, Clone, Serialize)]
pub struct SampleCall {
    pub sample: String,
    /// Allele indices in VCF convention: 0 = reference, 1.. = alternates.
    pub gt_indices: Vec<u8>,
    pub phased: bool,
    pub phase_set: Option<u64>,
    /// Phred-scaled confidence in the genotype.
    pub genotype_quality: f64,
}

impl SampleCall {
    /// Render the genotype the way VCF does: `0/1` or `0|1`.
    pub fn gt_string(&self) -> String {
        let sep = if self.phased { "|" } else { "/" };
        self.gt_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// A called site ready for emission.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub kind: CallKind,
    pub variant: Variant,
    pub posterior: Phred,
    pub depth: u32,
    pub mapping_quality: f64,
    pub samples: Vec<SampleCall>,
    /// Ordered INFO annotations (PP, MP, MAP_VAF, VAF_CR, SOMATIC, HO).
    pub info: Vec<(String, String)>,
}

impl CallRecord {
    pub fn region(&self) -> &GenomeRegion {
        self.variant.region()
    }
}

/// Where finished call records go. Records arrive in genomic order.
pub trait CallSink {
    fn write(&mut self, record: &CallRecord) -> Result<()>;

    /// Called once after the final record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
