//! In-memory providers.
//!
//! Useful for tests and for embedding the caller in another process that
//! already has reads in memory. The file-backed adapters on the binary
//! side implement the same traits.

use crate::basics::read::AlignedRead;
use crate::basics::region::{ContigName, GenomeRegion};
use crate::basics::variant::Variant;
use crate::core::errors::{CallerError, Result};
use crate::pipeline::providers::{
    AlignmentProvider, CallRecord, CallSink, CandidateSource, ReferenceProvider,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A reference genome held as plain byte vectors.
#[derive(Debug, Default)]
pub struct InMemoryReference {
    sequences: BTreeMap<String, Vec<u8>>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contig(mut self, name: &str, sequence: impl Into<Vec<u8>>) -> Self {
        self.sequences.insert(name.to_string(), sequence.into());
        self
    }
}

impl ReferenceProvider for InMemoryReference {
    fn fetch_sequence(&self, region: &GenomeRegion) -> Result<Vec<u8>> {
        let sequence = self.sequences.get(region.contig()).ok_or_else(|| {
            CallerError::Input(format!("unknown contig '{}'", region.contig()))
        })?;
        let begin = region.begin() as usize;
        let end = region.end() as usize;
        if end > sequence.len() {
            return Err(CallerError::Region(format!(
                "{} is out of bounds for contig of {} bases",
                region,
                sequence.len()
            )));
        }
        Ok(sequence[begin..end].to_vec())
    }

    fn contigs(&self) -> Vec<ContigName> {
        self.sequences.keys().map(ContigName::from).collect()
    }

    fn contig_size(&self, name: &str) -> Option<u64> {
        self.sequences.get(name).map(|s| s.len() as u64)
    }
}

/// Reads held per sample in memory.
#[derive(Debug, Default)]
pub struct InMemoryAlignments {
    reads: BTreeMap<String, Vec<AlignedRead>>,
}

impl InMemoryAlignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample(mut self, sample: &str, mut reads: Vec<AlignedRead>) -> Self {
        reads.sort_by(|a, b| a.region.cmp(&b.region));
        self.reads.insert(sample.to_string(), reads);
        self
    }

    pub fn add_read(&mut self, sample: &str, read: AlignedRead) {
        let reads = self.reads.entry(sample.to_string()).or_default();
        let at = reads
            .binary_search_by(|r| r.region.cmp(&read.region))
            .unwrap_or_else(|i| i);
        reads.insert(at, read);
    }
}

impl AlignmentProvider for InMemoryAlignments {
    fn samples(&self) -> Vec<String> {
        self.reads.keys().cloned().collect()
    }

    fn possible_regions(&self, sample: &str) -> Result<Vec<GenomeRegion>> {
        let reads = self
            .reads
            .get(sample)
            .ok_or_else(|| CallerError::Input(format!("unknown sample '{}'", sample)))?;
        let mut merged: Vec<GenomeRegion> = Vec::new();
        for read in reads {
            match merged.last_mut() {
                Some(last) if last.overlaps(&read.region) || last.is_adjacent(&read.region) => {
                    *last = last.encompassing(&read.region).unwrap_or_else(|| last.clone());
                }
                _ => merged.push(read.region.clone()),
            }
        }
        Ok(merged)
    }

    fn fetch_reads(
        &self,
        samples: &[String],
        region: &GenomeRegion,
    ) -> Result<BTreeMap<String, Vec<AlignedRead>>> {
        let mut out = BTreeMap::new();
        for sample in samples {
            let reads = self
                .reads
                .get(sample)
                .ok_or_else(|| CallerError::Input(format!("unknown sample '{}'", sample)))?;
            let hits: Vec<AlignedRead> = reads
                .iter()
                .filter(|r| r.region.overlaps(region))
                .cloned()
                .collect();
            out.insert(sample.clone(), hits);
        }
        Ok(out)
    }

    fn count_reads(&self, sample: &str, region: &GenomeRegion) -> Result<usize> {
        let reads = self
            .reads
            .get(sample)
            .ok_or_else(|| CallerError::Input(format!("unknown sample '{}'", sample)))?;
        Ok(reads.iter().filter(|r| r.region.overlaps(region)).count())
    }

    fn find_covered_subregion(
        &self,
        samples: &[String],
        region: &GenomeRegion,
        max_reads: usize,
    ) -> Result<GenomeRegion> {
        let mut starts: Vec<u64> = Vec::new();
        for sample in samples {
            if let Some(reads) = self.reads.get(sample) {
                starts.extend(
                    reads
                        .iter()
                        .filter(|r| r.region.overlaps(region))
                        .map(|r| r.region.begin()),
                );
            }
        }
        if starts.len() <= max_reads {
            return Ok(region.clone());
        }
        starts.sort_unstable();
        let cutoff = starts[max_reads].max(region.begin() + 1).min(region.end());
        Ok(GenomeRegion::new(region.contig(), region.begin(), cutoff))
    }
}

/// A fixed candidate list (known sites).
#[derive(Debug, Default)]
pub struct InMemoryCandidates {
    variants: Vec<Variant>,
}

impl InMemoryCandidates {
    pub fn new(mut variants: Vec<Variant>) -> Self {
        variants.sort();
        InMemoryCandidates { variants }
    }
}

impl CandidateSource for InMemoryCandidates {
    fn variants_in(&self, region: &GenomeRegion) -> Result<Vec<Variant>> {
        Ok(self
            .variants
            .iter()
            .filter(|v| v.region().overlaps(region))
            .cloned()
            .collect())
    }
}

/// Collects records in memory; the test suites read them back.
#[derive(Debug, Default)]
pub struct VecSink {
    records: Mutex<Vec<CallRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_records(self) -> Vec<CallRecord> {
        self.records.into_inner()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }
}

impl CallSink for &VecSink {
    fn write(&mut self, record: &CallRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

impl CallSink for VecSink {
    fn write(&mut self, record: &CallRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::read::{CigarOp, CigarOpKind, ReadFlags};

    fn read_at(begin: u64, len: u32) -> AlignedRead {
        AlignedRead::new(
            format!("r{}", begin),
            "chr1",
            begin,
            vec![b'A'; len as usize],
            vec![30; len as usize],
            60,
            vec![CigarOp::new(CigarOpKind::AlignmentMatch, len)],
            ReadFlags::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn reference_slices_and_bounds() {
        let reference = InMemoryReference::new().with_contig("chr1", *b"ACGTACGT");
        let slice = reference
            .fetch_sequence(&GenomeRegion::new("chr1", 2, 6))
            .unwrap();
        assert_eq!(slice, b"GTAC");
        assert!(reference
            .fetch_sequence(&GenomeRegion::new("chr1", 2, 20))
            .is_err());
        assert!(reference
            .fetch_sequence(&GenomeRegion::new("chrX", 0, 1))
            .is_err());
        assert_eq!(reference.contig_size("chr1"), Some(8));
    }

    #[test]
    fn possible_regions_merge_overlaps() {
        let alignments = InMemoryAlignments::new()
            .with_sample("s1", vec![read_at(0, 50), read_at(40, 50), read_at(200, 50)]);
        let regions = alignments.possible_regions("s1").unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], GenomeRegion::new("chr1", 0, 90));
        assert_eq!(regions[1], GenomeRegion::new("chr1", 200, 250));
    }

    #[test]
    fn covered_subregion_caps_read_count() {
        let alignments = InMemoryAlignments::new().with_sample(
            "s1",
            (0..10).map(|i| read_at(i * 10, 20)).collect(),
        );
        let whole = GenomeRegion::new("chr1", 0, 200);
        let capped = alignments
            .find_covered_subregion(&["s1".to_string()], &whole, 4)
            .unwrap();
        assert!(capped.end() <= 40);
        let uncapped = alignments
            .find_covered_subregion(&["s1".to_string()], &whole, 100)
            .unwrap();
        assert_eq!(uncapped, whole);
    }
}
