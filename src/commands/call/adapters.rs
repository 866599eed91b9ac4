//! File-backed providers: indexed FASTA for the reference and indexed BAM
//! for reads. These are the only modules that touch alignment or
//! reference files; everything behind the provider traits is I/O free.

use bio::io::fasta;
use parking_lot::Mutex;
use rust_htslib::bam::{self, Read as BamRead};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use varweave_lib::basics::read::{
    AlignedRead, CigarOp, CigarOpKind, MateInfo, ReadFlags,
};
use varweave_lib::basics::region::{ContigName, GenomeRegion};
use varweave_lib::core::errors::{CallerError, Result};
use varweave_lib::pipeline::providers::{AlignmentProvider, ReferenceProvider};
use varweave_lib::pipeline::read_pool::OpenFilePool;

/// Reference provider over an indexed FASTA.
pub struct FastaReference {
    reader: Mutex<fasta::IndexedReader<File>>,
    contigs: Vec<(ContigName, u64)>,
}

impl FastaReference {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CallerError::Input(format!(
                "FASTA file not found: {}",
                path.display()
            )));
        }
        let index_path = format!("{}.fai", path.display());
        if !Path::new(&index_path).exists() {
            return Err(CallerError::Input(format!(
                "FASTA index not found: {}. Create it with: samtools faidx {}",
                index_path,
                path.display()
            )));
        }
        let reader = fasta::IndexedReader::from_file(&path).map_err(|e| {
            CallerError::Input(format!("failed to open {}: {}", path.display(), e))
        })?;
        let contigs = reader
            .index
            .sequences()
            .into_iter()
            .map(|s| (ContigName::from(s.name.as_str()), s.len))
            .collect();
        Ok(FastaReference {
            reader: Mutex::new(reader),
            contigs,
        })
    }
}

impl ReferenceProvider for FastaReference {
    fn fetch_sequence(&self, region: &GenomeRegion) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock();
        reader
            .fetch(region.contig(), region.begin(), region.end())
            .map_err(|e| CallerError::Region(format!("cannot fetch {}: {}", region, e)))?;
        let mut sequence = Vec::with_capacity(region.size() as usize);
        reader
            .read(&mut sequence)
            .map_err(|e| CallerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        sequence.make_ascii_uppercase();
        Ok(sequence)
    }

    fn contigs(&self) -> Vec<ContigName> {
        self.contigs.iter().map(|(name, _)| name.clone()).collect()
    }

    fn contig_size(&self, name: &str) -> Option<u64> {
        self.contigs
            .iter()
            .find(|(contig, _)| contig == name)
            .map(|(_, size)| *size)
    }
}

/// Alignment provider over per-sample indexed BAMs, sharing readers
/// through the LRU open-file pool.
pub struct HtslibAlignments {
    samples: Vec<(String, PathBuf)>,
    pool: OpenFilePool<bam::IndexedReader>,
}

impl HtslibAlignments {
    pub fn open(samples: Vec<(String, PathBuf)>, max_open_files: usize) -> Result<Self> {
        for (sample, path) in &samples {
            if !path.exists() {
                return Err(CallerError::Input(format!(
                    "alignment file for sample '{}' not found: {}",
                    sample,
                    path.display()
                )));
            }
        }
        Ok(HtslibAlignments {
            samples,
            pool: OpenFilePool::new(max_open_files),
        })
    }

    fn path_of(&self, sample: &str) -> Result<&Path> {
        self.samples
            .iter()
            .find(|(name, _)| name == sample)
            .map(|(_, path)| path.as_path())
            .ok_or_else(|| CallerError::Input(format!("unknown sample '{}'", sample)))
    }

    fn open_reader(path: &Path) -> Result<bam::IndexedReader> {
        bam::IndexedReader::from_path(path).map_err(|e| {
            CallerError::Input(format!("failed to open {}: {}", path.display(), e))
        })
    }

    fn convert_record(record: &bam::Record, contig: &str, header: &bam::HeaderView) -> Result<AlignedRead> {
        if record.pos() < 0 {
            return Err(CallerError::Data(format!(
                "negative position for read {}",
                String::from_utf8_lossy(record.qname())
            )));
        }
        let cigar: Vec<CigarOp> = record
            .cigar()
            .iter()
            .map(|op| {
                use rust_htslib::bam::record::Cigar;
                match *op {
                    Cigar::Match(len) => CigarOp::new(CigarOpKind::AlignmentMatch, len),
                    Cigar::Equal(len) => CigarOp::new(CigarOpKind::SequenceMatch, len),
                    Cigar::Diff(len) => CigarOp::new(CigarOpKind::Substitution, len),
                    Cigar::Ins(len) => CigarOp::new(CigarOpKind::Insertion, len),
                    Cigar::Del(len) => CigarOp::new(CigarOpKind::Deletion, len),
                    Cigar::RefSkip(len) => CigarOp::new(CigarOpKind::Skipped, len),
                    Cigar::SoftClip(len) => CigarOp::new(CigarOpKind::SoftClip, len),
                    Cigar::HardClip(len) => CigarOp::new(CigarOpKind::HardClip, len),
                    Cigar::Pad(len) => CigarOp::new(CigarOpKind::Padding, len),
                }
            })
            .collect();
        let flags = ReadFlags {
            reverse_strand: record.is_reverse(),
            duplicate: record.is_duplicate(),
            secondary: record.is_secondary(),
            supplementary: record.is_supplementary(),
            qc_fail: record.is_quality_check_failed(),
            unmapped: record.is_unmapped(),
        };
        let mate = if record.is_paired() && record.mtid() >= 0 && record.mpos() >= 0 {
            std::str::from_utf8(header.tid2name(record.mtid() as u32))
                .ok()
                .map(|mate_contig| MateInfo {
                    contig: mate_contig.to_string(),
                    begin: record.mpos() as u64,
                    unmapped: record.is_mate_unmapped(),
                })
        } else {
            None
        };
        AlignedRead::new(
            String::from_utf8_lossy(record.qname()).into_owned(),
            contig,
            record.pos() as u64,
            record.seq().as_bytes(),
            record.qual().to_vec(),
            record.mapq(),
            cigar,
            flags,
            mate,
        )
    }

    fn fetch_sample_reads(
        &self,
        sample: &str,
        region: &GenomeRegion,
    ) -> Result<Vec<AlignedRead>> {
        let path = self.path_of(sample)?;
        self.pool.with_reader(path, Self::open_reader, |reader| {
            let header = reader.header().clone();
            let tid = match header.tid(region.contig().as_bytes()) {
                Some(tid) => tid,
                None => return Ok(Vec::new()),
            };
            reader
                .fetch((tid, region.begin() as i64, region.end().max(region.begin() + 1) as i64))
                .map_err(|e| CallerError::Transient(format!("fetch {} failed: {}", region, e)))?;
            let mut reads = Vec::new();
            let mut dropped = 0usize;
            for result in reader.records() {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        log::debug!("skipping malformed record: {}", e);
                        dropped += 1;
                        continue;
                    }
                };
                match Self::convert_record(&record, region.contig(), &header) {
                    Ok(read) => reads.push(read),
                    Err(e) => {
                        log::debug!("dropping read: {}", e);
                        dropped += 1;
                    }
                }
            }
            if dropped > 0 {
                log::debug!("{}: dropped {} malformed reads for {}", region, dropped, sample);
            }
            Ok(reads)
        })
    }
}

impl AlignmentProvider for HtslibAlignments {
    fn samples(&self) -> Vec<String> {
        self.samples.iter().map(|(name, _)| name.clone()).collect()
    }

    fn possible_regions(&self, sample: &str) -> Result<Vec<GenomeRegion>> {
        let path = self.path_of(sample)?;
        self.pool.with_reader(path, Self::open_reader, |reader| {
            let header = reader.header();
            let mut regions = Vec::new();
            for tid in 0..header.target_count() {
                let name = std::str::from_utf8(header.tid2name(tid))
                    .map_err(|_| CallerError::Data("non-UTF8 contig name".to_string()))?;
                if let Some(len) = header.target_len(tid) {
                    regions.push(GenomeRegion::new(name, 0, len));
                }
            }
            Ok(regions)
        })
    }

    fn fetch_reads(
        &self,
        samples: &[String],
        region: &GenomeRegion,
    ) -> Result<BTreeMap<String, Vec<AlignedRead>>> {
        let mut out = BTreeMap::new();
        for sample in samples {
            out.insert(sample.clone(), self.fetch_sample_reads(sample, region)?);
        }
        Ok(out)
    }

    fn count_reads(&self, sample: &str, region: &GenomeRegion) -> Result<usize> {
        Ok(self.fetch_sample_reads(sample, region)?.len())
    }

    fn find_covered_subregion(
        &self,
        samples: &[String],
        region: &GenomeRegion,
        max_reads: usize,
    ) -> Result<GenomeRegion> {
        let mut starts: Vec<u64> = Vec::new();
        for sample in samples {
            starts.extend(
                self.fetch_sample_reads(sample, region)?
                    .iter()
                    .map(|read| read.region.begin()),
            );
        }
        if starts.len() <= max_reads {
            return Ok(region.clone());
        }
        starts.sort_unstable();
        let cutoff = starts[max_reads]
            .max(region.begin() + 1)
            .min(region.end());
        Ok(GenomeRegion::new(region.contig(), region.begin(), cutoff))
    }
}
