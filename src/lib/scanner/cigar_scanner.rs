//! Candidate generation from read alignments.
//!
//! The scanner walks every read's CIGAR against the reference, emitting
//! candidate variants (SNVs from mismatch scans, MNVs from substitution
//! blocks, indels from I/D operations) and accumulating a misalignment
//! penalty as it goes. Reads whose penalty makes correct alignment
//! implausible have their candidates diverted to a diagnostics-only set.
//! `generate` then aggregates matching candidates into per-sample
//! observation records and admits them through the inclusion policy.

use crate::basics::allele::Allele;
use crate::basics::read::{AlignedRead, CigarOpKind};
use crate::basics::region::GenomeRegion;
use crate::basics::variant::{are_same_type, Variant};
use crate::core::errors::Result;
use crate::core::maths::{log_poisson_sf, phred_to_probability_wrong};
use crate::pipeline::providers::ReferenceProvider;
use crate::scanner::inclusion::InclusionPolicy;
use std::sync::Arc;

/// Per-sample interval coverage with point-depth queries.
#[derive(Debug, Default, Clone)]
pub struct CoverageTracker {
    intervals: Vec<(u64, u64)>,
}

impl CoverageTracker {
    pub fn add(&mut self, region: &GenomeRegion) {
        self.intervals.push((region.begin(), region.end()));
    }

    /// Minimum depth across the region's positions. Empty regions are
    /// treated as the point base to their right.
    pub fn min(&self, region: &GenomeRegion) -> u32 {
        let begin = region.begin();
        let end = if region.is_empty() {
            begin + 1
        } else {
            region.end()
        };
        let mut depth: i64 = self
            .intervals
            .iter()
            .filter(|&&(s, e)| s <= begin && e > begin)
            .count() as i64;
        let mut events: Vec<(u64, i64)> = Vec::new();
        for &(s, e) in &self.intervals {
            if s > begin && s < end {
                events.push((s, 1));
            }
            if e > begin && e < end {
                events.push((e, -1));
            }
        }
        events.sort_unstable();
        let mut min_depth = depth;
        let mut i = 0;
        while i < events.len() {
            let position = events[i].0;
            while i < events.len() && events[i].0 == position {
                depth += events[i].1;
                i += 1;
            }
            min_depth = min_depth.min(depth);
        }
        min_depth.max(0) as u32
    }
}

/// One raw candidate observation from one read.
#[derive(Debug, Clone)]
struct Candidate {
    variant: Variant,
    sample_index: usize,
    base_quality_sum: u32,
    mapping_quality: u8,
    forward_strand: bool,
    edge: bool,
}

/// Per-sample statistics for a run of matching candidates.
#[derive(Debug, Clone)]
pub struct SampleObservation {
    pub sample_index: usize,
    pub depth: u32,
    pub forward_depth: u32,
    pub observed_base_qualities: Vec<u32>,
    pub observed_mapping_qualities: Vec<u8>,
    pub forward_support: u32,
    pub edge_support: u32,
}

/// A candidate variant with everything the inclusion policy needs.
#[derive(Debug, Clone)]
pub struct VariantObservation {
    pub variant: Variant,
    pub total_depth: u32,
    pub samples: Vec<SampleObservation>,
}

/// Penalties and thresholds for the misalignment test.
#[derive(Debug, Clone)]
pub struct MisalignmentParameters {
    pub snv_penalty: f64,
    /// Only mismatches at or above this base quality accrue `snv_penalty`.
    pub snv_threshold: u8,
    pub indel_penalty: f64,
    pub clip_penalty: f64,
    pub max_unpenalised_clip_size: u32,
    pub max_expected_mutation_rate: f64,
    pub min_ln_prob_correctly_aligned: f64,
}

impl Default for MisalignmentParameters {
    fn default() -> Self {
        MisalignmentParameters {
            snv_penalty: 1.0,
            snv_threshold: 30,
            indel_penalty: 1.0,
            clip_penalty: 1.0,
            max_unpenalised_clip_size: 5,
            max_expected_mutation_rate: 1e-3,
            min_ln_prob_correctly_aligned: (1e-4f64).ln(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerOptions {
    pub misalignment: MisalignmentParameters,
    pub max_variant_size: u64,
    pub inclusion: InclusionPolicy,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        ScannerOptions {
            misalignment: MisalignmentParameters::default(),
            max_variant_size: 2000,
            inclusion: InclusionPolicy::Germline,
        }
    }
}

pub struct CigarScanner {
    reference: Arc<dyn ReferenceProvider>,
    options: ScannerOptions,
    samples: Vec<String>,
    candidates: Vec<Candidate>,
    likely_misaligned: Vec<Candidate>,
    buffer: Vec<Candidate>,
    max_seen_candidate_size: u64,
    combined_coverage: CoverageTracker,
    sample_coverage: Vec<CoverageTracker>,
    sample_forward_coverage: Vec<CoverageTracker>,
}

impl CigarScanner {
    pub fn new(
        reference: Arc<dyn ReferenceProvider>,
        samples: Vec<String>,
        options: ScannerOptions,
    ) -> Self {
        let n = samples.len();
        CigarScanner {
            reference,
            options,
            samples,
            candidates: Vec::new(),
            likely_misaligned: Vec::new(),
            buffer: Vec::with_capacity(100),
            max_seen_candidate_size: 0,
            combined_coverage: CoverageTracker::default(),
            sample_coverage: vec![CoverageTracker::default(); n],
            sample_forward_coverage: vec![CoverageTracker::default(); n],
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    fn sample_index(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == sample)
    }

    /// Scan one read's CIGAR, buffering its candidates and scoring its
    /// misalignment penalty; then commit the buffer to the candidate set
    /// or the misaligned set.
    pub fn add_read(&mut self, sample: &str, read: &AlignedRead) -> Result<()> {
        let Some(sample_index) = self.sample_index(sample) else {
            return Ok(());
        };
        self.buffer.clear();
        let contig = read.region.contig().to_string();
        let mut ref_index = read.region.begin();
        let mut read_index = 0usize;
        let mut penalty = 0.0f64;
        let params = self.options.misalignment.clone();
        for op in read.cigar.clone() {
            let op_size = op.len as u64;
            match op.kind {
                CigarOpKind::AlignmentMatch => {
                    let region = GenomeRegion::new(&contig, ref_index, ref_index + op_size);
                    penalty +=
                        self.scan_match_range(&region, read, read_index, sample_index, &params)?;
                    read_index += op.len as usize;
                    ref_index += op_size;
                }
                CigarOpKind::SequenceMatch => {
                    read_index += op.len as usize;
                    ref_index += op_size;
                }
                CigarOpKind::Substitution => {
                    let region = GenomeRegion::new(&contig, ref_index, ref_index + op_size);
                    let ref_seq = self.reference.fetch_sequence(&region)?;
                    let alt_seq =
                        read.sequence[read_index..read_index + op.len as usize].to_vec();
                    // tolerate malformed X ops that match the reference
                    if ref_seq != alt_seq {
                        self.buffer_candidate(
                            region,
                            ref_seq,
                            alt_seq,
                            read,
                            read_index,
                            sample_index,
                        );
                        penalty += op_size as f64 * params.snv_penalty;
                    }
                    read_index += op.len as usize;
                    ref_index += op_size;
                }
                CigarOpKind::Insertion => {
                    let region = GenomeRegion::point(&contig, ref_index);
                    let alt_seq =
                        read.sequence[read_index..read_index + op.len as usize].to_vec();
                    self.buffer_candidate(region, Vec::new(), alt_seq, read, read_index, sample_index);
                    read_index += op.len as usize;
                    penalty += params.indel_penalty;
                }
                CigarOpKind::Deletion => {
                    let region = GenomeRegion::new(&contig, ref_index, ref_index + op_size);
                    let ref_seq = self.reference.fetch_sequence(&region)?;
                    self.buffer_candidate(region, ref_seq, Vec::new(), read, read_index, sample_index);
                    ref_index += op_size;
                    penalty += params.indel_penalty;
                }
                CigarOpKind::SoftClip => {
                    read_index += op.len as usize;
                    if op.len > params.max_unpenalised_clip_size {
                        penalty += params.clip_penalty;
                    }
                }
                CigarOpKind::HardClip => {
                    if op.len > params.max_unpenalised_clip_size {
                        penalty += params.clip_penalty;
                    }
                }
                CigarOpKind::Padding | CigarOpKind::Skipped => {
                    ref_index += op_size;
                }
            }
        }
        self.combined_coverage.add(&read.region);
        self.sample_coverage[sample_index].add(&read.region);
        if read.is_forward_strand() {
            self.sample_forward_coverage[sample_index].add(&read.region);
        }
        if self.is_likely_misaligned(read, penalty) {
            log::trace!(
                "read {} looks misaligned (penalty {:.1}); diverting {} candidates",
                read.name,
                penalty,
                self.buffer.len()
            );
            self.likely_misaligned.append(&mut self.buffer);
        } else {
            self.candidates.append(&mut self.buffer);
        }
        Ok(())
    }

    fn scan_match_range(
        &mut self,
        region: &GenomeRegion,
        read: &AlignedRead,
        read_start: usize,
        sample_index: usize,
        params: &MisalignmentParameters,
    ) -> Result<f64> {
        let ref_segment = self.reference.fetch_sequence(region)?;
        let mut penalty = 0.0;
        for (offset, &ref_base) in ref_segment.iter().enumerate() {
            let read_index = read_start + offset;
            let read_base = read.sequence[read_index];
            if ref_base != read_base && ref_base != b'N' && read_base != b'N' {
                let begin = region.begin() + offset as u64;
                self.buffer_candidate(
                    GenomeRegion::new(region.contig(), begin, begin + 1),
                    vec![ref_base],
                    vec![read_base],
                    read,
                    read_index,
                    sample_index,
                );
                if read.base_qualities[read_index] >= params.snv_threshold {
                    penalty += params.snv_penalty;
                }
            }
        }
        Ok(penalty)
    }

    fn buffer_candidate(
        &mut self,
        region: GenomeRegion,
        ref_sequence: Vec<u8>,
        alt_sequence: Vec<u8>,
        read: &AlignedRead,
        read_offset: usize,
        sample_index: usize,
    ) {
        let variant = Variant::new(
            Allele::new(region.clone(), ref_sequence),
            Allele::new(region, alt_sequence),
        );
        if variant.footprint() > self.options.max_variant_size {
            return;
        }
        let alt_len = variant.alt_sequence_len();
        let base_quality_sum: u32 = read.base_qualities
            [read_offset..(read_offset + alt_len).min(read.base_qualities.len())]
            .iter()
            .map(|&q| q as u32)
            .sum();
        let edge = variant.region().begin() == read.region.begin()
            || variant.region().end() == read.region.end();
        self.max_seen_candidate_size = self.max_seen_candidate_size.max(variant.footprint());
        self.buffer.push(Candidate {
            variant,
            sample_index,
            base_quality_sum,
            mapping_quality: read.mapping_quality,
            forward_strand: read.is_forward_strand(),
            edge,
        });
    }

    /// `ln P(read correctly aligned)` from the accumulated penalty: the
    /// probability the mapper placed it right times the Poisson survival
    /// of seeing that much divergence from real mutations.
    fn ln_probability_correctly_aligned(&self, penalty: f64, read: &AlignedRead) -> f64 {
        let k = penalty.floor() as u32;
        if k == 0 {
            return 0.0;
        }
        let prob_mismapped =
            phred_to_probability_wrong(read.mapping_quality as f64).max(f64::MIN_POSITIVE);
        let ln_prob_mapped = (1.0 - prob_mismapped).max(f64::MIN_POSITIVE).ln();
        let mu = self.options.misalignment.max_expected_mutation_rate * read.region.size() as f64;
        ln_prob_mapped + log_poisson_sf(k, mu)
    }

    fn is_likely_misaligned(&self, read: &AlignedRead, penalty: f64) -> bool {
        self.ln_probability_correctly_aligned(penalty, read)
            < self.options.misalignment.min_ln_prob_correctly_aligned
    }

    /// Soft equality for aggregation: identical candidates, equal-length
    /// insertions with the same ambiguity count, or overlapping indels
    /// near repeats.
    fn candidates_match(lhs: &Variant, rhs: &Variant) -> bool {
        if !are_same_type(lhs, rhs) || lhs.is_snv() || lhs.is_mnv() {
            return lhs == rhs;
        }
        if lhs.is_insertion() && lhs.alt_sequence_len() == rhs.alt_sequence_len() {
            return lhs.alt_allele().n_count() == rhs.alt_allele().n_count();
        }
        lhs.region().overlaps(rhs.region())
    }

    fn min_depth(variant: &Variant, tracker: &CoverageTracker) -> u32 {
        if variant.is_insertion() {
            let region = variant.region();
            let expanded = region.expanded(if region.begin() > 0 { 1 } else { 0 }, 1);
            tracker.min(&expanded)
        } else {
            tracker.min(variant.region())
        }
    }

    fn make_observation(&self, run: &[&Candidate]) -> VariantObservation {
        let variant = run[0].variant.clone();
        let total_depth = Self::min_depth(&variant, &self.combined_coverage);
        let mut by_sample: Vec<Vec<&Candidate>> = vec![Vec::new(); self.samples.len()];
        for candidate in run {
            by_sample[candidate.sample_index].push(candidate);
        }
        let mut samples = Vec::new();
        for (sample_index, observations) in by_sample.into_iter().enumerate() {
            if observations.is_empty() {
                continue;
            }
            let num_observations = observations.len() as u32;
            let forward_support = observations.iter().filter(|c| c.forward_strand).count() as u32;
            let edge_support = observations.iter().filter(|c| c.edge).count() as u32;
            let depth = Self::min_depth(&variant, &self.sample_coverage[sample_index])
                .max(num_observations);
            let forward_depth =
                Self::min_depth(&variant, &self.sample_forward_coverage[sample_index]);
            samples.push(SampleObservation {
                sample_index,
                depth,
                forward_depth,
                observed_base_qualities: observations
                    .iter()
                    .map(|c| c.base_quality_sum)
                    .collect(),
                observed_mapping_qualities: observations
                    .iter()
                    .map(|c| c.mapping_quality)
                    .collect(),
                forward_support,
                edge_support,
            });
        }
        VariantObservation {
            variant,
            total_depth,
            samples,
        }
    }

    /// Freeze and aggregate the candidate set for a region: group matching
    /// candidates, synthesise observations, admit through the inclusion
    /// policy, and return the admitted variants sorted and deduplicated.
    pub fn generate(&mut self, region: &GenomeRegion) -> Vec<Variant> {
        self.candidates.sort_by(|a, b| a.variant.cmp(&b.variant));
        self.likely_misaligned.sort_by(|a, b| a.variant.cmp(&b.variant));
        let viable: Vec<&Candidate> = self
            .candidates
            .iter()
            .filter(|c| c.variant.region().overlaps(region))
            .collect();
        let mut result: Vec<Variant> = Vec::new();
        let mut i = 0;
        while i < viable.len() {
            let mut j = i + 1;
            while j < viable.len()
                && Self::candidates_match(&viable[j].variant, &viable[i].variant)
            {
                j += 1;
            }
            let observation = self.make_observation(&viable[i..j]);
            if self.options.inclusion.include(&observation) {
                for candidate in &viable[i..j] {
                    if result.last() != Some(&candidate.variant) {
                        result.push(candidate.variant.clone());
                    }
                }
            }
            i = j;
        }
        result.sort();
        result.dedup();
        if log::log_enabled!(log::Level::Debug) {
            let novel = self.novel_misaligned_candidates(&result, region);
            if !novel.is_empty() {
                log::debug!(
                    "ignoring {} unique candidates from likely misaligned reads in {}",
                    novel.len(),
                    region
                );
            }
        }
        result
    }

    /// Raw observation counts per candidate variant, for holdout
    /// rarity ranking.
    pub fn observation_counts(
        &self,
        region: &GenomeRegion,
    ) -> rustc_hash::FxHashMap<Variant, u32> {
        let mut counts = rustc_hash::FxHashMap::default();
        for candidate in &self.candidates {
            if candidate.variant.region().overlaps(region) {
                *counts.entry(candidate.variant.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Minimum combined depth over a region.
    pub fn total_depth(&self, region: &GenomeRegion) -> u32 {
        self.combined_coverage.min(region)
    }

    /// Candidates seen only on likely-misaligned reads (diagnostics).
    pub fn novel_misaligned_candidates(
        &self,
        current: &[Variant],
        region: &GenomeRegion,
    ) -> Vec<Variant> {
        let mut unique: Vec<Variant> = self
            .likely_misaligned
            .iter()
            .filter(|c| c.variant.region().overlaps(region))
            .map(|c| c.variant.clone())
            .collect();
        unique.sort();
        unique.dedup();
        unique.retain(|v| current.binary_search(v).is_err());
        unique
    }

    /// Drop all accumulated state for the next region.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.likely_misaligned.clear();
        self.buffer.clear();
        self.max_seen_candidate_size = 0;
        self.combined_coverage = CoverageTracker::default();
        for tracker in &mut self.sample_coverage {
            *tracker = CoverageTracker::default();
        }
        for tracker in &mut self.sample_forward_coverage {
            *tracker = CoverageTracker::default();
        }
    }
}
