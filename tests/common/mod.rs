//! Shared fixtures for the end-to-end calling scenarios: a deterministic
//! read simulator over an in-memory reference, and a pipeline harness
//! that runs a caller configuration to a vector of records.
#![allow(dead_code)]

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use varweave_lib::basics::read::{AlignedRead, CigarOp, CigarOpKind, ReadFlags};
use varweave_lib::basics::region::GenomeRegion;
use varweave_lib::pipeline::driver::{resolve_regions, run_pipeline, CallerConfig};
use varweave_lib::pipeline::mem::{InMemoryAlignments, InMemoryReference, VecSink};
use varweave_lib::pipeline::providers::CallRecord;

pub const BASE_QUALITY: u8 = 35;
pub const MAPPING_QUALITY: u8 = 60;

/// A repeating ACGT reference of the requested length.
pub fn pattern_reference(len: usize) -> Vec<u8> {
    b"ACGT".repeat(len / 4 + 1)[..len].to_vec()
}

/// A deterministic non-repetitive reference (plain LCG over ACGT), for
/// scenarios where a periodic sequence would be ambiguous (re-assembly).
pub fn varied_reference(len: usize) -> Vec<u8> {
    let mut state = 0x9e3779b9u32;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            b"ACGT"[(state >> 16) as usize % 4]
        })
        .collect()
}

fn flags(forward: bool) -> ReadFlags {
    ReadFlags {
        reverse_strand: !forward,
        ..ReadFlags::default()
    }
}

/// A fully matched read copying the given sequence.
pub fn matched_read(
    name: &str,
    begin: u64,
    sequence: Vec<u8>,
    forward: bool,
) -> AlignedRead {
    let len = sequence.len() as u32;
    AlignedRead::new(
        name,
        "chr1",
        begin,
        sequence.clone(),
        vec![BASE_QUALITY; sequence.len()],
        MAPPING_QUALITY,
        vec![CigarOp::new(CigarOpKind::AlignmentMatch, len)],
        flags(forward),
        None,
    )
    .unwrap()
}

/// A read with an explicit CIGAR (for indel carriers).
pub fn cigar_read(
    name: &str,
    begin: u64,
    sequence: Vec<u8>,
    cigar: Vec<CigarOp>,
    forward: bool,
) -> AlignedRead {
    AlignedRead::new(
        name,
        "chr1",
        begin,
        sequence.clone(),
        vec![BASE_QUALITY; sequence.len()],
        MAPPING_QUALITY,
        cigar,
        flags(forward),
        None,
    )
    .unwrap()
}

/// `count` reads of the reference slice `begin..begin + len`, strands
/// alternating.
pub fn reference_reads(
    reference: &[u8],
    begin: u64,
    len: usize,
    count: usize,
    name_prefix: &str,
) -> Vec<AlignedRead> {
    (0..count)
        .map(|i| {
            matched_read(
                &format!("{}{}", name_prefix, i),
                begin,
                reference[begin as usize..begin as usize + len].to_vec(),
                i % 2 == 0,
            )
        })
        .collect()
}

/// Reads of the same slice carrying a single substituted base.
pub fn snv_reads(
    reference: &[u8],
    begin: u64,
    len: usize,
    position: u64,
    alt: u8,
    count: usize,
    name_prefix: &str,
) -> Vec<AlignedRead> {
    (0..count)
        .map(|i| {
            let mut sequence = reference[begin as usize..begin as usize + len].to_vec();
            sequence[(position - begin) as usize] = alt;
            matched_read(
                &format!("{}{}", name_prefix, i),
                begin,
                sequence,
                i % 2 == 0,
            )
        })
        .collect()
}

/// Run the pipeline over one contig with one worker and collect records.
pub fn run_calling(
    reference_bases: Vec<u8>,
    samples: Vec<(&str, Vec<AlignedRead>)>,
    config: CallerConfig,
) -> Vec<CallRecord> {
    let contig_len = reference_bases.len() as u64;
    let reference = Arc::new(InMemoryReference::new().with_contig("chr1", reference_bases));
    let mut alignments = InMemoryAlignments::new();
    for (sample, reads) in samples {
        alignments = alignments.with_sample(sample, reads);
    }
    let alignments = Arc::new(alignments);
    let regions = resolve_regions(
        reference.as_ref(),
        &[GenomeRegion::new("chr1", 0, contig_len)],
        &[],
        config.chunk_size,
    )
    .unwrap();
    let mut sink = VecSink::new();
    let stop = Arc::new(AtomicBool::new(false));
    run_pipeline(
        reference,
        alignments,
        None,
        config,
        regions,
        &mut sink,
        stop,
    )
    .unwrap();
    sink.into_records()
}
