//! Local re-assembly candidate generation.
//!
//! A supplemental generator for variants the CIGAR scanner struggles
//! with (indels the aligner splits or shifts). The active region is
//! tiled into small assembly windows; in each window the reads' solid
//! k-mers (every base at or above the quality floor, seen at least
//! twice) feed a consensus walk seeded on the reference: the walk
//! follows the best-supported extension and forks a bounded number of
//! branches where a second extension is also solid, so heterozygous
//! paths survive. Each resulting contig is realigned globally against
//! the reference window and the differences become candidate variants.
//! Window edges are excluded from calling, and contigs that failed to
//! span the window are discarded.

use crate::basics::read::AlignedRead;
use crate::basics::region::GenomeRegion;
use crate::basics::variant::Variant;
use rustc_hash::FxHashMap;

const ASSEMBLY_WINDOW: u64 = 200;
const ASSEMBLY_STRIDE: u64 = 150;
const MIN_KMER_COUNT: u32 = 2;
const MAX_CONTIGS_PER_WINDOW: usize = 16;

#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    pub kmer_sizes: Vec<usize>,
    /// Only k-mers whose bases all meet this quality seed the walk.
    pub min_base_quality: u8,
    pub max_variant_size: u64,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            kmer_sizes: vec![10, 25],
            min_base_quality: 15,
            max_variant_size: 2000,
        }
    }
}

#[derive(Debug)]
pub struct Assembler {
    options: AssemblerOptions,
}

impl Assembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Assembler { options }
    }

    /// Assemble candidates over `region`. `reference` must cover exactly
    /// `region`; `reads` are everything overlapping it.
    pub fn generate(
        &self,
        region: &GenomeRegion,
        reference: &[u8],
        reads: &[&AlignedRead],
    ) -> Vec<Variant> {
        debug_assert_eq!(reference.len() as u64, region.size());
        let mut variants: Vec<Variant> = Vec::new();
        let mut win_begin = region.begin();
        while win_begin < region.end() {
            let win_end = (win_begin + ASSEMBLY_WINDOW).min(region.end());
            let window = GenomeRegion::new(region.contig(), win_begin, win_end);
            let lo = (win_begin - region.begin()) as usize;
            let hi = (win_end - region.begin()) as usize;
            let window_reads: Vec<&AlignedRead> = reads
                .iter()
                .filter(|read| read.region.overlaps(&window))
                .copied()
                .collect();
            if !window_reads.is_empty() {
                self.assemble_window(&window, &reference[lo..hi], &window_reads, &mut variants);
            }
            win_begin += ASSEMBLY_STRIDE;
        }
        variants.retain(|v| v.footprint() <= self.options.max_variant_size);
        variants.sort();
        variants.dedup();
        variants
    }

    fn assemble_window(
        &self,
        window: &GenomeRegion,
        ref_slice: &[u8],
        reads: &[&AlignedRead],
        out: &mut Vec<Variant>,
    ) {
        for &k in &self.options.kmer_sizes {
            if k == 0 || ref_slice.len() < 2 * k + 2 {
                continue;
            }
            let seed = &ref_slice[..k];
            if seed.contains(&b'N') {
                continue;
            }
            let counts = solid_kmers(reads, k, self.options.min_base_quality);
            if counts.is_empty() {
                continue;
            }
            let target_len = ref_slice.len() + k;
            let core = (
                window.begin() + k as u64,
                window.end().saturating_sub(k as u64),
            );
            for contig in walk_contigs(seed, &counts, target_len, k) {
                // a contig that died before spanning the window would
                // align as one giant deletion; drop it
                if contig.len() + k < ref_slice.len() {
                    continue;
                }
                if contig == ref_slice {
                    continue;
                }
                let steps = global_alignment(ref_slice, &contig);
                call_variants(window, ref_slice, &contig, &steps, core, out);
            }
        }
    }
}

/// Count read k-mers whose bases are all unambiguous and at or above the
/// quality floor, keeping those seen at least twice.
fn solid_kmers(reads: &[&AlignedRead], k: usize, min_quality: u8) -> FxHashMap<Vec<u8>, u32> {
    let mut counts: FxHashMap<Vec<u8>, u32> = FxHashMap::default();
    for read in reads {
        if read.sequence.len() < k {
            continue;
        }
        for i in 0..=read.sequence.len() - k {
            let bases = &read.sequence[i..i + k];
            if bases.contains(&b'N') {
                continue;
            }
            if read.base_qualities[i..i + k].iter().any(|&q| q < min_quality) {
                continue;
            }
            *counts.entry(bases.to_vec()).or_insert(0) += 1;
        }
    }
    counts.retain(|_, count| *count >= MIN_KMER_COUNT);
    counts
}

/// Greedy consensus walk from the reference seed, forking on secondary
/// solid extensions up to the contig cap.
fn walk_contigs(
    seed: &[u8],
    counts: &FxHashMap<Vec<u8>, u32>,
    target_len: usize,
    k: usize,
) -> Vec<Vec<u8>> {
    let mut contigs: Vec<Vec<u8>> = Vec::new();
    let mut stack: Vec<Vec<u8>> = vec![seed.to_vec()];
    while let Some(mut contig) = stack.pop() {
        loop {
            if contig.len() >= target_len {
                contigs.push(contig);
                break;
            }
            let tail_start = contig.len() + 1 - k;
            let mut extensions: Vec<(u32, u8)> = [b'A', b'C', b'G', b'T']
                .iter()
                .map(|&base| {
                    let mut kmer = contig[tail_start..].to_vec();
                    kmer.push(base);
                    (counts.get(&kmer).copied().unwrap_or(0), base)
                })
                .collect();
            extensions.sort_unstable_by(|a, b| b.cmp(a));
            if extensions[0].0 == 0 {
                contigs.push(contig);
                break;
            }
            if extensions[1].0 > 0 && contigs.len() + stack.len() + 1 < MAX_CONTIGS_PER_WINDOW {
                let mut branch = contig.clone();
                branch.push(extensions[1].1);
                stack.push(branch);
            }
            contig.push(extensions[0].1);
        }
    }
    contigs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Consume one base of each.
    Diagonal,
    /// Consume a reference base only (deletion in the contig).
    Up,
    /// Consume a contig base only (insertion in the contig).
    Left,
}

/// Plain global alignment (match +1, mismatch -1, gap -2) with a
/// diagonal-first traceback; assembly windows are small enough that the
/// full table is irrelevant next to the pair-HMM.
fn global_alignment(reference: &[u8], contig: &[u8]) -> Vec<Step> {
    const GAP: i32 = -2;
    let n = reference.len();
    let m = contig.len();
    let mut score = vec![vec![0i32; m + 1]; n + 1];
    let mut step = vec![vec![Step::Diagonal; m + 1]; n + 1];
    for i in 1..=n {
        score[i][0] = i as i32 * GAP;
        step[i][0] = Step::Up;
    }
    for j in 1..=m {
        score[0][j] = j as i32 * GAP;
        step[0][j] = Step::Left;
    }
    for i in 1..=n {
        for j in 1..=m {
            let diagonal = score[i - 1][j - 1]
                + if reference[i - 1] == contig[j - 1] { 1 } else { -1 };
            let up = score[i - 1][j] + GAP;
            let left = score[i][j - 1] + GAP;
            let (best, direction) = if diagonal >= up && diagonal >= left {
                (diagonal, Step::Diagonal)
            } else if up >= left {
                (up, Step::Up)
            } else {
                (left, Step::Left)
            };
            score[i][j] = best;
            step[i][j] = direction;
        }
    }
    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        let direction = if i == 0 {
            Step::Left
        } else if j == 0 {
            Step::Up
        } else {
            step[i][j]
        };
        steps.push(direction);
        match direction {
            Step::Diagonal => {
                i -= 1;
                j -= 1;
            }
            Step::Up => i -= 1,
            Step::Left => j -= 1,
        }
    }
    steps.reverse();
    steps
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Idle,
    Mismatch,
    Deletion,
    Insertion,
}

/// Walk the alignment, turning runs of differences into variants. Runs
/// touching the window's excluded edges are dropped.
fn call_variants(
    window: &GenomeRegion,
    reference: &[u8],
    contig: &[u8],
    steps: &[Step],
    core: (u64, u64),
    out: &mut Vec<Variant>,
) {
    let mut kind = RunKind::Idle;
    let mut run_start = window.begin();
    let mut ref_run: Vec<u8> = Vec::new();
    let mut alt_run: Vec<u8> = Vec::new();
    let mut ref_index = 0usize;
    let mut contig_index = 0usize;
    let mut ref_pos = window.begin();

    let flush = |kind: &mut RunKind,
                 run_start: u64,
                 ref_run: &mut Vec<u8>,
                 alt_run: &mut Vec<u8>,
                 out: &mut Vec<Variant>| {
        if *kind != RunKind::Idle {
            let end = run_start + ref_run.len() as u64;
            let inside = match *kind {
                RunKind::Insertion => run_start > core.0 && run_start < core.1,
                _ => run_start >= core.0 && end <= core.1,
            };
            if inside {
                let region = GenomeRegion::new(window.contig(), run_start, end);
                out.push(Variant::from_parts(
                    region,
                    std::mem::take(ref_run),
                    std::mem::take(alt_run),
                ));
            } else {
                ref_run.clear();
                alt_run.clear();
            }
        }
        *kind = RunKind::Idle;
    };

    for &step in steps {
        match step {
            Step::Diagonal => {
                let ref_base = reference[ref_index];
                let contig_base = contig[contig_index];
                if ref_base != contig_base {
                    if kind != RunKind::Mismatch {
                        flush(&mut kind, run_start, &mut ref_run, &mut alt_run, out);
                        kind = RunKind::Mismatch;
                        run_start = ref_pos;
                    }
                    ref_run.push(ref_base);
                    alt_run.push(contig_base);
                } else {
                    flush(&mut kind, run_start, &mut ref_run, &mut alt_run, out);
                }
                ref_index += 1;
                contig_index += 1;
                ref_pos += 1;
            }
            Step::Up => {
                if kind != RunKind::Deletion {
                    flush(&mut kind, run_start, &mut ref_run, &mut alt_run, out);
                    kind = RunKind::Deletion;
                    run_start = ref_pos;
                }
                ref_run.push(reference[ref_index]);
                ref_index += 1;
                ref_pos += 1;
            }
            Step::Left => {
                if kind != RunKind::Insertion {
                    flush(&mut kind, run_start, &mut ref_run, &mut alt_run, out);
                    kind = RunKind::Insertion;
                    run_start = ref_pos;
                }
                alt_run.push(contig[contig_index]);
                contig_index += 1;
            }
        }
    }
    flush(&mut kind, run_start, &mut ref_run, &mut alt_run, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::read::{CigarOp, CigarOpKind, ReadFlags};

    const REF: &[u8] = b"TCAGGCATTCGAAGTGCCTAGATCAACGGTTCAGTCCGAT\
                         AAGCTTGCACGTTAGCCATGTCGAATCGGACTTGAGCATA\
                         CGCTGAGTCATTCAGAACGGTCTAGCATGACCGTATTGCA\
                         AGCTCAGGATCGTACCGTGAATCGGCTACAGTTCGAGCAT";

    fn region() -> GenomeRegion {
        GenomeRegion::new("chr1", 0, REF.len() as u64)
    }

    fn assembler() -> Assembler {
        Assembler::new(AssemblerOptions {
            kmer_sizes: vec![15],
            min_base_quality: 15,
            max_variant_size: 2000,
        })
    }

    fn read_of(name: &str, sequence: Vec<u8>, cigar: Vec<CigarOp>, quality: u8) -> AlignedRead {
        let qualities = vec![quality; sequence.len()];
        AlignedRead::new(
            name,
            "chr1",
            0,
            sequence,
            qualities,
            60,
            cigar,
            ReadFlags::default(),
            None,
        )
        .unwrap()
    }

    fn matched(name: &str, sequence: Vec<u8>, quality: u8) -> AlignedRead {
        let len = sequence.len() as u32;
        read_of(
            name,
            sequence,
            vec![CigarOp::new(CigarOpKind::AlignmentMatch, len)],
            quality,
        )
    }

    #[test]
    fn heterozygous_snv_is_assembled_from_both_branches() {
        let mut alt_sequence = REF.to_vec();
        alt_sequence[80] = b'T'; // reference has C here
        let mut reads = Vec::new();
        for i in 0..4 {
            reads.push(matched(&format!("ref{}", i), REF.to_vec(), 30));
            reads.push(matched(&format!("alt{}", i), alt_sequence.clone(), 30));
        }
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        let variants = assembler().generate(&region(), REF, &read_refs);
        assert!(
            variants.iter().any(|v| {
                v.is_snv()
                    && v.region().begin() == 80
                    && v.alt_allele().sequence() == b"T"
            }),
            "missing SNV in {:?}",
            variants
        );
    }

    #[test]
    fn deletion_is_recovered_from_the_consensus_path() {
        let mut sequence = REF.to_vec();
        sequence.drain(70..76);
        let reads: Vec<AlignedRead> = (0..6)
            .map(|i| {
                read_of(
                    &format!("del{}", i),
                    sequence.clone(),
                    vec![
                        CigarOp::new(CigarOpKind::AlignmentMatch, 70),
                        CigarOp::new(CigarOpKind::Deletion, 6),
                        CigarOp::new(CigarOpKind::AlignmentMatch, (REF.len() - 76) as u32),
                    ],
                    30,
                )
            })
            .collect();
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        let variants = assembler().generate(&region(), REF, &read_refs);
        assert!(
            variants
                .iter()
                .any(|v| v.is_deletion() && v.region().size() == 6),
            "missing deletion in {:?}",
            variants
        );
    }

    #[test]
    fn insertion_is_recovered_from_the_consensus_path() {
        let mut sequence = REF[..90].to_vec();
        sequence.extend_from_slice(b"TGCA");
        sequence.extend_from_slice(&REF[90..]);
        let reads: Vec<AlignedRead> = (0..6)
            .map(|i| {
                read_of(
                    &format!("ins{}", i),
                    sequence.clone(),
                    vec![
                        CigarOp::new(CigarOpKind::AlignmentMatch, 90),
                        CigarOp::new(CigarOpKind::Insertion, 4),
                        CigarOp::new(CigarOpKind::AlignmentMatch, (REF.len() - 90) as u32),
                    ],
                    30,
                )
            })
            .collect();
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        let variants = assembler().generate(&region(), REF, &read_refs);
        assert!(
            variants
                .iter()
                .any(|v| v.is_insertion() && v.alt_sequence_len() == 4),
            "missing insertion in {:?}",
            variants
        );
    }

    #[test]
    fn low_quality_bases_seed_nothing() {
        let mut alt_sequence = REF.to_vec();
        alt_sequence[80] = b'T';
        let reads: Vec<AlignedRead> = (0..6)
            .map(|i| matched(&format!("lq{}", i), alt_sequence.clone(), 10))
            .collect();
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        assert!(assembler().generate(&region(), REF, &read_refs).is_empty());
    }

    #[test]
    fn windows_shorter_than_the_kmer_context_are_skipped() {
        let short_region = GenomeRegion::new("chr1", 0, 20);
        let reads: Vec<AlignedRead> = vec![matched("r0", REF[..20].to_vec(), 30)];
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        assert!(assembler()
            .generate(&short_region, &REF[..20], &read_refs)
            .is_empty());
    }

    #[test]
    fn reference_matching_reads_produce_no_candidates() {
        let reads: Vec<AlignedRead> = (0..6)
            .map(|i| matched(&format!("ref{}", i), REF.to_vec(), 30))
            .collect();
        let read_refs: Vec<&AlignedRead> = reads.iter().collect();
        assert!(assembler().generate(&region(), REF, &read_refs).is_empty());
    }
}
