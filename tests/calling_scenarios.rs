//! End-to-end calling scenarios over the in-memory providers.

mod common;

use common::*;
use varweave_lib::basics::read::{CigarOp, CigarOpKind};
use varweave_lib::calling::{CallerKind, Trio};
use varweave_lib::pipeline::driver::CallerConfig;
use varweave_lib::pipeline::providers::CallKind;

fn individual_config() -> CallerConfig {
    CallerConfig {
        caller: CallerKind::Individual,
        ..CallerConfig::default()
    }
}

#[test]
fn single_sample_het_snv() {
    let reference = pattern_reference(300);
    // position 102 is G on the ACGT pattern
    let mut reads = reference_reads(&reference, 60, 100, 10, "ref");
    reads.extend(snv_reads(&reference, 60, 100, 102, b'A', 10, "alt"));

    let records = run_calling(reference, vec![("s1", reads)], individual_config());

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.kind, CallKind::Germline);
    assert_eq!(record.variant.region().begin(), 102);
    assert_eq!(record.variant.ref_allele().sequence(), b"G");
    assert_eq!(record.variant.alt_allele().sequence(), b"A");
    assert!(record.posterior.score() >= 30.0);
    assert_eq!(record.samples[0].gt_string(), "0/1");
    assert!(record.depth >= 15);
}

#[test]
fn homozygous_deletion() {
    let reference = pattern_reference(400);
    // every read carries the same 5bp deletion of 200..205
    let reads: Vec<_> = (0..20)
        .map(|i| {
            let begin = 150u64;
            let mut sequence = reference[150..200].to_vec();
            sequence.extend_from_slice(&reference[205..255]);
            cigar_read(
                &format!("del{}", i),
                begin,
                sequence,
                vec![
                    CigarOp::new(CigarOpKind::AlignmentMatch, 50),
                    CigarOp::new(CigarOpKind::Deletion, 5),
                    CigarOp::new(CigarOpKind::AlignmentMatch, 50),
                ],
                i % 2 == 0,
            )
        })
        .collect();

    let records = run_calling(reference, vec![("s1", reads)], individual_config());

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.variant.is_deletion());
    assert_eq!(record.variant.region().begin(), 200);
    assert_eq!(record.variant.region().end(), 205);
    assert!(record.variant.alt_allele().sequence().is_empty());
    assert_eq!(record.samples[0].gt_string(), "1/1");
}

#[test]
fn strand_biased_snv_is_rejected() {
    let reference = pattern_reference(300);
    // 30 forward-only reads carry the alternate; 30 balanced reads are
    // reference
    let mut reads = reference_reads(&reference, 60, 100, 30, "ref");
    reads.extend((0..30).map(|i| {
        let mut sequence = reference[60..160].to_vec();
        sequence[42] = b'C'; // position 102 G->C, always forward
        matched_read(&format!("biased{}", i), 60, sequence, true)
    }));

    let records = run_calling(reference, vec![("s1", reads)], individual_config());
    assert!(
        records.is_empty(),
        "strand-biased artifact was called: {:?}",
        records
    );
}

#[test]
fn trio_denovo_in_child() {
    let reference = pattern_reference(1000);
    // position 501 is C; the child is half alternate, parents clean
    let mother_reads = reference_reads(&reference, 450, 100, 30, "m");
    let father_reads = reference_reads(&reference, 450, 100, 30, "f");
    let mut child_reads = reference_reads(&reference, 450, 100, 10, "c_ref");
    child_reads.extend(snv_reads(&reference, 450, 100, 501, b'A', 10, "c_alt"));

    let config = CallerConfig {
        caller: CallerKind::Trio(Trio {
            mother: "mother".to_string(),
            father: "father".to_string(),
            child: "child".to_string(),
        }),
        ..CallerConfig::default()
    };
    let records = run_calling(
        reference,
        vec![
            ("mother", mother_reads),
            ("father", father_reads),
            ("child", child_reads),
        ],
        config,
    );

    assert_eq!(records.len(), 1, "expected exactly one call: {:?}", records);
    let record = &records[0];
    assert_eq!(record.kind, CallKind::Denovo);
    assert_eq!(record.variant.region().begin(), 501);
    assert!(record.posterior.score() >= 2.0);
    let child = record.samples.iter().find(|s| s.sample == "child").unwrap();
    assert_eq!(child.gt_string(), "0/1");
    for parent in ["mother", "father"] {
        let call = record.samples.iter().find(|s| s.sample == parent).unwrap();
        assert_eq!(call.gt_string(), "0/0");
    }
}

#[test]
fn insertion_and_snv_phase_together() {
    let reference = pattern_reference(1200);
    // haplotype carries a 2bp insertion at 1000 and an SNV at 1002
    let begin = 930u64;
    let carrier_reads: Vec<_> = (0..10)
        .map(|i| {
            let mut sequence = reference[930..1000].to_vec();
            sequence.extend_from_slice(b"TT");
            let mut tail = reference[1000..1080].to_vec();
            tail[2] = b'T'; // 1002 is G on the pattern
            sequence.extend_from_slice(&tail);
            cigar_read(
                &format!("carrier{}", i),
                begin,
                sequence,
                vec![
                    CigarOp::new(CigarOpKind::AlignmentMatch, 70),
                    CigarOp::new(CigarOpKind::Insertion, 2),
                    CigarOp::new(CigarOpKind::AlignmentMatch, 80),
                ],
                i % 2 == 0,
            )
        })
        .collect();
    let mut reads = reference_reads(&reference, 930, 150, 10, "ref");
    reads.extend(carrier_reads);

    let records = run_calling(reference, vec![("s1", reads)], individual_config());

    assert_eq!(records.len(), 2, "expected two calls: {:?}", records);
    let insertion = records.iter().find(|r| r.variant.is_insertion()).unwrap();
    let snv = records.iter().find(|r| r.variant.is_snv()).unwrap();
    assert_eq!(insertion.variant.region().begin(), 1000);
    assert_eq!(insertion.variant.alt_allele().sequence(), b"TT");
    assert_eq!(snv.variant.region().begin(), 1002);

    // both sites are phased into one phase set
    let ins_call = &insertion.samples[0];
    let snv_call = &snv.samples[0];
    assert!(ins_call.phased && snv_call.phased);
    assert!(ins_call.phase_set.is_some());
    assert_eq!(ins_call.phase_set, snv_call.phase_set);
    assert_eq!(ins_call.gt_string(), "0|1");
    assert_eq!(snv_call.gt_string(), "0|1");
}

#[test]
fn misaligned_read_produces_no_calls() {
    let reference = pattern_reference(300);
    let mut reads = reference_reads(&reference, 60, 100, 5, "ref");
    // one low-MAPQ read with eight scattered mismatches
    let mut noisy = reference[60..160].to_vec();
    for i in (0..32).step_by(4) {
        noisy[i] = if noisy[i] == b'A' { b'C' } else { b'A' };
    }
    let mut bad = matched_read("noisy", 60, noisy, true);
    bad.mapping_quality = 5;
    reads.push(bad);

    // admit the low-MAPQ read so the misalignment test, not the read
    // filter, is what rejects its candidates
    let mut config = individual_config();
    config.read_filter.min_mapping_quality = 0;
    let records = run_calling(reference, vec![("s1", reads)], config);
    assert!(records.is_empty(), "misaligned read was called: {:?}", records);
}

#[test]
fn assembler_candidates_agree_with_the_scanner() {
    use varweave_lib::scanner::assembler::AssemblerOptions;

    let reference = varied_reference(300);
    let ref_base = reference[102];
    let alt_base = if ref_base == b'A' { b'C' } else { b'A' };
    // reads span the whole first assembly window so the consensus walk
    // can cross it
    let mut reads = reference_reads(&reference, 0, 250, 10, "ref");
    reads.extend(snv_reads(&reference, 0, 250, 102, alt_base, 10, "alt"));

    let mut config = individual_config();
    config.assembler = Some(AssemblerOptions::default());
    let records = run_calling(reference, vec![("s1", reads)], config);

    // the scanner and the assembler propose the same site; it is called
    // exactly once
    assert_eq!(records.len(), 1, "expected one call: {:?}", records);
    let record = &records[0];
    assert_eq!(record.kind, CallKind::Germline);
    assert_eq!(record.variant.region().begin(), 102);
    assert_eq!(record.variant.alt_allele().sequence(), &[alt_base]);
    assert_eq!(record.samples[0].gt_string(), "0/1");
}

#[test]
fn phred_probability_round_trip() {
    use varweave_lib::core::maths::Phred;
    for &q in &[1.0f64, 3.0, 17.5, 30.0, 50.0] {
        let p = Phred::new(q).probability_true();
        let back = Phred::from_error_probability(1.0 - p);
        assert!((back.score() - q).abs() < 1e-9);
    }
}
