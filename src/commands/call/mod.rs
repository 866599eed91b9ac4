pub mod adapters;
pub mod args;

use crate::commands::call::adapters::{FastaReference, HtslibAlignments};
use crate::commands::call::args::CallArgs;
use anyhow::Result;
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use varweave_lib::basics::region::GenomeRegion;
use varweave_lib::calling::{CallerKind, LaggingPolicy, Trio};
use varweave_lib::core::errors::CallerError;
use varweave_lib::core::maths::Phred;
use varweave_lib::models::indel_error::IndelErrorModel;
use varweave_lib::pipeline::driver::{resolve_regions, run_pipeline, CallerConfig};
use varweave_lib::pipeline::providers::{AlignmentProvider, ReferenceProvider};
use varweave_lib::pipeline::sink::TextCallSink;
use varweave_lib::scanner::assembler::AssemblerOptions;

fn parse_pairs(pairs: &[String], what: &str) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    anyhow::Error::new(CallerError::Config(format!(
                        "expected NAME=VALUE for {}, got '{}'",
                        what, pair
                    )))
                })
        })
        .collect()
}

fn caller_kind(args: &CallArgs, samples: &[String]) -> Result<CallerKind> {
    match args.caller.as_str() {
        "individual" => Ok(CallerKind::Individual),
        "population" => Ok(CallerKind::Population),
        "cancer" => Ok(CallerKind::TumorNormal {
            normal_sample: args.normal_sample.clone(),
        }),
        "trio" => {
            let mother = args.maternal_sample.clone().ok_or_else(|| {
                anyhow::Error::new(CallerError::Config(
                    "trio calling requires --maternal-sample".to_string()
                ))
            })?;
            let father = args.paternal_sample.clone().ok_or_else(|| {
                anyhow::Error::new(CallerError::Config(
                    "trio calling requires --paternal-sample".to_string()
                ))
            })?;
            let children: Vec<&String> = samples
                .iter()
                .filter(|s| **s != mother && **s != father)
                .collect();
            match children.as_slice() {
                [child] => Ok(CallerKind::Trio(Trio {
                    mother,
                    father,
                    child: (*child).clone(),
                })),
                [] => Err(anyhow::Error::new(CallerError::Config(
                    "trio calling found no child sample".to_string()
                ))),
                _ => Err(anyhow::Error::new(CallerError::Config(format!(
                    "trio calling requires exactly three samples, found {}",
                    samples.len()
                )))),
            }
        }
        other => Err(anyhow::Error::new(CallerError::Config(format!(
            "unknown caller '{}'",
            other
        )))),
    }
}

fn build_config(args: &CallArgs, samples: &[String]) -> Result<CallerConfig> {
    let mut config = CallerConfig {
        caller: caller_kind(args, samples)?,
        ploidy: args.ploidy,
        ..CallerConfig::default()
    };
    for (contig, ploidy) in parse_pairs(&args.contig_ploidies, "--contig-ploidies")? {
        let ploidy: usize = ploidy.parse().map_err(|_| {
            anyhow::Error::new(CallerError::Config(format!(
                "bad ploidy '{}' for contig {}",
                ploidy, contig
            )))
        })?;
        config.contig_ploidies.insert(contig, ploidy);
    }
    config.snp_heterozygosity = args.snp_heterozygosity;
    config.indel_heterozygosity = args.indel_heterozygosity;
    config.error_model = match args.sequencer_error_model.as_str() {
        "hiseq" => IndelErrorModel::HiSeq,
        _ => IndelErrorModel::NovaSeq,
    };
    config.generator.max_haplotypes = args.max_haplotypes;
    config.generator.lagging = match args.phasing_level.as_str() {
        "minimal" => LaggingPolicy::None,
        "aggressive" => LaggingPolicy::Aggressive,
        _ => LaggingPolicy::Conservative,
    };
    config.min_haplotype_posterior = args.min_haplotype_posterior;
    config.min_phase_score = Phred::new(args.min_phase_score);
    config.extraction.min_variant_posterior = Phred::new(args.min_variant_posterior);
    config.extraction.min_refcall_posterior = Phred::new(args.min_refcall_posterior);
    config.extraction.min_denovo_posterior = Phred::new(args.min_denovo_posterior);
    config.extraction.emit_refcalls = args.refcalls;
    config.extraction.allele_posterior_cache_threshold = args.allele_posterior_cache_threshold;
    config.somatic.somatic_mutation_rate = args.somatic_mutation_rate;
    config.somatic.min_somatic_frequency = args.min_somatic_frequency;
    config.somatic.credible_mass = args.credible_mass;
    config.somatic.min_somatic_posterior = Phred::new(args.min_somatic_posterior);
    config.scanner.max_variant_size = args.max_variant_size;
    config.scanner.misalignment.snv_threshold = args.min_base_quality.max(20);
    config.read_filter.min_mapping_quality = args.min_mapping_quality;
    config.read_filter.good_base_quality = args.good_base_quality;
    config.read_filter.min_good_bases = args.min_good_bases;
    config.read_filter.min_good_base_fraction = args.min_good_base_fraction;
    config.downsample_above = args.downsample_above;
    config.downsample_target = args.downsample_target;
    config.max_joint_genotypes = args.max_joint_genotypes;
    config.threads = args.threads;
    config.chunk_size = args.chunk_size;
    config.region_timeout = args.region_timeout.map(Duration::from_secs);
    if args.assembler_candidates {
        if args.kmer_sizes.is_empty() || args.kmer_sizes.iter().any(|&k| k == 0 || k > 64) {
            return Err(anyhow::Error::new(CallerError::Config(
                "re-assembly k-mer sizes must be in 1..=64".to_string(),
            )));
        }
        config.assembler = Some(AssemblerOptions {
            kmer_sizes: args.kmer_sizes.clone(),
            min_base_quality: args.min_assembler_base_quality,
            max_variant_size: args.max_variant_size,
        });
    }
    Ok(config)
}

fn parse_regions(texts: &[String]) -> Result<Vec<GenomeRegion>> {
    texts
        .iter()
        .map(|text| GenomeRegion::parse(text).map_err(anyhow::Error::new))
        .collect()
}

pub fn run_call(args: CallArgs) -> Result<()> {
    let reads = parse_pairs(&args.reads, "--reads")?
        .into_iter()
        .map(|(sample, path)| (sample, PathBuf::from(path)))
        .collect();
    let alignments = Arc::new(HtslibAlignments::open(reads, args.max_open_read_files)?);
    let reference = Arc::new(FastaReference::open(&args.reference)?);
    let samples = alignments.samples();
    info!("calling {} samples: {}", samples.len(), samples.join(", "));

    let config = build_config(&args, &samples)?;
    let requested = parse_regions(&args.regions)?;
    let skipped = parse_regions(&args.skip_regions)?;
    let regions = resolve_regions(
        reference.as_ref() as &dyn ReferenceProvider,
        &requested,
        &skipped,
        config.chunk_size,
    )?;
    info!("processing {} region chunks", regions.len());

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::BufWriter::new(std::io::stdout())),
    };
    let mut sink = TextCallSink::new(writer, samples);

    let stop = Arc::new(AtomicBool::new(false));
    let summary = run_pipeline(
        reference,
        alignments,
        None,
        config,
        regions,
        &mut sink,
        stop,
    )?;
    info!(
        "done: {} records from {} regions ({} failed)",
        summary.records_emitted, summary.regions_processed, summary.regions_failed
    );
    Ok(())
}
