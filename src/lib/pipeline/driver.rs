//! The pipeline driver.
//!
//! Splits the requested genome into chunks, fans the chunks out over a
//! rayon pool, and runs the per-region loop in each worker: fetch and
//! filter reads, scan candidates, walk haplotype windows, infer, extract
//! and phase. Workers send `(sequence, records)` pairs over a bounded
//! channel to an order-restoring writer so output is emitted in genomic
//! order regardless of completion order. Per-region failures are isolated;
//! a shared stop flag is polled between regions and windows.

use crate::basics::read::{passes_filters, AlignedRead, ReadFilterOptions};
use crate::basics::region::GenomeRegion;
use crate::calling::extract::{call_trio_variants, ExtractionOptions};
use crate::calling::individual::{call_individual_variants, infer_individual};
use crate::calling::phaser::{HaplotypeGenerator, HaplotypeGeneratorOptions};
use crate::calling::population::{call_population_variants, infer_population};
use crate::calling::somatic::{SomaticOptions, TumorNormalModel};
use crate::calling::trio::{
    model_posterior, SampleReads, TrioModel, TrioModelOptions, DEFAULT_MAX_JOINT_GENOTYPES,
};
use crate::calling::CallerKind;
use crate::core::concurrency::resolve_worker_threads;
use crate::core::errors::{CallerError, Result};
use crate::core::maths::{median, Phred};
use crate::haplotype::genotype::generate_all_genotypes;
use crate::haplotype::haplotype::{Haplotype, HaplotypeArena, HaplotypeId};
use crate::models::denovo::{DeNovoModel, DEFAULT_DENOVO_MUTATION_RATE};
use crate::models::indel_error::IndelErrorModel;
use crate::models::likelihood::{HaplotypeLikelihoods, ReadId};
use crate::models::priors::{
    PriorModel, DEFAULT_INDEL_HETEROZYGOSITY, DEFAULT_SNP_HETEROZYGOSITY,
};
use crate::pipeline::providers::{
    AlignmentProvider, CallRecord, CallSink, CandidateSource, ReferenceProvider,
};
use crate::scanner::assembler::{Assembler, AssemblerOptions};
use crate::scanner::cigar_scanner::{CigarScanner, ScannerOptions};
use crate::scanner::inclusion::InclusionPolicy;
use crossbeam::channel::bounded;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FETCH_RETRY_ATTEMPTS: u32 = 3;
const FETCH_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct CallerConfig {
    pub caller: CallerKind,
    pub ploidy: usize,
    pub contig_ploidies: FxHashMap<String, usize>,
    pub snp_heterozygosity: f64,
    pub indel_heterozygosity: f64,
    pub denovo_mutation_rate: f64,
    pub error_model: IndelErrorModel,
    pub generator: HaplotypeGeneratorOptions,
    pub min_haplotype_posterior: f64,
    pub min_phase_score: Phred,
    pub extraction: ExtractionOptions,
    pub somatic: SomaticOptions,
    pub scanner: ScannerOptions,
    /// Supplemental local re-assembly candidate generation; off when
    /// `None`.
    pub assembler: Option<AssemblerOptions>,
    pub read_filter: ReadFilterOptions,
    pub mask_soft_clip_boundary: usize,
    pub downsample_above: u32,
    pub downsample_target: u32,
    pub max_joint_genotypes: usize,
    pub compute_model_posterior: bool,
    pub threads: usize,
    pub chunk_size: u64,
    pub region_timeout: Option<Duration>,
}

impl Default for CallerConfig {
    fn default() -> Self {
        CallerConfig {
            caller: CallerKind::Population,
            ploidy: 2,
            contig_ploidies: FxHashMap::default(),
            snp_heterozygosity: DEFAULT_SNP_HETEROZYGOSITY,
            indel_heterozygosity: DEFAULT_INDEL_HETEROZYGOSITY,
            denovo_mutation_rate: DEFAULT_DENOVO_MUTATION_RATE,
            error_model: IndelErrorModel::default(),
            generator: HaplotypeGeneratorOptions::default(),
            min_haplotype_posterior: 1e-10,
            min_phase_score: Phred::new(20.0),
            extraction: ExtractionOptions::default(),
            somatic: SomaticOptions::default(),
            scanner: ScannerOptions::default(),
            assembler: None,
            read_filter: ReadFilterOptions::default(),
            mask_soft_clip_boundary: 2,
            downsample_above: 500,
            downsample_target: 400,
            max_joint_genotypes: DEFAULT_MAX_JOINT_GENOTYPES,
            compute_model_posterior: true,
            threads: 1,
            chunk_size: 500_000,
            region_timeout: None,
        }
    }
}

impl CallerConfig {
    /// Fail-fast validation against the provider's sample set.
    pub fn validate(&self, samples: &[String]) -> Result<()> {
        if self.ploidy == 0 {
            return Err(CallerError::Config("ploidy must be > 0".to_string()));
        }
        if self.downsample_target > self.downsample_above {
            return Err(CallerError::Config(
                "downsample-target exceeds downsample-above".to_string(),
            ));
        }
        match &self.caller {
            CallerKind::Individual => {
                if samples.len() != 1 {
                    return Err(CallerError::Config(format!(
                        "individual calling requires exactly one sample, found {}",
                        samples.len()
                    )));
                }
            }
            CallerKind::Population => {}
            CallerKind::Trio(trio) => {
                for (role, name) in [
                    ("maternal", &trio.mother),
                    ("paternal", &trio.father),
                    ("child", &trio.child),
                ] {
                    if !samples.contains(name) {
                        return Err(CallerError::Config(format!(
                            "{} sample '{}' is not in the read set",
                            role, name
                        )));
                    }
                }
                // equal diploid ploidies across the trio; the dual-ploidy
                // branch requires explicit configuration we do not accept
                if self.ploidy != 2 || self.contig_ploidies.values().any(|&p| p != 2) {
                    return Err(CallerError::Config(
                        "trio calling requires diploid samples on all contigs".to_string(),
                    ));
                }
            }
            CallerKind::TumorNormal { normal_sample } => {
                if let Some(normal) = normal_sample {
                    if !samples.contains(normal) {
                        return Err(CallerError::Config(format!(
                            "normal sample '{}' is not in the read set",
                            normal
                        )));
                    }
                } else {
                    log::warn!("no normal sample configured; treating all samples as tumor");
                }
            }
        }
        Ok(())
    }

    pub fn ploidy_of(&self, contig: &str) -> usize {
        self.contig_ploidies
            .get(contig)
            .copied()
            .unwrap_or(self.ploidy)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineSummary {
    pub regions_processed: usize,
    pub regions_failed: usize,
    pub records_emitted: usize,
}

/// Expand the requested regions (all contigs when empty), subtract the
/// skip list and split into worker chunks.
pub fn resolve_regions(
    reference: &dyn ReferenceProvider,
    requested: &[GenomeRegion],
    skipped: &[GenomeRegion],
    chunk_size: u64,
) -> Result<Vec<GenomeRegion>> {
    let mut bases: Vec<GenomeRegion> = if requested.is_empty() {
        reference
            .contigs()
            .iter()
            .filter_map(|name| {
                reference
                    .contig_size(name)
                    .map(|size| GenomeRegion::new(name, 0, size))
            })
            .collect()
    } else {
        for region in requested {
            let size = reference.contig_size(region.contig()).ok_or_else(|| {
                CallerError::Region(format!("unknown contig in region {}", region))
            })?;
            if region.end() > size {
                return Err(CallerError::Region(format!(
                    "{} exceeds contig length {}",
                    region, size
                )));
            }
        }
        requested.to_vec()
    };
    bases.sort();
    // subtract skip intervals
    let mut kept: Vec<GenomeRegion> = Vec::new();
    for base in bases {
        let mut fragments = vec![base];
        for skip in skipped {
            let mut next = Vec::new();
            for fragment in fragments {
                if !fragment.overlaps(skip) {
                    next.push(fragment);
                    continue;
                }
                if fragment.begin() < skip.begin() {
                    next.push(GenomeRegion::new(
                        fragment.contig(),
                        fragment.begin(),
                        skip.begin(),
                    ));
                }
                if skip.end() < fragment.end() {
                    next.push(GenomeRegion::new(
                        fragment.contig(),
                        skip.end(),
                        fragment.end(),
                    ));
                }
            }
            fragments = next;
        }
        kept.extend(fragments);
    }
    // chunk
    let mut chunks = Vec::new();
    for region in kept {
        let mut begin = region.begin();
        while begin < region.end() {
            let end = (begin + chunk_size).min(region.end());
            chunks.push(GenomeRegion::new(region.contig(), begin, end));
            begin = end;
        }
        if region.is_empty() {
            chunks.push(region);
        }
    }
    Ok(chunks)
}

/// Run the caller over the resolved regions, writing records in genomic
/// order.
pub fn run_pipeline(
    reference: Arc<dyn ReferenceProvider>,
    alignments: Arc<dyn AlignmentProvider>,
    candidates: Option<Arc<dyn CandidateSource>>,
    config: CallerConfig,
    regions: Vec<GenomeRegion>,
    sink: &mut dyn CallSink,
    stop: Arc<AtomicBool>,
) -> Result<PipelineSummary> {
    let samples = alignments.samples();
    config.validate(&samples)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(resolve_worker_threads(config.threads))
        .build()
        .map_err(|e| CallerError::Config(format!("failed to build thread pool: {}", e)))?;

    let (sender, receiver) = bounded::<(usize, Vec<CallRecord>)>(regions.len().max(1));
    let failed = Arc::new(AtomicUsize::new(0));

    let worker_state = {
        let reference = Arc::clone(&reference);
        let alignments = Arc::clone(&alignments);
        let candidates = candidates.clone();
        let config = config.clone();
        let stop = Arc::clone(&stop);
        let failed = Arc::clone(&failed);
        let samples = samples.clone();
        let regions = regions.clone();
        move || {
            use rayon::prelude::*;
            regions
                .into_par_iter()
                .enumerate()
                .for_each_with(sender, |sender, (sequence, region)| {
                    if stop.load(Ordering::Relaxed) {
                        let _ = sender.send((sequence, Vec::new()));
                        return;
                    }
                    let worker = RegionWorker {
                        reference: Arc::clone(&reference),
                        alignments: Arc::clone(&alignments),
                        candidates: candidates.clone(),
                        config: &config,
                        samples: &samples,
                        stop: &stop,
                    };
                    let records = match worker.process(&region) {
                        Ok(records) => records,
                        Err(error) => {
                            log::warn!("region {} failed: {}; skipping", region, error);
                            failed.fetch_add(1, Ordering::Relaxed);
                            Vec::new()
                        }
                    };
                    if sender.send((sequence, records)).is_err() {
                        log::warn!("writer disconnected; stopping worker early");
                    }
                });
        }
    };

    let num_regions = regions.len();
    let writer_thread = std::thread::spawn(move || pool.install(worker_state));

    // order-restoring writer
    let mut summary = PipelineSummary::default();
    let mut pending: BTreeMap<usize, Vec<CallRecord>> = BTreeMap::new();
    let mut next = 0usize;
    for (sequence, records) in receiver.iter() {
        pending.insert(sequence, records);
        while let Some(records) = pending.remove(&next) {
            for record in &records {
                sink.write(record)?;
                summary.records_emitted += 1;
            }
            summary.regions_processed += 1;
            next += 1;
        }
        if next >= num_regions {
            break;
        }
    }
    writer_thread
        .join()
        .map_err(|_| CallerError::Numeric("worker pool panicked".to_string()))?;
    sink.finish()?;
    summary.regions_failed = failed.load(Ordering::Relaxed);
    Ok(summary)
}

struct RegionWorker<'a> {
    reference: Arc<dyn ReferenceProvider>,
    alignments: Arc<dyn AlignmentProvider>,
    candidates: Option<Arc<dyn CandidateSource>>,
    config: &'a CallerConfig,
    samples: &'a [String],
    stop: &'a AtomicBool,
}

impl<'a> RegionWorker<'a> {
    fn process(&self, region: &GenomeRegion) -> Result<Vec<CallRecord>> {
        let started = Instant::now();
        let reads_by_sample = self.fetch_reads_with_retry(region)?;

        // filter, transform and downsample, then assign read ids
        let mut next_read_id = 0u32;
        let mut sample_reads: Vec<SampleReads> = Vec::with_capacity(self.samples.len());
        for sample in self.samples {
            let raw = reads_by_sample.get(sample).cloned().unwrap_or_default();
            let total = raw.len();
            let mut kept: Vec<AlignedRead> = raw
                .into_iter()
                .filter(|read| passes_filters(read, &self.config.read_filter))
                .collect();
            for read in &mut kept {
                read.mask_soft_clips(self.config.mask_soft_clip_boundary);
            }
            let kept = downsample(
                kept,
                region,
                self.config.downsample_above,
                self.config.downsample_target,
            );
            log::debug!(
                "{}: {} of {} reads usable for {}",
                region,
                kept.len(),
                total,
                sample
            );
            sample_reads.push(
                kept.into_iter()
                    .map(|read| {
                        let id = ReadId(next_read_id);
                        next_read_id += 1;
                        (id, read)
                    })
                    .collect(),
            );
        }

        // candidate generation
        let mut scanner = CigarScanner::new(
            Arc::clone(&self.reference),
            self.samples.to_vec(),
            self.scanner_options(),
        );
        for (sample, reads) in self.samples.iter().zip(sample_reads.iter()) {
            for (_, read) in reads {
                scanner.add_read(sample, read)?;
            }
        }
        let mut variants = scanner.generate(region);
        if let Some(source) = &self.candidates {
            for external in source.variants_in(region)? {
                if external.footprint() <= self.config.scanner.max_variant_size {
                    variants.push(external);
                }
            }
            variants.sort();
            variants.dedup();
        }
        if let Some(assembler_options) = &self.config.assembler {
            let all_reads: Vec<&AlignedRead> = sample_reads
                .iter()
                .flatten()
                .map(|(_, read)| read)
                .collect();
            if !all_reads.is_empty() {
                let reference_bases = self.reference.fetch_sequence(region)?;
                let assembler = Assembler::new(assembler_options.clone());
                let assembled = assembler.generate(region, &reference_bases, &all_reads);
                if !assembled.is_empty() {
                    log::debug!(
                        "{}: re-assembly proposed {} candidates",
                        region,
                        assembled.len()
                    );
                    variants.extend(assembled);
                    variants.sort();
                    variants.dedup();
                }
            }
        }
        if variants.is_empty() {
            return Ok(Vec::new());
        }
        let observation_counts = scanner.observation_counts(region);

        let mut generator = HaplotypeGenerator::new(
            region.clone(),
            variants,
            observation_counts,
            self.config.generator.clone(),
        );

        let mut records: Vec<CallRecord> = Vec::new();
        let mut current_phase_set: Option<u64> = None;
        while let Some(window) = generator.progress() {
            if self.stop.load(Ordering::Relaxed) {
                log::info!("stop requested; abandoning {} mid-region", region);
                break;
            }
            if let Some(timeout) = self.config.region_timeout {
                if started.elapsed() > timeout {
                    log::warn!("{}: region timeout; emitting partial results", region);
                    break;
                }
            }
            if !window.connects_previous {
                current_phase_set = None;
            }
            let window_result = self.call_window(&window, &sample_reads, &mut generator);
            match window_result {
                Ok(mut window_records) => {
                    self.assign_phase(
                        &mut window_records,
                        &window.window,
                        &mut current_phase_set,
                    );
                    for record in &mut window_records {
                        record.depth = scanner.total_depth(record.variant.region());
                        record.mapping_quality = window_mapping_quality(
                            &sample_reads,
                            &window.window,
                        );
                        if window.degraded {
                            record.info.push(("HO".to_string(), "1".to_string()));
                        }
                    }
                    records.extend(window_records);
                }
                Err(CallerError::Numeric(message)) => {
                    log::warn!(
                        "{}: numerical failure in window {}: {}; no call emitted",
                        region,
                        window.window,
                        message
                    );
                }
                Err(other) => return Err(other),
            }
        }
        strip_singleton_phase_sets(&mut records);
        records.sort_by(|a, b| a.variant.cmp(&b.variant));
        // a variant straddling a chunk boundary belongs to the chunk its
        // begin position falls in, so adjacent chunks never double-emit
        records.retain(|r| {
            let begin = r.variant.region().begin();
            begin >= region.begin() && begin < region.end().max(region.begin() + 1)
        });
        Ok(records)
    }

    fn scanner_options(&self) -> ScannerOptions {
        let mut options = self.config.scanner.clone();
        if let CallerKind::TumorNormal { normal_sample } = &self.config.caller {
            let normal_index = normal_sample
                .as_ref()
                .and_then(|name| self.samples.iter().position(|s| s == name));
            options.inclusion = InclusionPolicy::Somatic {
                normal_sample: normal_index,
                min_expected_vaf: self.config.somatic.min_somatic_frequency,
            };
        }
        options
    }

    fn fetch_reads_with_retry(
        &self,
        region: &GenomeRegion,
    ) -> Result<BTreeMap<String, Vec<AlignedRead>>> {
        let mut delay = FETCH_RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            match self.alignments.fetch_reads(self.samples, region) {
                Err(CallerError::Transient(message)) if attempt + 1 < FETCH_RETRY_ATTEMPTS => {
                    attempt += 1;
                    log::warn!(
                        "transient failure fetching {} (attempt {}): {}; retrying in {:?}",
                        region,
                        attempt,
                        message,
                        delay
                    );
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                other => return other,
            }
        }
    }

    /// Build, infer and extract one haplotype window.
    fn call_window(
        &self,
        window: &crate::calling::phaser::WindowHaplotypes,
        sample_reads: &[SampleReads],
        generator: &mut HaplotypeGenerator,
    ) -> Result<Vec<CallRecord>> {
        let window_region = &window.window;
        let ref_bases = self.reference.fetch_sequence(window_region)?;
        let mut arena = HaplotypeArena::new();
        let mut id_to_alleles: FxHashMap<HaplotypeId, Vec<crate::basics::allele::Allele>> =
            FxHashMap::default();
        let mut haplotypes: Vec<HaplotypeId> = Vec::new();
        for allele_set in &window.allele_sets {
            let haplotype =
                Haplotype::new(window_region.clone(), allele_set.clone(), &ref_bases)?;
            let id = arena.intern(haplotype);
            if !haplotypes.contains(&id) {
                haplotypes.push(id);
                id_to_alleles.insert(id, allele_set.clone());
            }
        }
        let ploidy = self.config.ploidy_of(window_region.contig());
        let genotypes = generate_all_genotypes(&haplotypes, ploidy);

        let mut priors = PriorModel::coalescent(
            self.config.snp_heterozygosity,
            self.config.indel_heterozygosity,
        );
        priors.reset(haplotypes.len());
        let mut likelihoods = HaplotypeLikelihoods::new(self.config.error_model);
        likelihoods.prime(&arena, &haplotypes);

        // restrict reads to the window
        let window_reads: Vec<SampleReads> = sample_reads
            .iter()
            .map(|reads| {
                reads
                    .iter()
                    .filter(|(_, read)| read.region.overlaps(window_region))
                    .cloned()
                    .collect()
            })
            .collect();

        let survivors: Vec<Vec<crate::basics::allele::Allele>>;
        let records = match &self.config.caller {
            CallerKind::Trio(trio) => {
                let mut denovo = DeNovoModel::new(self.config.denovo_mutation_rate);
                let maternal = self.reads_of(trio.mother.as_str(), &window_reads);
                let paternal = self.reads_of(trio.father.as_str(), &window_reads);
                let child = self.reads_of(trio.child.as_str(), &window_reads);
                let mut model = TrioModel {
                    arena: &arena,
                    priors: &mut priors,
                    denovo: &mut denovo,
                    likelihoods: &mut likelihoods,
                    options: TrioModelOptions {
                        max_joint_genotypes: self.config.max_joint_genotypes,
                    },
                };
                let latents =
                    model.infer(&haplotypes, genotypes, maternal, paternal, child)?;
                let mut records = call_trio_variants(
                    &window.variants,
                    &latents,
                    &arena,
                    trio,
                    &self.config.extraction,
                );
                if self.config.compute_model_posterior && !records.is_empty() {
                    let dummy_genotypes = generate_all_genotypes(&haplotypes, ploidy + 1);
                    let (_, dummy_evidence) =
                        model.evaluate(&dummy_genotypes, maternal, paternal, child)?;
                    let posterior = model_posterior(latents.log_evidence, dummy_evidence);
                    for record in &mut records {
                        record
                            .info
                            .push(("MP".to_string(), format!("{:.4}", posterior)));
                    }
                }
                survivors = retained_allele_sets(
                    &latents.haplotype_posteriors,
                    &id_to_alleles,
                    self.config.min_haplotype_posterior,
                );
                records
            }
            CallerKind::Individual => {
                let reads = &window_reads[0];
                let latents = infer_individual(
                    &haplotypes,
                    genotypes,
                    reads,
                    &mut priors,
                    &mut likelihoods,
                    &arena,
                )?;
                let records = call_individual_variants(
                    &window.variants,
                    &latents,
                    &arena,
                    &self.samples[0],
                    self.config.extraction.min_variant_posterior,
                );
                survivors = retained_allele_sets(
                    &latents.haplotype_posteriors,
                    &id_to_alleles,
                    self.config.min_haplotype_posterior,
                );
                records
            }
            CallerKind::Population => {
                let latents = infer_population(
                    &haplotypes,
                    &genotypes,
                    self.samples,
                    &window_reads,
                    &mut priors,
                    &mut likelihoods,
                    &arena,
                )?;
                let records = call_population_variants(
                    &window.variants,
                    &latents,
                    &arena,
                    self.config.extraction.min_variant_posterior,
                );
                survivors = retained_allele_sets(
                    &latents.haplotype_posteriors(),
                    &id_to_alleles,
                    self.config.min_haplotype_posterior,
                );
                records
            }
            CallerKind::TumorNormal { normal_sample } => {
                let empty: SampleReads = Vec::new();
                let normal_reads = normal_sample
                    .as_deref()
                    .map(|name| self.reads_of(name, &window_reads))
                    .unwrap_or(&empty);
                let normal_name = normal_sample.clone().unwrap_or_else(|| "NORMAL".to_string());
                let tumor_samples: Vec<String> = self
                    .samples
                    .iter()
                    .filter(|s| Some(s.as_str()) != normal_sample.as_deref())
                    .cloned()
                    .collect();
                let mut model = TumorNormalModel {
                    arena: &arena,
                    priors: &mut priors,
                    likelihoods: &mut likelihoods,
                    options: self.config.somatic.clone(),
                };
                let latents = model.infer_normal(
                    &haplotypes,
                    genotypes,
                    &normal_name,
                    normal_reads,
                    &tumor_samples,
                )?;
                let mut records = Vec::new();
                for tumor in &tumor_samples {
                    let tumor_reads = self.reads_of(tumor.as_str(), &window_reads);
                    records.extend(model.call_somatic_variants(
                        &window.variants,
                        &latents,
                        tumor,
                        tumor_reads,
                    ));
                }
                survivors = retained_allele_sets(
                    &latents.normal.haplotype_posteriors,
                    &id_to_alleles,
                    self.config.min_haplotype_posterior,
                );
                records
            }
        };
        generator.keep(&survivors);
        Ok(records)
    }

    fn reads_of<'r>(&self, sample: &str, window_reads: &'r [SampleReads]) -> &'r SampleReads {
        let index = self
            .samples
            .iter()
            .position(|s| s == sample)
            .unwrap_or(0);
        &window_reads[index]
    }

    /// Mark heterozygous, confidently genotyped sites as phased within
    /// the running phase set.
    fn assign_phase(
        &self,
        records: &mut [CallRecord],
        window: &GenomeRegion,
        current_phase_set: &mut Option<u64>,
    ) {
        if records.is_empty() {
            return;
        }
        let anchor = current_phase_set.unwrap_or_else(|| {
            records
                .first()
                .map(|r| r.variant.region().begin())
                .unwrap_or(window.begin())
        });
        let mut any_phased = false;
        for record in records.iter_mut() {
            for sample in &mut record.samples {
                let het = sample.gt_indices.iter().any(|&g| g != sample.gt_indices[0]);
                if het && sample.genotype_quality >= self.config.min_phase_score.score() {
                    sample.phased = true;
                    sample.phase_set = Some(anchor);
                    any_phased = true;
                }
            }
        }
        if any_phased {
            *current_phase_set = Some(anchor);
        }
    }
}

fn retained_allele_sets(
    haplotype_posteriors: &[(HaplotypeId, f64)],
    id_to_alleles: &FxHashMap<HaplotypeId, Vec<crate::basics::allele::Allele>>,
    min_posterior: f64,
) -> Vec<Vec<crate::basics::allele::Allele>> {
    haplotype_posteriors
        .iter()
        .filter(|(_, posterior)| *posterior >= min_posterior)
        .filter_map(|(id, _)| id_to_alleles.get(id).cloned())
        .collect()
}

/// Deterministic stride downsampling once estimated coverage exceeds the
/// cap.
fn downsample(
    reads: Vec<AlignedRead>,
    region: &GenomeRegion,
    above: u32,
    target: u32,
) -> Vec<AlignedRead> {
    if above == 0 || target == 0 || reads.is_empty() {
        return reads;
    }
    let total_bases: u64 = reads.iter().map(|r| r.len() as u64).sum();
    let coverage = total_bases / region.size().max(1);
    if coverage <= above as u64 {
        return reads;
    }
    let keep_every = (coverage as f64 / target as f64).ceil() as usize;
    log::debug!(
        "downsampling {}x coverage to ~{}x (keeping every {}th read)",
        coverage,
        target,
        keep_every
    );
    reads
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % keep_every.max(1) == 0)
        .map(|(_, read)| read)
        .collect()
}

fn window_mapping_quality(sample_reads: &[SampleReads], window: &GenomeRegion) -> f64 {
    let qualities: Vec<u32> = sample_reads
        .iter()
        .flatten()
        .filter(|(_, read)| read.region.overlaps(window))
        .map(|(_, read)| read.mapping_quality as u32)
        .collect();
    median(&qualities)
}

/// Phase sets with a single phased site carry no information; unphase
/// them.
fn strip_singleton_phase_sets(records: &mut [CallRecord]) {
    let mut counts: FxHashMap<(String, u64), usize> = FxHashMap::default();
    for record in records.iter() {
        for sample in &record.samples {
            if let Some(ps) = sample.phase_set {
                *counts.entry((sample.sample.clone(), ps)).or_insert(0) += 1;
            }
        }
    }
    for record in records.iter_mut() {
        for sample in &mut record.samples {
            if let Some(ps) = sample.phase_set {
                if counts
                    .get(&(sample.sample.clone(), ps))
                    .copied()
                    .unwrap_or(0)
                    < 2
                {
                    sample.phased = false;
                    sample.phase_set = None;
                }
            }
        }
    }
}

