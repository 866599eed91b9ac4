use std::path::PathBuf;
use structopt::StructOpt;

/// Call small variants from aligned short reads.
#[derive(StructOpt, Debug, Clone)]
#[structopt(rename_all = "kebab-case")]
pub struct CallArgs {
    /// Indexed reference FASTA (a .fai sidecar must exist)
    #[structopt(long, short = "R", parse(from_os_str))]
    pub reference: PathBuf,

    /// Indexed BAM files, one per sample, as SAMPLE=PATH pairs
    #[structopt(long, short = "I", required = true)]
    pub reads: Vec<String>,

    /// Output file; stdout when omitted
    #[structopt(long, short = "o", parse(from_os_str))]
    pub output: Option<PathBuf>,

    /// Which caller to run
    #[structopt(long, short = "C", default_value = "population",
                possible_values = &["individual", "population", "trio", "cancer"])]
    pub caller: String,

    /// Organism ploidy; contigs without an override use this
    #[structopt(long, default_value = "2")]
    pub ploidy: usize,

    /// Per-contig ploidy overrides as CONTIG=PLOIDY pairs
    #[structopt(long)]
    pub contig_ploidies: Vec<String>,

    /// Maternal sample (required for trio calling)
    #[structopt(long)]
    pub maternal_sample: Option<String>,

    /// Paternal sample (required for trio calling)
    #[structopt(long)]
    pub paternal_sample: Option<String>,

    /// Normal sample for somatic calling; all samples are tumor if unset
    #[structopt(long)]
    pub normal_sample: Option<String>,

    /// Regions to call, as contig:begin-end (zero based); everything if
    /// empty
    #[structopt(long, short = "T")]
    pub regions: Vec<String>,

    /// Regions to skip
    #[structopt(long)]
    pub skip_regions: Vec<String>,

    /// Maximum candidate haplotypes per window
    #[structopt(long, default_value = "128")]
    pub max_haplotypes: usize,

    /// Posterior below which haplotypes are dropped between windows
    #[structopt(long, default_value = "1e-10")]
    pub min_haplotype_posterior: f64,

    /// Phasing aggressiveness
    #[structopt(long, default_value = "conservative",
                possible_values = &["minimal", "conservative", "aggressive"])]
    pub phasing_level: String,

    /// Minimum phred phase score to report phased sites
    #[structopt(long, default_value = "20")]
    pub min_phase_score: f64,

    /// Minimum phred posterior to report a variant
    #[structopt(long, default_value = "2")]
    pub min_variant_posterior: f64,

    /// Minimum phred posterior to report a reference call
    #[structopt(long, default_value = "2")]
    pub min_refcall_posterior: f64,

    /// Emit reference confidence records
    #[structopt(long)]
    pub refcalls: bool,

    /// Minimum phred posterior to report a somatic mutation
    #[structopt(long, default_value = "2")]
    pub min_somatic_posterior: f64,

    /// Minimum phred posterior to report a de novo mutation
    #[structopt(long, default_value = "2")]
    pub min_denovo_posterior: f64,

    /// Germline SNP heterozygosity for the genotype prior
    #[structopt(long, default_value = "0.001")]
    pub snp_heterozygosity: f64,

    /// Germline indel heterozygosity for the genotype prior
    #[structopt(long, default_value = "0.0001")]
    pub indel_heterozygosity: f64,

    /// Expected somatic mutation rate
    #[structopt(long, default_value = "0.00001")]
    pub somatic_mutation_rate: f64,

    /// Minimum credible somatic allele frequency
    #[structopt(long, default_value = "0.01")]
    pub min_somatic_frequency: f64,

    /// Posterior mass used for allele frequency credible intervals
    #[structopt(long, default_value = "0.99")]
    pub credible_mass: f64,

    /// Minimum base quality for candidate generation
    #[structopt(long, default_value = "20")]
    pub min_base_quality: u8,

    /// Minimum read mapping quality
    #[structopt(long, default_value = "20")]
    pub min_mapping_quality: u8,

    /// Base quality threshold for the good-base read filters
    #[structopt(long, default_value = "20")]
    pub good_base_quality: u8,

    /// Minimum number of good bases for a read to be used
    #[structopt(long, default_value = "20")]
    pub min_good_bases: usize,

    /// Minimum fraction of good bases for a read to be used
    #[structopt(long)]
    pub min_good_base_fraction: Option<f64>,

    /// Downsample regions above this coverage
    #[structopt(long, default_value = "500")]
    pub downsample_above: u32,

    /// Target coverage for the downsampler
    #[structopt(long, default_value = "400")]
    pub downsample_target: u32,

    /// Skip candidate variants larger than this
    #[structopt(long, default_value = "2000")]
    pub max_variant_size: u64,

    /// Upper bound on jointly evaluated genotype combinations
    #[structopt(long, default_value = "1000000")]
    pub max_joint_genotypes: usize,

    /// Joint-table size at which allele posteriors switch to the
    /// memoised path
    #[structopt(long, default_value = "500")]
    pub allele_posterior_cache_threshold: usize,

    /// Sequencer indel error model
    #[structopt(long, default_value = "novaseq", possible_values = &["hiseq", "novaseq"])]
    pub sequencer_error_model: String,

    /// Also propose candidates by local re-assembly of the active region
    #[structopt(long)]
    pub assembler_candidates: bool,

    /// K-mer sizes for the re-assembly candidate generator
    #[structopt(long, default_value = "10,25", use_delimiter = true)]
    pub kmer_sizes: Vec<usize>,

    /// Minimum base quality for a read k-mer to seed re-assembly
    #[structopt(long, default_value = "15")]
    pub min_assembler_base_quality: u8,

    /// Worker threads; 0 means one per available CPU
    #[structopt(long, short = "t", default_value = "1")]
    pub threads: usize,

    /// Bases per worker chunk
    #[structopt(long, default_value = "500000")]
    pub chunk_size: u64,

    /// Limit on simultaneously open read files
    #[structopt(long, default_value = "250")]
    pub max_open_read_files: usize,

    /// Per-region timeout in seconds; unlimited when omitted
    #[structopt(long)]
    pub region_timeout: Option<u64>,
}
