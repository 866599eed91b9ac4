//! Tumor/normal somatic inference.
//!
//! The normal sample is genotyped with the individual model; each tumor
//! sample is then tested per candidate haplotype with a two-model
//! comparison: reads explained by the normal genotype alone, against a
//! mixture of the normal genotype and the somatic haplotype at an unknown
//! cellular fraction (maximised over a fraction grid). The somatic prior
//! comes from the configured mutation rate. Calls carry the MAP VAF and
//! its Beta credible interval.

use crate::basics::variant::Variant;
use crate::calling::individual::{infer_individual, IndividualLatents};
use crate::calling::trio::SampleReads;
use crate::core::errors::Result;
use crate::core::maths::{log_sum_exp2, probability_to_phred, Phred};
use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::{HaplotypeArena, HaplotypeId};
use crate::models::likelihood::HaplotypeLikelihoods;
use crate::models::priors::PriorModel;
use crate::pipeline::providers::{CallKind, CallRecord, SampleCall};
use statrs::distribution::{Beta, ContinuousCDF};

const VAF_GRID: [f64; 8] = [0.02, 0.05, 0.1, 0.15, 0.2, 0.3, 0.4, 0.5];

#[derive(Debug, Clone)]
pub struct SomaticOptions {
    pub somatic_mutation_rate: f64,
    pub min_somatic_frequency: f64,
    pub credible_mass: f64,
    pub min_somatic_posterior: Phred,
}

impl Default for SomaticOptions {
    fn default() -> Self {
        SomaticOptions {
            somatic_mutation_rate: 1e-5,
            min_somatic_frequency: 0.01,
            credible_mass: 0.99,
            min_somatic_posterior: Phred::new(2.0),
        }
    }
}

#[derive(Debug)]
pub struct TumorNormalLatents {
    pub normal_sample: String,
    pub tumor_samples: Vec<String>,
    pub normal: IndividualLatents,
}

pub struct TumorNormalModel<'a> {
    pub arena: &'a HaplotypeArena,
    pub priors: &'a mut PriorModel,
    pub likelihoods: &'a mut HaplotypeLikelihoods,
    pub options: SomaticOptions,
}

impl<'a> TumorNormalModel<'a> {
    pub fn infer_normal(
        &mut self,
        haplotypes: &[HaplotypeId],
        genotypes: Vec<Genotype>,
        normal_sample: &str,
        normal_reads: &SampleReads,
        tumor_samples: &[String],
    ) -> Result<TumorNormalLatents> {
        let normal = infer_individual(
            haplotypes,
            genotypes,
            normal_reads,
            self.priors,
            self.likelihoods,
            self.arena,
        )?;
        Ok(TumorNormalLatents {
            normal_sample: normal_sample.to_string(),
            tumor_samples: tumor_samples.to_vec(),
            normal,
        })
    }

    /// `ln P(tumor reads | normal genotype, somatic haplotype at fraction f)`.
    fn mixture_log_likelihood(
        &mut self,
        reads: &SampleReads,
        germline: &Genotype,
        somatic: Option<(HaplotypeId, f64)>,
    ) -> f64 {
        let ploidy = germline.ploidy() as f64;
        let mut total = 0.0;
        for (read_id, read) in reads {
            let mut germline_mix = f64::NEG_INFINITY;
            for haplotype in germline.iter() {
                let ll = self
                    .likelihoods
                    .log_likelihood(*read_id, read, haplotype, self.arena);
                germline_mix = log_sum_exp2(germline_mix, ll - ploidy.ln());
            }
            total += match somatic {
                None => germline_mix,
                Some((haplotype, fraction)) => {
                    let somatic_ll = self
                        .likelihoods
                        .log_likelihood(*read_id, read, haplotype, self.arena);
                    log_sum_exp2(
                        (1.0 - fraction).ln() + germline_mix,
                        fraction.ln() + somatic_ll,
                    )
                }
            };
        }
        total
    }

    /// Test one tumor sample for somatic variants and emit the calls.
    pub fn call_somatic_variants(
        &mut self,
        candidates: &[Variant],
        latents: &TumorNormalLatents,
        tumor_sample: &str,
        tumor_reads: &SampleReads,
    ) -> Vec<CallRecord> {
        let map_index = latents.normal.map_genotype_index();
        let germline = latents.normal.genotypes[map_index].clone();
        let mut records = Vec::new();
        for candidate in candidates {
            let allele = candidate.alt_allele();
            if germline.contains_allele(self.arena, allele) {
                continue; // germline, not somatic
            }
            // the somatic haplotype is the best-supported carrier of the allele
            let carrier = latents
                .normal
                .haplotype_posteriors
                .iter()
                .filter(|(id, _)| self.arena.get(*id).contains(allele))
                .map(|&(id, _)| id)
                .next();
            let Some(somatic_haplotype) = carrier else {
                continue;
            };

            let germline_evidence =
                self.mixture_log_likelihood(tumor_reads, &germline, None);
            let mut best_fraction = VAF_GRID[0];
            let mut somatic_evidence = f64::NEG_INFINITY;
            for &fraction in VAF_GRID.iter() {
                if fraction < self.options.min_somatic_frequency {
                    continue;
                }
                let evidence = self.mixture_log_likelihood(
                    tumor_reads,
                    &germline,
                    Some((somatic_haplotype, fraction)),
                );
                if evidence > somatic_evidence {
                    somatic_evidence = evidence;
                    best_fraction = fraction;
                }
            }

            let rate = self.options.somatic_mutation_rate;
            let somatic_score = rate.ln() + somatic_evidence;
            let germline_score = (1.0 - rate).ln() + germline_evidence;
            let norm = log_sum_exp2(somatic_score, germline_score);
            let somatic_probability = (somatic_score - norm).exp();
            let posterior = probability_to_phred(1.0 - somatic_probability);
            if posterior < self.options.min_somatic_posterior {
                continue;
            }

            // read-level support for the VAF credible interval
            let support = tumor_reads
                .iter()
                .filter(|(read_id, read)| {
                    let somatic_ll = self.likelihoods.log_likelihood(
                        *read_id,
                        read,
                        somatic_haplotype,
                        self.arena,
                    );
                    germline.iter().all(|h| {
                        somatic_ll
                            > self
                                .likelihoods
                                .log_likelihood(*read_id, read, h, self.arena)
                    })
                })
                .count();
            let depth = tumor_reads.len();
            let (vaf_low, vaf_high) =
                vaf_credible_interval(support, depth, self.options.credible_mass);
            if vaf_high < self.options.min_somatic_frequency {
                continue;
            }

            records.push(CallRecord {
                kind: CallKind::Somatic,
                variant: candidate.clone(),
                posterior,
                depth: depth as u32,
                mapping_quality: 0.0,
                samples: vec![
                    SampleCall {
                        sample: latents.normal_sample.clone(),
                        gt_indices: vec![0; germline.ploidy()],
                        phased: false,
                        phase_set: None,
                        genotype_quality: probability_to_phred(
                            1.0 - latents.normal.posteriors[map_index],
                        )
                        .score(),
                    },
                    SampleCall {
                        sample: tumor_sample.to_string(),
                        gt_indices: vec![0, 1],
                        phased: false,
                        phase_set: None,
                        genotype_quality: posterior.score(),
                    },
                ],
                info: vec![
                    ("SOMATIC".to_string(), "1".to_string()),
                    ("MAP_VAF".to_string(), format!("{:.3}", best_fraction)),
                    (
                        "VAF_CR".to_string(),
                        format!("{:.3},{:.3}", vaf_low, vaf_high),
                    ),
                ],
            });
        }
        records
    }
}

/// Equal-tailed Beta credible interval over the VAF given read support,
/// with a Jeffreys prior.
pub fn vaf_credible_interval(support: usize, depth: usize, credible_mass: f64) -> (f64, f64) {
    let alpha = support as f64 + 0.5;
    let beta = (depth.saturating_sub(support)) as f64 + 0.5;
    let tail = (1.0 - credible_mass) / 2.0;
    match Beta::new(alpha, beta) {
        Ok(dist) => (
            inverse_cdf(&dist, tail),
            inverse_cdf(&dist, 1.0 - tail),
        ),
        Err(_) => (0.0, 1.0),
    }
}

/// Bisection inverse CDF; statrs' Beta has no quantile function.
fn inverse_cdf(dist: &Beta, p: f64) -> f64 {
    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if dist.cdf(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::allele::Allele;
    use crate::basics::read::{AlignedRead, CigarOp, CigarOpKind, ReadFlags};
    use crate::basics::region::GenomeRegion;
    use crate::haplotype::genotype::generate_all_genotypes;
    use crate::haplotype::haplotype::Haplotype;
    use crate::models::indel_error::IndelErrorModel;
    use crate::models::likelihood::ReadId;

    const REF: &[u8] = b"ACGTACGTACGTACGT";

    fn window() -> GenomeRegion {
        GenomeRegion::new("chr1", 100, 116)
    }

    fn reads_of(sequence: &[u8], count: u32, base: u32) -> SampleReads {
        (0..count)
            .map(|i| {
                (
                    ReadId(base + i),
                    AlignedRead::new(
                        format!("r{}", base + i),
                        "chr1",
                        100,
                        sequence.to_vec(),
                        vec![35; sequence.len()],
                        60,
                        vec![CigarOp::new(
                            CigarOpKind::AlignmentMatch,
                            sequence.len() as u32,
                        )],
                        ReadFlags::default(),
                        None,
                    )
                    .unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn tumor_only_allele_is_called_somatic() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let allele = Allele::new(GenomeRegion::new("chr1", 105, 106), *b"T");
        let alt_hap = Haplotype::new(window(), vec![allele.clone()], REF).unwrap();
        let alt_sequence = alt_hap.sequence().to_vec();
        let alt = arena.intern(alt_hap);
        let haplotypes = vec![reference, alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);

        let mut priors = PriorModel::coalescent(1e-3, 1e-4);
        priors.reset(haplotypes.len());
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&arena, &haplotypes);

        let normal_reads = reads_of(REF, 12, 0);
        let tumor_reads: SampleReads = {
            let mut reads = reads_of(REF, 9, 100);
            reads.extend(reads_of(&alt_sequence, 3, 200));
            reads
        };

        let mut model = TumorNormalModel {
            arena: &arena,
            priors: &mut priors,
            likelihoods: &mut likelihoods,
            options: SomaticOptions::default(),
        };
        let latents = model
            .infer_normal(
                &haplotypes,
                genotypes,
                "normal",
                &normal_reads,
                &["tumor".to_string()],
            )
            .unwrap();

        let variant = Variant::new(
            Allele::new(GenomeRegion::new("chr1", 105, 106), *b"C"),
            allele,
        );
        let records =
            model.call_somatic_variants(&[variant], &latents, "tumor", &tumor_reads);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.kind, CallKind::Somatic);
        assert!(record
            .info
            .iter()
            .any(|(k, v)| k == "SOMATIC" && v == "1"));
        let map_vaf: f64 = record
            .info
            .iter()
            .find(|(k, _)| k == "MAP_VAF")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert!(map_vaf >= 0.1 && map_vaf <= 0.5);
    }

    #[test]
    fn germline_allele_is_not_called_somatic() {
        let mut arena = HaplotypeArena::new();
        let reference = arena.intern(Haplotype::reference(window(), REF));
        let allele = Allele::new(GenomeRegion::new("chr1", 105, 106), *b"T");
        let alt_hap = Haplotype::new(window(), vec![allele.clone()], REF).unwrap();
        let alt_sequence = alt_hap.sequence().to_vec();
        let alt = arena.intern(alt_hap);
        let haplotypes = vec![reference, alt];
        let genotypes = generate_all_genotypes(&haplotypes, 2);

        let mut priors = PriorModel::coalescent(1e-3, 1e-4);
        priors.reset(haplotypes.len());
        let mut likelihoods = HaplotypeLikelihoods::new(IndelErrorModel::NovaSeq);
        likelihoods.prime(&arena, &haplotypes);

        // the normal is het too: the allele is germline
        let normal_reads: SampleReads = {
            let mut reads = reads_of(REF, 6, 0);
            reads.extend(reads_of(&alt_sequence, 6, 50));
            reads
        };
        let tumor_reads: SampleReads = {
            let mut reads = reads_of(REF, 6, 100);
            reads.extend(reads_of(&alt_sequence, 6, 200));
            reads
        };

        let mut model = TumorNormalModel {
            arena: &arena,
            priors: &mut priors,
            likelihoods: &mut likelihoods,
            options: SomaticOptions::default(),
        };
        let latents = model
            .infer_normal(
                &haplotypes,
                genotypes,
                "normal",
                &normal_reads,
                &["tumor".to_string()],
            )
            .unwrap();

        let variant = Variant::new(
            Allele::new(GenomeRegion::new("chr1", 105, 106), *b"C"),
            allele,
        );
        let records =
            model.call_somatic_variants(&[variant], &latents, "tumor", &tumor_reads);
        assert!(records.is_empty());
    }

    #[test]
    fn credible_interval_tracks_support() {
        let (lo_small, hi_small) = vaf_credible_interval(1, 100, 0.99);
        assert!(lo_small < 0.01 && hi_small < 0.12);
        let (lo_big, hi_big) = vaf_credible_interval(50, 100, 0.99);
        assert!(lo_big > 0.3 && hi_big < 0.7);
        let (lo_zero, _) = vaf_credible_interval(0, 0, 0.99);
        assert!(lo_zero < 0.5);
    }
}
