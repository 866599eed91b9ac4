//! Call extraction: from posterior tables to call records.
//!
//! Computes allele and de-novo posteriors from the trio's joint table
//! (switching to an id-memoised path for large tables), selects the MAP
//! genotype triple under Mendelian consistency, prunes calls the chosen
//! genotypes do not carry, and attaches per-sample genotype confidences.

use crate::basics::allele::Allele;
use crate::basics::region::GenomeRegion;
use crate::basics::variant::Variant;
use crate::calling::trio::{JointProbability, Trio, TrioLatents};
use crate::core::maths::{probability_to_phred, Phred};
use crate::haplotype::genotype::Genotype;
use crate::haplotype::haplotype::HaplotypeArena;
use crate::pipeline::providers::{CallKind, CallRecord, SampleCall};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub min_variant_posterior: Phred,
    pub min_denovo_posterior: Phred,
    pub min_refcall_posterior: Phred,
    pub emit_refcalls: bool,
    /// Joint-table size at which allele containment switches to the
    /// memoised path.
    pub allele_posterior_cache_threshold: usize,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        ExtractionOptions {
            min_variant_posterior: Phred::new(2.0),
            min_denovo_posterior: Phred::new(2.0),
            min_refcall_posterior: Phred::new(2.0),
            emit_refcalls: false,
            allele_posterior_cache_threshold: 500,
        }
    }
}

/// Containment of an allele in the trio table, with optional memoisation
/// keyed by arena and genotype indices.
struct ContainmentOracle<'a> {
    latents: &'a TrioLatents,
    arena: &'a HaplotypeArena,
    memoise: bool,
    haplotype_cache: FxHashMap<u32, bool>,
    genotype_cache: FxHashMap<usize, bool>,
}

impl<'a> ContainmentOracle<'a> {
    fn new(latents: &'a TrioLatents, arena: &'a HaplotypeArena, memoise: bool) -> Self {
        ContainmentOracle {
            latents,
            arena,
            memoise,
            haplotype_cache: FxHashMap::default(),
            genotype_cache: FxHashMap::default(),
        }
    }

    fn reset(&mut self) {
        self.haplotype_cache.clear();
        self.genotype_cache.clear();
    }

    fn genotype_contains(&mut self, genotype_index: usize, allele: &Allele) -> bool {
        if !self.memoise {
            return self.latents.genotypes[genotype_index].contains_allele(self.arena, allele);
        }
        if let Some(&hit) = self.genotype_cache.get(&genotype_index) {
            return hit;
        }
        let genotype = &self.latents.genotypes[genotype_index];
        let mut contains = false;
        for id in genotype.distinct_ids() {
            let hap_hit = match self.haplotype_cache.get(&id.0) {
                Some(&hit) => hit,
                None => {
                    let hit = self.arena.get(id).contains(allele);
                    self.haplotype_cache.insert(id.0, hit);
                    hit
                }
            };
            if hap_hit {
                contains = true;
                break;
            }
        }
        self.genotype_cache.insert(genotype_index, contains);
        contains
    }

    fn trio_contains(&mut self, entry: &JointProbability, allele: &Allele) -> bool {
        self.genotype_contains(entry.maternal, allele)
            || self.genotype_contains(entry.paternal, allele)
            || self.genotype_contains(entry.child, allele)
    }

    fn is_denovo(&mut self, entry: &JointProbability, allele: &Allele) -> bool {
        self.genotype_contains(entry.child, allele)
            && !(self.genotype_contains(entry.maternal, allele)
                || self.genotype_contains(entry.paternal, allele))
    }
}

/// `P(allele observed)` as phred of the complementary mass.
fn allele_posterior(oracle: &mut ContainmentOracle, allele: &Allele) -> (Phred, f64) {
    oracle.reset();
    let mut not_contained = 0.0;
    for i in 0..oracle.latents.joint.len() {
        let entry = oracle.latents.joint[i];
        if !oracle.trio_contains(&entry, allele) {
            not_contained += entry.probability;
        }
    }
    (probability_to_phred(not_contained), not_contained)
}

fn denovo_posterior(oracle: &mut ContainmentOracle, allele: &Allele) -> Phred {
    oracle.reset();
    let mut not_denovo = 0.0;
    for i in 0..oracle.latents.joint.len() {
        let entry = oracle.latents.joint[i];
        if !oracle.is_denovo(&entry, allele) {
            not_denovo += entry.probability;
        }
    }
    probability_to_phred(not_denovo)
}

/// Locate the candidate variant whose alternate allele matches.
/// Candidates must be sorted; on duplicates the first match wins.
fn find_variant<'a>(allele: &Allele, candidates: &'a [Variant]) -> Option<&'a Variant> {
    candidates
        .iter()
        .find(|v| v.region() == allele.region() && v.alt_allele() == allele)
}

/// The genotype restricted to a region: the multiset of per-haplotype
/// sequence copies. `None` when any copy is undefined (indel boundary).
fn region_genotype(
    genotype: &Genotype,
    region: &GenomeRegion,
    arena: &HaplotypeArena,
) -> Option<Vec<Vec<u8>>> {
    let mut copies = Vec::with_capacity(genotype.ploidy());
    for id in genotype.iter() {
        copies.push(arena.get(id).copy_sequence(region)?);
    }
    copies.sort();
    Some(copies)
}

/// Phred confidence that the sample's genotype restricted to `region`
/// really is `target`: the mass of marginal genotypes that restrict to
/// something else.
fn genotype_confidence(
    target: &Option<Vec<Vec<u8>>>,
    region: &GenomeRegion,
    genotypes: &[Genotype],
    marginal: &[f64],
    arena: &HaplotypeArena,
) -> Phred {
    let mut mass_other = 0.0;
    for (i, genotype) in genotypes.iter().enumerate() {
        if &region_genotype(genotype, region, arena) != target {
            mass_other += marginal[i];
        }
    }
    probability_to_phred(mass_other)
}

struct PendingCall {
    variant: Variant,
    posterior: Phred,
    denovo: bool,
}

/// Select the MAP genotype triple, falling back through the posterior
/// ranking to the first triple consistent with the calls.
fn select_trio_call(
    latents: &TrioLatents,
    arena: &HaplotypeArena,
    germline: &[PendingCall],
    denovos: &[PendingCall],
) -> JointProbability {
    let map = latents
        .joint
        .iter()
        .max_by(|a, b| {
            a.probability
                .partial_cmp(&b.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("joint table is never empty")
        .clone();
    let mut oracle = ContainmentOracle::new(latents, arena, false);
    let viable = |oracle: &mut ContainmentOracle, entry: &JointProbability| {
        let mut fine = true;
        for call in germline {
            oracle.reset();
            if oracle.is_denovo(entry, call.variant.alt_allele()) {
                fine = false;
                break;
            }
        }
        if fine {
            for call in denovos {
                oracle.reset();
                if !oracle.is_denovo(entry, call.variant.alt_allele()) {
                    fine = false;
                    break;
                }
            }
        }
        fine
    };
    if latents.joint.len() == 1 || viable(&mut oracle, &map) {
        return map;
    }
    let mut ranked: Vec<&JointProbability> = latents.joint.iter().collect();
    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for entry in ranked.into_iter().skip(1) {
        if viable(&mut oracle, entry) {
            return entry.clone();
        }
    }
    map
}

fn gt_indices(
    genotype: &Genotype,
    variant: &Variant,
    arena: &HaplotypeArena,
) -> Vec<u8> {
    genotype
        .iter()
        .map(|id| {
            match arena.get(id).copy_sequence(variant.region()) {
                Some(seq) if seq == variant.alt_allele().sequence() => 1,
                _ => 0,
            }
        })
        .collect()
}

fn sample_calls_for(
    trio: &Trio,
    called: &JointProbability,
    variant: &Variant,
    latents: &TrioLatents,
    arena: &HaplotypeArena,
) -> Vec<SampleCall> {
    let slots = [
        (&trio.mother, called.maternal, &latents.marginal_maternal),
        (&trio.father, called.paternal, &latents.marginal_paternal),
        (&trio.child, called.child, &latents.marginal_child),
    ];
    slots
        .iter()
        .map(|(sample, genotype_index, marginal)| {
            let genotype = &latents.genotypes[*genotype_index];
            let region = variant.region();
            let target = region_genotype(genotype, region, arena);
            let confidence =
                genotype_confidence(&target, region, &latents.genotypes, marginal, arena);
            SampleCall {
                sample: (*sample).clone(),
                gt_indices: gt_indices(genotype, variant, arena),
                phased: false,
                phase_set: None,
                genotype_quality: confidence.score(),
            }
        })
        .collect()
}

/// Extract germline, de-novo and (optionally) reference calls for the
/// candidates of one window.
pub fn call_trio_variants(
    candidates: &[Variant],
    latents: &TrioLatents,
    arena: &HaplotypeArena,
    trio: &Trio,
    options: &ExtractionOptions,
) -> Vec<CallRecord> {
    if latents.joint.is_empty() || candidates.is_empty() {
        return Vec::new();
    }
    let memoise = latents.joint.len() >= options.allele_posterior_cache_threshold;
    let mut oracle = ContainmentOracle::new(latents, arena, memoise);

    // unique alt alleles, first occurrence wins
    let mut alleles: Vec<Allele> = Vec::new();
    for candidate in candidates {
        if !alleles.contains(candidate.alt_allele()) {
            alleles.push(candidate.alt_allele().clone());
        }
    }

    let mut called: Vec<PendingCall> = Vec::new();
    let mut rejected: Vec<(Allele, f64)> = Vec::new();
    for allele in &alleles {
        let (posterior, not_contained) = allele_posterior(&mut oracle, allele);
        if posterior >= options.min_variant_posterior {
            let denovo_phred = denovo_posterior(&mut oracle, allele);
            let denovo = denovo_phred >= options.min_denovo_posterior;
            if let Some(variant) = find_variant(allele, candidates) {
                called.push(PendingCall {
                    variant: variant.clone(),
                    posterior: if denovo { denovo_phred } else { posterior },
                    denovo,
                });
            }
        } else {
            rejected.push((allele.clone(), not_contained));
        }
    }

    let (denovos, germline): (Vec<PendingCall>, Vec<PendingCall>) =
        called.into_iter().partition(|c| c.denovo);

    let called_trio = select_trio_call(latents, arena, &germline, &denovos);

    // prune calls the chosen genotypes do not carry
    let carried = |oracle: &mut ContainmentOracle, call: &PendingCall| {
        oracle.reset();
        oracle.trio_contains(&called_trio, call.variant.alt_allele())
    };
    let mut records: Vec<CallRecord> = Vec::new();
    let mut retained: Vec<(PendingCall, CallKind)> = Vec::new();
    for call in germline {
        if carried(&mut oracle, &call) {
            retained.push((call, CallKind::Germline));
        }
    }
    for call in denovos {
        if carried(&mut oracle, &call) {
            retained.push((call, CallKind::Denovo));
        }
    }
    retained.sort_by(|a, b| a.0.variant.cmp(&b.0.variant));

    for (call, kind) in retained {
        let samples = sample_calls_for(trio, &called_trio, &call.variant, latents, arena);
        records.push(CallRecord {
            kind,
            variant: call.variant,
            posterior: call.posterior,
            depth: 0,
            mapping_quality: 0.0,
            samples,
            info: vec![("PP".to_string(), format!("{:.2}", call.posterior.score()))],
        });
    }

    if options.emit_refcalls {
        for (allele, not_contained) in rejected {
            let refcall_posterior = probability_to_phred(1.0 - not_contained);
            if refcall_posterior < options.min_refcall_posterior {
                continue;
            }
            if let Some(variant) = find_variant(&allele, candidates) {
                let mut samples = sample_calls_for(trio, &called_trio, variant, latents, arena);
                for sample in &mut samples {
                    for gt in &mut sample.gt_indices {
                        *gt = 0;
                    }
                }
                records.push(CallRecord {
                    kind: CallKind::Reference,
                    variant: variant.clone(),
                    posterior: refcall_posterior,
                    depth: 0,
                    mapping_quality: 0.0,
                    samples,
                    info: Vec::new(),
                });
            }
        }
        records.sort_by(|a, b| a.variant.cmp(&b.variant));
    }

    records
}
