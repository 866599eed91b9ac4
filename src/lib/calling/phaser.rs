//! Windowed haplotype generation and phasing support.
//!
//! The generator walks the region's candidates in genomic order, grouping
//! them into active windows bounded by `max_haplotypes` and a merge
//! distance. Each `progress` call builds the haplotype tree for the next
//! window and returns the materialisable allele sets; `keep` tells the
//! generator which haplotypes survived posterior filtering so their
//! alleles can lag into the next window as phase indicators. Overflowing
//! windows shed their rarest variants into a holdout set which is
//! reinjected on the following pass.

use crate::basics::allele::Allele;
use crate::basics::region::GenomeRegion;
use crate::basics::variant::Variant;
use crate::haplotype::tree::HaplotypeTree;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Phasing aggressiveness: how much of the previous window's context is
/// retained as indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaggingPolicy {
    None,
    Conservative,
    Aggressive,
}

impl Default for LaggingPolicy {
    fn default() -> Self {
        LaggingPolicy::Conservative
    }
}

#[derive(Debug, Clone)]
pub struct HaplotypeGeneratorOptions {
    pub max_haplotypes: usize,
    /// Candidates within this many bases are grouped into one window.
    pub max_merge_distance: u64,
    /// Reference padding added around the grouped candidates.
    pub window_padding: u64,
    pub lagging: LaggingPolicy,
    pub max_holdout_depth: usize,
}

impl Default for HaplotypeGeneratorOptions {
    fn default() -> Self {
        HaplotypeGeneratorOptions {
            max_haplotypes: 128,
            max_merge_distance: 30,
            window_padding: 50,
            lagging: LaggingPolicy::default(),
            max_holdout_depth: 3,
        }
    }
}

/// One window's worth of candidate haplotypes.
#[derive(Debug)]
pub struct WindowHaplotypes {
    pub window: GenomeRegion,
    /// Alternate-allele sets, one per haplotype (the empty set is the
    /// reference haplotype).
    pub allele_sets: Vec<Vec<Allele>>,
    /// The variants the window was built from.
    pub variants: Vec<Variant>,
    /// Haplotype budget was exceeded even after holdout; calls from this
    /// window are best-effort.
    pub degraded: bool,
    /// Indicators from the previous window were carried in, so phase is
    /// continuous with it.
    pub connects_previous: bool,
}

#[derive(Debug)]
pub struct HaplotypeGenerator {
    options: HaplotypeGeneratorOptions,
    remaining: VecDeque<Variant>,
    observation_counts: FxHashMap<Variant, u32>,
    indicators: Vec<Variant>,
    holdout: Vec<Vec<Variant>>,
    last_window: Option<GenomeRegion>,
    last_window_variants: Vec<Variant>,
    region: GenomeRegion,
}

/// Group sorted variants into sites sharing a region.
fn group_sites(variants: &[Variant]) -> Vec<(GenomeRegion, Allele, Vec<Allele>)> {
    let mut sites: Vec<(GenomeRegion, Allele, Vec<Allele>)> = Vec::new();
    for variant in variants {
        match sites.last_mut() {
            Some((region, _, alts)) if region == variant.region() => {
                if !alts.contains(variant.alt_allele()) {
                    alts.push(variant.alt_allele().clone());
                }
            }
            _ => sites.push((
                variant.region().clone(),
                variant.ref_allele().clone(),
                vec![variant.alt_allele().clone()],
            )),
        }
    }
    sites
}

impl HaplotypeGenerator {
    pub fn new(
        region: GenomeRegion,
        candidates: Vec<Variant>,
        observation_counts: FxHashMap<Variant, u32>,
        options: HaplotypeGeneratorOptions,
    ) -> Self {
        let mut sorted = candidates;
        sorted.sort();
        sorted.dedup();
        HaplotypeGenerator {
            options,
            remaining: sorted.into(),
            observation_counts,
            indicators: Vec::new(),
            holdout: Vec::new(),
            last_window: None,
            last_window_variants: Vec::new(),
            region,
        }
    }

    pub fn done(&self) -> bool {
        self.remaining.is_empty() && self.holdout.is_empty()
    }

    /// The region the next `progress` call will cover, without consuming
    /// anything.
    pub fn tell_next_active_region(&self) -> Option<GenomeRegion> {
        if self.done() {
            return None;
        }
        let group = self.peek_group();
        self.window_for(&group)
    }

    fn peek_group(&self) -> Vec<Variant> {
        let mut group: Vec<Variant> = self.indicators.clone();
        if let Some(held) = self.holdout.last() {
            group.extend(held.iter().cloned());
        }
        let mut budget_tree = count_tree(&group);
        // the gap rule only applies between newly consumed candidates;
        // indicators may trail arbitrarily far behind
        let mut last_new_end: Option<u64> = None;
        for variant in &self.remaining {
            if let Some(end) = last_new_end {
                let gap = variant.region().begin().saturating_sub(end);
                if gap > self.options.max_merge_distance {
                    break;
                }
            }
            let projected = project_with(&budget_tree, variant);
            if projected > self.options.max_haplotypes && last_new_end.is_some() {
                break;
            }
            budget_tree = note_variant(budget_tree, variant);
            last_new_end = Some(
                last_new_end.map_or(variant.region().end(), |e| e.max(variant.region().end())),
            );
            group.push(variant.clone());
        }
        group.sort();
        group.dedup();
        group
    }

    fn window_for(&self, group: &[Variant]) -> Option<GenomeRegion> {
        let first = group.first()?;
        let mut span = first.region().clone();
        for variant in group.iter().skip(1) {
            span = span.encompassing(variant.region())?;
        }
        let padded = span.expanded(self.options.window_padding, self.options.window_padding);
        // padding is clipped to the driving region, the candidate span
        // never is
        let clipped = padded.intersection(&self.region).unwrap_or(padded);
        clipped.encompassing(&span)
    }

    /// Build the next window's haplotypes. Returns `None` when the
    /// generator is exhausted.
    pub fn progress(&mut self) -> Option<WindowHaplotypes> {
        if self.done() {
            return None;
        }
        // indicators only extend phase across modest gaps; a distant next
        // candidate breaks the phase set instead of inflating the window
        if !self.indicators.is_empty() {
            let indicator_end = self
                .indicators
                .iter()
                .map(|v| v.region().end())
                .max()
                .unwrap_or(0);
            if let Some(front) = self.remaining.front() {
                if front.region().begin().saturating_sub(indicator_end)
                    > 4 * self.options.max_merge_distance
                {
                    self.indicators.clear();
                }
            }
        }
        let connects_previous = !self.indicators.is_empty();
        let mut group: Vec<Variant> = self.indicators.drain(..).collect();
        if let Some(held) = self.holdout.pop() {
            group.extend(held);
        }
        // consume candidates that belong to this window; the gap rule
        // only applies between newly consumed candidates
        let mut budget_tree = count_tree(&group);
        let mut last_new_end: Option<u64> = None;
        while let Some(variant) = self.remaining.front() {
            if let Some(end) = last_new_end {
                let gap = variant.region().begin().saturating_sub(end);
                if gap > self.options.max_merge_distance {
                    break;
                }
            }
            let projected = project_with(&budget_tree, variant);
            if projected > self.options.max_haplotypes && last_new_end.is_some() {
                break;
            }
            let variant = self.remaining.pop_front().expect("front just peeked");
            budget_tree = note_variant(budget_tree, &variant);
            last_new_end = Some(
                last_new_end.map_or(variant.region().end(), |e| e.max(variant.region().end())),
            );
            group.push(variant);
        }
        group.sort();
        group.dedup();

        // overflow: shed the rarest variants into the holdout
        let mut degraded = false;
        let mut sites = group_sites(&group);
        let mut projected = projected_haplotypes(&sites);
        if projected > self.options.max_haplotypes {
            if self.holdout.len() >= self.options.max_holdout_depth {
                degraded = true;
                log::warn!(
                    "holdout depth {} exhausted; calling with a truncated haplotype set",
                    self.options.max_holdout_depth
                );
            }
            let mut by_rarity: Vec<Variant> = group.clone();
            by_rarity.sort_by_key(|v| self.observation_counts.get(v).copied().unwrap_or(0));
            let mut held: Vec<Variant> = Vec::new();
            for rare in by_rarity {
                if projected <= self.options.max_haplotypes {
                    break;
                }
                group.retain(|v| v != &rare);
                held.push(rare);
                sites = group_sites(&group);
                projected = projected_haplotypes(&sites);
            }
            if !degraded && !held.is_empty() {
                held.sort();
                self.holdout.push(held);
            }
        }

        let window = self.window_for(&group)?;
        let mut tree = HaplotypeTree::new(window.clone());
        for (_, reference, alternates) in &sites {
            tree.extend_site(reference.clone(), alternates);
        }
        let allele_sets = tree.haplotype_allele_sets();
        self.last_window = Some(window.clone());
        self.last_window_variants = group.clone();
        Some(WindowHaplotypes {
            window,
            allele_sets,
            variants: group,
            degraded,
            connects_previous,
        })
    }

    /// Record which haplotypes survived the caller's posterior filter;
    /// their alleles near the window tail become the next window's
    /// indicators, subject to the lagging policy.
    pub fn keep(&mut self, surviving: &[Vec<Allele>]) {
        self.indicators.clear();
        let Some(window) = &self.last_window else {
            return;
        };
        let lag_begin = match self.options.lagging {
            LaggingPolicy::None => return,
            LaggingPolicy::Conservative => window.begin() + 2 * window.size() / 3,
            LaggingPolicy::Aggressive => window.begin(),
        };
        let max_indicators = (self.options.max_haplotypes.max(2) as f64).log2() as usize;
        let mut kept_alleles: Vec<&Allele> = surviving.iter().flatten().collect();
        kept_alleles.sort();
        kept_alleles.dedup();
        let mut indicators: Vec<Variant> = self
            .last_window_variants
            .iter()
            .filter(|v| {
                v.region().end() >= lag_begin && kept_alleles.contains(&v.alt_allele())
            })
            .cloned()
            .collect();
        // nearest to the window end first, then cap
        indicators.sort_by_key(|v| std::cmp::Reverse(v.region().end()));
        indicators.truncate(max_indicators);
        indicators.sort();
        self.indicators = indicators;
    }

    /// Skip ahead, dropping pending candidates before `to` along with any
    /// phase context.
    pub fn force_forward(&mut self, to: &GenomeRegion) {
        while let Some(front) = self.remaining.front() {
            if front.region().is_before(to) {
                self.remaining.pop_front();
            } else {
                break;
            }
        }
        self.indicators.clear();
        self.holdout.clear();
    }
}

/// A cheap (sites, per-site alternate counts) summary for projecting the
/// haplotype count without building trees.
type CountTree = Vec<(GenomeRegion, usize)>;

fn count_tree(group: &[Variant]) -> CountTree {
    group_sites(group)
        .into_iter()
        .map(|(region, _, alts)| (region, alts.len()))
        .collect()
}

fn note_variant(mut tree: CountTree, variant: &Variant) -> CountTree {
    match tree.iter_mut().find(|(region, _)| region == variant.region()) {
        Some((_, alts)) => *alts += 1,
        None => tree.push((variant.region().clone(), 1)),
    }
    tree
}

fn project_with(tree: &CountTree, variant: &Variant) -> usize {
    projected_from(&note_variant(tree.clone(), variant))
}

fn projected_from(tree: &CountTree) -> usize {
    tree.iter()
        .fold(1usize, |acc, (_, alts)| acc.saturating_mul(alts + 1))
}

fn projected_haplotypes(sites: &[(GenomeRegion, Allele, Vec<Allele>)]) -> usize {
    sites
        .iter()
        .fold(1usize, |acc, (_, _, alts)| acc.saturating_mul(alts.len() + 1))
}
