//! The haplotype tree: a prefix-sharing trie of alleles over the active
//! window.
//!
//! Each site contributes its reference allele and one or more alternates;
//! every root-to-leaf path is one candidate haplotype. Leaves that cannot
//! accept any allele of a site (because an earlier indel overlaps it)
//! simply skip the site. Pruning and holdout removal rebuild the trie from
//! the surviving paths, which keeps the structure canonical.

use crate::basics::allele::Allele;
use crate::basics::region::GenomeRegion;
use crate::haplotype::haplotype::alleles_compatible;

#[derive(Debug, Clone)]
struct TreeNode {
    allele: Option<(Allele, bool)>, // (allele, is_alternate); None for the root
    parent: usize,
    children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct HaplotypeTree {
    window: GenomeRegion,
    nodes: Vec<TreeNode>,
}

impl HaplotypeTree {
    pub fn new(window: GenomeRegion) -> Self {
        HaplotypeTree {
            window,
            nodes: vec![TreeNode {
                allele: None,
                parent: 0,
                children: Vec::new(),
            }],
        }
    }

    pub fn window(&self) -> &GenomeRegion {
        &self.window
    }

    pub fn set_window(&mut self, window: GenomeRegion) {
        self.window = window;
    }

    fn leaf_indices(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].children.is_empty())
            .collect()
    }

    /// Number of haplotypes the tree currently encodes.
    pub fn num_haplotypes(&self) -> usize {
        self.leaf_indices().len()
    }

    /// Upper bound on the haplotype count after adding a site with
    /// `num_alternates` alternates.
    pub fn projected_haplotypes(&self, num_alternates: usize) -> usize {
        self.num_haplotypes().saturating_mul(num_alternates + 1)
    }

    /// The nearest alternate allele above `node`. Reference alleles are
    /// markers only; they never exclude a later site.
    fn last_alternate_of(&self, mut node: usize) -> Option<&Allele> {
        loop {
            if node == 0 {
                return None;
            }
            if let Some((allele, true)) = &self.nodes[node].allele {
                return Some(allele);
            }
            node = self.nodes[node].parent;
        }
    }

    /// Extend every compatible leaf with the site's reference allele and
    /// each alternate. Sites must arrive in region order.
    pub fn extend_site(&mut self, reference: Allele, alternates: &[Allele]) {
        let leaves = self.leaf_indices();
        for leaf in leaves {
            let compatible = |allele: &Allele| {
                self.last_alternate_of(leaf)
                    .map_or(true, |last| alleles_compatible(last, allele))
            };
            let mut additions: Vec<(Allele, bool)> = Vec::with_capacity(alternates.len() + 1);
            if compatible(&reference) {
                additions.push((reference.clone(), false));
            }
            for alt in alternates {
                if compatible(alt) {
                    additions.push((alt.clone(), true));
                }
            }
            for (allele, is_alt) in additions {
                let index = self.nodes.len();
                self.nodes.push(TreeNode {
                    allele: Some((allele, is_alt)),
                    parent: leaf,
                    children: Vec::new(),
                });
                self.nodes[leaf].children.push(index);
            }
        }
    }

    fn path_of(&self, leaf: usize) -> Vec<(Allele, bool)> {
        let mut path = Vec::new();
        let mut node = leaf;
        while node != 0 {
            if let Some(entry) = &self.nodes[node].allele {
                path.push(entry.clone());
            }
            node = self.nodes[node].parent;
        }
        path.reverse();
        path
    }

    /// The alternate-allele set of every haplotype, in leaf order.
    pub fn haplotype_allele_sets(&self) -> Vec<Vec<Allele>> {
        self.leaf_indices()
            .into_iter()
            .map(|leaf| {
                self.path_of(leaf)
                    .into_iter()
                    .filter(|(_, is_alt)| *is_alt)
                    .map(|(allele, _)| allele)
                    .collect()
            })
            .collect()
    }

    fn rebuild_from_paths(&mut self, paths: Vec<Vec<(Allele, bool)>>) {
        let window = self.window.clone();
        *self = HaplotypeTree::new(window);
        for path in paths {
            let mut node = 0usize;
            for entry in path {
                let existing = self.nodes[node]
                    .children
                    .iter()
                    .copied()
                    .find(|&c| self.nodes[c].allele.as_ref() == Some(&entry));
                node = match existing {
                    Some(child) => child,
                    None => {
                        let index = self.nodes.len();
                        self.nodes.push(TreeNode {
                            allele: Some(entry),
                            parent: node,
                            children: Vec::new(),
                        });
                        self.nodes[node].children.push(index);
                        index
                    }
                };
            }
        }
    }

    /// Keep only haplotypes whose alternate-allele set appears in `keep`.
    pub fn prune_keep(&mut self, keep: &[Vec<Allele>]) {
        let paths: Vec<_> = self
            .leaf_indices()
            .into_iter()
            .map(|leaf| self.path_of(leaf))
            .filter(|path| {
                let alts: Vec<Allele> = path
                    .iter()
                    .filter(|(_, is_alt)| *is_alt)
                    .map(|(a, _)| a.clone())
                    .collect();
                keep.iter().any(|k| k == &alts)
            })
            .collect();
        self.rebuild_from_paths(paths);
    }

    /// Remove an alternate allele from the tree (holdout); haplotypes that
    /// carried it collapse onto their reference-allele counterparts.
    pub fn remove_alternate(&mut self, allele: &Allele) {
        let mut paths: Vec<Vec<(Allele, bool)>> = self
            .leaf_indices()
            .into_iter()
            .map(|leaf| {
                self.path_of(leaf)
                    .into_iter()
                    .filter(|(a, is_alt)| !(*is_alt && a == allele))
                    .collect()
            })
            .collect();
        paths.sort();
        paths.dedup();
        self.rebuild_from_paths(paths);
    }

    /// Drop path prefixes that fall entirely before `boundary`, keeping
    /// phase-relevant suffixes when the window advances.
    pub fn retain_from(&mut self, boundary: u64) {
        let paths: Vec<Vec<(Allele, bool)>> = self
            .leaf_indices()
            .into_iter()
            .map(|leaf| {
                self.path_of(leaf)
                    .into_iter()
                    .filter(|(a, _)| a.region().end() >= boundary)
                    .collect()
            })
            .collect();
        let mut paths = paths;
        paths.sort();
        paths.dedup();
        self.rebuild_from_paths(paths);
    }
}
