//! Genomic coordinates.
//!
//! A [`GenomeRegion`] is a zero-based, half-open interval on a named contig.
//! Regions order lexicographically by contig name, then begin, then end,
//! which is the order candidates, haplotypes and output records are kept in
//! throughout the caller.

use crate::core::errors::{CallerError, Result};
use serde::Serialize;
use smartstring::{LazyCompact, SmartString};
use std::cmp::Ordering;
use std::fmt;

/// Contig names are short and repeated everywhere; keep them inline.
pub type ContigName = SmartString<LazyCompact>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct GenomeRegion {
    contig: ContigName,
    begin: u64,
    end: u64,
}

impl GenomeRegion {
    /// A new region; `begin <= end` is a construction invariant.
    pub fn new(contig: &str, begin: u64, end: u64) -> Self {
        assert!(begin <= end, "region begin must not exceed end");
        GenomeRegion {
            contig: ContigName::from(contig),
            begin,
            end,
        }
    }

    /// An empty region marking the point between bases `position - 1` and
    /// `position` (the anchor used for insertion alleles).
    pub fn point(contig: &str, position: u64) -> Self {
        Self::new(contig, position, position)
    }

    /// Parse `contig:begin-end` (zero-based, half-open).
    pub fn parse(text: &str) -> Result<Self> {
        let (contig, rest) = text
            .rsplit_once(':')
            .ok_or_else(|| CallerError::Region(format!("expected contig:begin-end, got '{}'", text)))?;
        let (begin, end) = rest
            .split_once('-')
            .ok_or_else(|| CallerError::Region(format!("expected begin-end in '{}'", text)))?;
        let begin: u64 = begin
            .parse()
            .map_err(|_| CallerError::Region(format!("bad begin in '{}'", text)))?;
        let end: u64 = end
            .parse()
            .map_err(|_| CallerError::Region(format!("bad end in '{}'", text)))?;
        if begin > end {
            return Err(CallerError::Region(format!("begin > end in '{}'", text)));
        }
        Ok(Self::new(contig, begin, end))
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn same_contig(&self, other: &GenomeRegion) -> bool {
        self.contig == other.contig
    }

    /// Two regions overlap when they share the contig and their intervals
    /// intersect. An empty region behaves as the point between two bases
    /// and overlaps any region whose closed span covers that point, so an
    /// insertion anchored at a window boundary still belongs to the window.
    pub fn overlaps(&self, other: &GenomeRegion) -> bool {
        if !self.same_contig(other) {
            return false;
        }
        match (self.is_empty(), other.is_empty()) {
            (true, true) => self.begin == other.begin,
            (true, false) => other.begin <= self.begin && self.begin <= other.end,
            (false, true) => self.begin <= other.begin && other.begin <= self.end,
            (false, false) => self.begin < other.end && other.begin < self.end,
        }
    }

    /// Whether `other` lies entirely within this region.
    pub fn contains(&self, other: &GenomeRegion) -> bool {
        self.same_contig(other) && self.begin <= other.begin && other.end <= self.end
    }

    pub fn contains_position(&self, position: u64) -> bool {
        self.begin <= position && position < self.end
    }

    /// Strictly left of `other` on the same contig, no overlap.
    pub fn is_before(&self, other: &GenomeRegion) -> bool {
        self.same_contig(other) && self.end <= other.begin && !self.overlaps(other)
    }

    pub fn is_after(&self, other: &GenomeRegion) -> bool {
        other.is_before(self)
    }

    /// Abutting without overlap.
    pub fn is_adjacent(&self, other: &GenomeRegion) -> bool {
        self.same_contig(other) && (self.end == other.begin || other.end == self.begin)
    }

    /// Grow the region by `left` and `right` bases, clamping at zero.
    pub fn expanded(&self, left: u64, right: u64) -> GenomeRegion {
        GenomeRegion {
            contig: self.contig.clone(),
            begin: self.begin.saturating_sub(left),
            end: self.end.saturating_add(right),
        }
    }

    /// The overlapping part of two regions, if any.
    pub fn intersection(&self, other: &GenomeRegion) -> Option<GenomeRegion> {
        if !self.overlaps(other) {
            return None;
        }
        Some(GenomeRegion {
            contig: self.contig.clone(),
            begin: self.begin.max(other.begin),
            end: self.end.min(other.end),
        })
    }

    /// The smallest region covering both inputs (same contig only).
    pub fn encompassing(&self, other: &GenomeRegion) -> Option<GenomeRegion> {
        if !self.same_contig(other) {
            return None;
        }
        Some(GenomeRegion {
            contig: self.contig.clone(),
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        })
    }
}

impl PartialOrd for GenomeRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenomeRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.contig
            .cmp(&other.contig)
            .then(self.begin.cmp(&other.begin))
            .then(self.end.cmp(&other.end))
    }
}

impl fmt::Display for GenomeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = GenomeRegion::new("chr1", 10, 20);
        let b = GenomeRegion::new("chr1", 10, 25);
        let c = GenomeRegion::new("chr1", 15, 16);
        let d = GenomeRegion::new("chr2", 0, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn overlap_and_containment() {
        let a = GenomeRegion::new("chr1", 10, 20);
        let b = GenomeRegion::new("chr1", 15, 30);
        let c = GenomeRegion::new("chr1", 20, 25);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.is_adjacent(&c));
        assert!(a.is_before(&c));
        assert!(c.is_after(&a));
        assert!(GenomeRegion::new("chr1", 0, 50).contains(&a));
        assert!(!a.overlaps(&GenomeRegion::new("chr2", 10, 20)));
    }

    #[test]
    fn empty_region_overlaps_at_boundaries() {
        let window = GenomeRegion::new("chr1", 100, 200);
        assert!(GenomeRegion::point("chr1", 100).overlaps(&window));
        assert!(GenomeRegion::point("chr1", 150).overlaps(&window));
        assert!(GenomeRegion::point("chr1", 200).overlaps(&window));
        assert!(!GenomeRegion::point("chr1", 201).overlaps(&window));
        assert!(GenomeRegion::point("chr1", 5).overlaps(&GenomeRegion::point("chr1", 5)));
        assert!(!GenomeRegion::point("chr1", 5).overlaps(&GenomeRegion::point("chr1", 6)));
    }

    #[test]
    fn parse_round_trips_display() {
        let region = GenomeRegion::parse("chr2:100-250").unwrap();
        assert_eq!(region.to_string(), "chr2:100-250");
        assert!(GenomeRegion::parse("chr2:250-100").is_err());
        assert!(GenomeRegion::parse("nonsense").is_err());
    }

    proptest! {
        #[test]
        fn intersection_is_symmetric_and_contained(
            b1 in 0u64..1000, s1 in 0u64..100, b2 in 0u64..1000, s2 in 0u64..100
        ) {
            let a = GenomeRegion::new("chr1", b1, b1 + s1);
            let b = GenomeRegion::new("chr1", b2, b2 + s2);
            let ab = a.intersection(&b);
            let ba = b.intersection(&a);
            prop_assert_eq!(ab.clone(), ba);
            if let Some(i) = ab {
                prop_assert!(a.overlaps(&b));
                prop_assert!(i.size() <= a.size().max(1));
                prop_assert!(i.begin() >= a.begin().min(b.begin()));
            }
        }
    }
}
