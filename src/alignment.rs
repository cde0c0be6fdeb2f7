//! Alignment model shared by every strainer
//!
//! Coordinates are 1-based and closed on both ends. A [`Difference`] records a
//! single mismatch or gap between a query (a read or a strain consensus) and
//! the reference; an [`Alignment`] owns the position-sorted list of them.

use crate::error::{Result, StrainerError};
use serde::{Deserialize, Serialize};
use std::cmp::{max, min};
use std::fmt;

/// Numeric read identifier, unique within one read set
pub type ReadId = u32;

/// A contiguous closed range on a named sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub sequence_id: String,
    pub start: i64,
    pub end: i64,
}

impl Segment {
    pub fn new(sequence_id: impl Into<String>, start: i64, end: i64) -> Result<Self> {
        let sequence_id = sequence_id.into();
        if start > end {
            return Err(StrainerError::InvalidInput(format!(
                "Segment {}:{}-{} has start after end",
                sequence_id, start, end
            )));
        }
        Ok(Segment {
            sequence_id,
            start,
            end,
        })
    }

    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos <= self.end
    }

    /// True when `[start, end]` shares at least one position with this segment
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        start <= self.end && end >= self.start
    }

    /// Same sequence and at least one shared position
    pub fn intersects(&self, other: &Segment) -> bool {
        self.sequence_id == other.sequence_id && self.overlaps(other.start, other.end)
    }

    /// Clip `[start, end]` to this segment, `None` if nothing remains
    pub fn clip(&self, start: i64, end: i64) -> Option<(i64, i64)> {
        let start = max(start, self.start);
        let end = min(end, self.end);
        (start <= end).then_some((start, end))
    }

    /// The part of `other` inside this segment, as a new segment
    pub fn intersection(&self, other: &Segment) -> Option<Segment> {
        if self.sequence_id != other.sequence_id {
            return None;
        }
        self.clip(other.start, other.end).map(|(start, end)| Segment {
            sequence_id: self.sequence_id.clone(),
            start,
            end,
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.sequence_id, self.start, self.end)
    }
}

/// One mismatch or gap between a query and the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    pub ref_pos: i64,
    pub ref_base: u8,
    pub query_pos: i64,
    pub query_base: u8,
}

impl Difference {
    pub const GAP: u8 = b'-';

    pub fn new(ref_pos: i64, ref_base: u8, query_pos: i64, query_base: u8) -> Self {
        Difference {
            ref_pos,
            ref_base,
            query_pos,
            query_base,
        }
    }

    /// Base present in the query but not in the reference
    pub fn is_insertion(&self) -> bool {
        self.ref_base == Self::GAP
    }

    /// Reference base missing from the query
    pub fn is_deletion(&self) -> bool {
        self.query_base == Self::GAP
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.query_base, b'n' | b'N')
    }
}

/// A query mapped onto a reference span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub reference: Segment,
    pub query: Segment,
    diffs: Vec<Difference>,
    /// Uncovered sub-ranges inside the reference span, sorted by start
    unknown: Vec<(i64, i64)>,
}

impl Alignment {
    /// Build an alignment, checking that differences are sorted and inside the
    /// reference span and that uncovered ranges are well formed.
    pub fn new(
        reference: Segment,
        query: Segment,
        diffs: Vec<Difference>,
        mut unknown: Vec<(i64, i64)>,
    ) -> Result<Self> {
        if let Some(pair) = diffs.windows(2).find(|w| w[0].ref_pos > w[1].ref_pos) {
            return Err(StrainerError::InvalidInput(format!(
                "Differences in {} are not sorted by reference position ({} before {})",
                query.sequence_id, pair[0].ref_pos, pair[1].ref_pos
            )));
        }
        if let Some(diff) = diffs.iter().find(|d| !reference.contains(d.ref_pos)) {
            return Err(StrainerError::InvalidInput(format!(
                "Difference at {} in {} lies outside the reference span {}",
                diff.ref_pos, query.sequence_id, reference
            )));
        }
        if let Some(range) = unknown
            .iter()
            .find(|(s, e)| s > e || !reference.contains(*s) || !reference.contains(*e))
        {
            return Err(StrainerError::InvalidInput(format!(
                "Uncovered range {}-{} in {} is not inside {}",
                range.0, range.1, query.sequence_id, reference
            )));
        }
        unknown.sort_unstable();
        Ok(Alignment {
            reference,
            query,
            diffs,
            unknown,
        })
    }

    /// Assemble from parts already known to be valid, recomputing query
    /// coordinates.
    pub(crate) fn assemble(
        reference: Segment,
        query_name: &str,
        diffs: Vec<Difference>,
        mut unknown: Vec<(i64, i64)>,
    ) -> Self {
        debug_assert!(diffs.windows(2).all(|w| w[0].ref_pos <= w[1].ref_pos));
        unknown.sort_unstable();
        let query = Segment {
            sequence_id: query_name.to_string(),
            start: 1,
            end: reference.len(),
        };
        let mut alignment = Alignment {
            reference,
            query,
            diffs,
            unknown,
        };
        alignment.renumber_query();
        alignment
    }

    pub fn start(&self) -> i64 {
        self.reference.start
    }

    pub fn end(&self) -> i64 {
        self.reference.end
    }

    pub fn diffs(&self) -> &[Difference] {
        &self.diffs
    }

    pub fn unknown(&self) -> &[(i64, i64)] {
        &self.unknown
    }

    /// Differences with `start <= ref_pos <= end`
    pub fn diffs_in(&self, start: i64, end: i64) -> &[Difference] {
        let lo = self.diffs.partition_point(|d| d.ref_pos < start);
        let hi = self.diffs.partition_point(|d| d.ref_pos <= end);
        if lo >= hi {
            &[]
        } else {
            &self.diffs[lo..hi]
        }
    }

    pub fn is_uncovered(&self, pos: i64) -> bool {
        self.unknown.iter().any(|&(s, e)| pos >= s && pos <= e)
    }

    /// The part of this alignment inside `[start, end]`
    pub fn clipped(&self, start: i64, end: i64) -> Option<Alignment> {
        let (start, end) = self.reference.clip(start, end)?;
        let reference = Segment {
            sequence_id: self.reference.sequence_id.clone(),
            start,
            end,
        };
        let unknown = self
            .unknown
            .iter()
            .filter_map(|&(s, e)| reference.clip(s, e))
            .collect();
        Some(Alignment::assemble(
            reference,
            &self.query.sequence_id,
            self.diffs_in(start, end).to_vec(),
            unknown,
        ))
    }

    /// Join two alignments: everything of `left`, then the part of `right`
    /// after the end of `left`.
    pub fn splice(left: &Alignment, right: &Alignment, query_name: &str) -> Alignment {
        let cut = left.end();
        let reference = Segment {
            sequence_id: left.reference.sequence_id.clone(),
            start: min(left.start(), right.start()),
            end: max(cut, right.end()),
        };
        let mut diffs = left.diffs.clone();
        diffs.extend(right.diffs.iter().filter(|d| d.ref_pos > cut).copied());

        let mut unknown = left.unknown.clone();
        unknown.extend(
            right
                .unknown
                .iter()
                .filter(|(_, e)| *e > cut)
                .map(|&(s, e)| (max(s, cut + 1), e)),
        );
        // A hole between the two pieces is uncovered as well
        if right.start() > cut + 1 {
            unknown.push((cut + 1, right.start() - 1));
        }
        Alignment::assemble(reference, query_name, diffs, unknown)
    }

    /// Recompute query coordinates so every difference is expressed in the
    /// query's own 1-based frame.
    pub fn renumber_query(&mut self) {
        let origin = self.reference.start;
        let mut shift = 0i64;
        for diff in self.diffs.iter_mut() {
            let offset = diff.ref_pos - origin + 1 + shift;
            if diff.is_insertion() {
                diff.query_pos = offset + 1;
                shift += 1;
            } else if diff.is_deletion() {
                diff.query_pos = offset;
                shift -= 1;
            } else {
                diff.query_pos = offset;
            }
        }
        self.query.start = 1;
        self.query.end = max(1, self.reference.len() + shift);
    }
}

/// A sequencing read aligned to the reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Read {
    pub id: ReadId,
    pub name: String,
    pub alignment: Alignment,
}

impl Read {
    pub fn new(id: ReadId, name: impl Into<String>, alignment: Alignment) -> Self {
        Read {
            id,
            name: name.into(),
            alignment,
        }
    }

    pub fn start(&self) -> i64 {
        self.alignment.start()
    }

    pub fn end(&self) -> i64 {
        self.alignment.end()
    }

    pub fn sequence_id(&self) -> &str {
        &self.alignment.reference.sequence_id
    }

    /// True when the read covers at least one position of `segment`
    pub fn intersects(&self, segment: &Segment) -> bool {
        self.sequence_id() == segment.sequence_id && segment.overlaps(self.start(), self.end())
    }
}
