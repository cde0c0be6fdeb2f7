use crate::alignment::{Alignment, Difference, Read, ReadId, Segment};
use crate::error::{Result, StrainerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A group of reads believed to come from one sequence variant, together with
/// the consensus alignment derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strain {
    name: String,
    reads: BTreeMap<ReadId, Read>,
    alignment: Alignment,
    /// Ranges copied from a donor strain rather than observed in member reads
    filled: Vec<(i64, i64)>,
    bases: Option<String>,
}

impl Strain {
    pub fn new(name: impl Into<String>, mut alignment: Alignment) -> Self {
        let name = name.into();
        alignment.query.sequence_id = name.clone();
        Strain {
            name,
            reads: BTreeMap::new(),
            alignment,
            filled: Vec::new(),
            bases: None,
        }
    }

    /// Build a strain from member reads and derive its consensus
    pub fn from_reads(
        name: impl Into<String>,
        reads: impl IntoIterator<Item = Read>,
    ) -> Result<Self> {
        let name = name.into();
        let reads: BTreeMap<ReadId, Read> = reads.into_iter().map(|r| (r.id, r)).collect();
        let alignment = consensus_from_reads(&name, reads.values())?;
        Ok(Strain {
            name,
            reads,
            alignment,
            filled: Vec::new(),
            bases: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.alignment.query.sequence_id = self.name.clone();
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub(crate) fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
        self.bases = None;
    }

    pub fn start(&self) -> i64 {
        self.alignment.start()
    }

    pub fn end(&self) -> i64 {
        self.alignment.end()
    }

    pub fn reads(&self) -> impl Iterator<Item = &Read> {
        self.reads.values()
    }

    pub fn read_ids(&self) -> impl Iterator<Item = ReadId> + '_ {
        self.reads.keys().copied()
    }

    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    pub fn contains_read(&self, id: ReadId) -> bool {
        self.reads.contains_key(&id)
    }

    pub fn add_read(&mut self, read: Read) {
        self.reads.insert(read.id, read);
    }

    /// Copy the members of `other` into this strain
    pub fn merge_reads(&mut self, other: &Strain) {
        for read in other.reads() {
            self.reads.entry(read.id).or_insert_with(|| read.clone());
        }
    }

    /// Move the members of `other` into this strain
    pub fn absorb(&mut self, other: Strain) {
        for (id, read) in other.reads {
            self.reads.entry(id).or_insert(read);
        }
    }

    pub fn filled(&self) -> &[(i64, i64)] {
        &self.filled
    }

    pub(crate) fn set_filled(&mut self, filled: Vec<(i64, i64)>) {
        self.filled = filled;
    }

    /// Recompute the consensus alignment from the current members
    pub fn rebuild_from_reads(&mut self) -> Result<()> {
        self.alignment = consensus_from_reads(&self.name, self.reads.values())?;
        self.filled.clear();
        self.bases = None;
        Ok(())
    }

    /// Members intersecting `segment`, clipped consensus; `None` when no
    /// member read remains.
    pub fn restricted_to(&self, segment: &Segment) -> Option<Strain> {
        let alignment = self.alignment.clipped(segment.start, segment.end)?;
        let reads: BTreeMap<ReadId, Read> = self
            .reads
            .iter()
            .filter(|(_, r)| r.intersects(segment))
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        if reads.is_empty() {
            return None;
        }
        let filled = self
            .filled
            .iter()
            .filter_map(|&(s, e)| segment.clip(s, e))
            .collect();
        Some(Strain {
            name: self.name.clone(),
            reads,
            alignment,
            filled,
            bases: None,
        })
    }

    pub fn bases(&self) -> Option<&str> {
        self.bases.as_deref()
    }

    /// Cache materialized bases; the first value wins until cleared
    pub fn set_bases(&mut self, bases: String) {
        if self.bases.is_none() {
            self.bases = Some(bases);
        }
    }

    pub fn clear_bases(&mut self) {
        self.bases = None;
    }
}

/// Chain reads by start position into one alignment: each read contributes the
/// differences lying beyond the part already covered. Holes between reads are
/// recorded as uncovered.
fn consensus_from_reads<'a>(
    name: &str,
    reads: impl Iterator<Item = &'a Read>,
) -> Result<Alignment> {
    let mut ordered: Vec<&Read> = reads.collect();
    if ordered.is_empty() {
        return Err(StrainerError::Algorithm(format!(
            "Strain {} has no reads to derive a consensus from",
            name
        )));
    }
    ordered.sort_by_key(|r| (r.start(), r.end(), r.id));

    let sequence_id = ordered[0].sequence_id().to_string();
    if let Some(stray) = ordered.iter().find(|r| r.sequence_id() != sequence_id) {
        return Err(StrainerError::InvalidInput(format!(
            "Read {} of strain {} is on {}, expected {}",
            stray.name,
            name,
            stray.sequence_id(),
            sequence_id
        )));
    }

    let start = ordered[0].start();
    let mut end = ordered[0].end();
    let mut diffs: Vec<Difference> = ordered[0].alignment.diffs().to_vec();
    let mut unknown: Vec<(i64, i64)> = ordered[0].alignment.unknown().to_vec();

    for read in &ordered[1..] {
        if read.end() <= end {
            continue;
        }
        if read.start() > end + 1 {
            unknown.push((end + 1, read.start() - 1));
        }
        diffs.extend(read.alignment.diffs_in(end + 1, read.end()).iter().copied());
        unknown.extend(
            read.alignment
                .unknown()
                .iter()
                .filter(|(_, e)| *e > end)
                .map(|&(s, e)| (s.max(end + 1), e)),
        );
        end = read.end();
    }

    let reference = Segment {
        sequence_id,
        start,
        end,
    };
    Ok(Alignment::assemble(reference, name, diffs, unknown))
}
