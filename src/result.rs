//! Strainer output: a flat list of strains or one child result per group

use crate::alignment::Segment;
use crate::error::{Result, StrainerError};
use crate::options::MaterializeOptions;
use crate::strain::Strain;
use crate::translate::{proteins_match, translate};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read as _, Write};
use std::path::Path;

const SNAPSHOT_MAGIC: &[u8; 8] = b"STRAINR1";

/// Strains found over one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatResult {
    pub segment: Segment,
    strains: Vec<Strain>,
    /// Options the cached bases were built with
    materialized: Option<MaterializeOptions>,
}

/// One child result per pre-existing group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedStrainerResult {
    pub segment: Segment,
    children: Vec<NestedChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedChild {
    pub group: String,
    pub result: StrainerResult,
}

impl NestedStrainerResult {
    pub fn new(segment: Segment, children: Vec<NestedChild>) -> Self {
        NestedStrainerResult { segment, children }
    }

    pub fn children(&self) -> &[NestedChild] {
        &self.children
    }

    pub fn child(&self, group: &str) -> Option<&StrainerResult> {
        self.children
            .iter()
            .find(|c| c.group == group)
            .map(|c| &c.result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrainerResult {
    Flat(FlatResult),
    Nested(NestedStrainerResult),
}

impl StrainerResult {
    pub fn flat(segment: Segment, strains: Vec<Strain>) -> Self {
        StrainerResult::Flat(FlatResult {
            segment,
            strains,
            materialized: None,
        })
    }

    pub fn nested(segment: Segment, children: Vec<NestedChild>) -> Self {
        StrainerResult::Nested(NestedStrainerResult::new(segment, children))
    }

    pub fn segment(&self) -> &Segment {
        match self {
            StrainerResult::Flat(flat) => &flat.segment,
            StrainerResult::Nested(nested) => &nested.segment,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, StrainerResult::Nested(_))
    }

    /// Number of strains, counting through nested children
    pub fn size(&self) -> usize {
        match self {
            StrainerResult::Flat(flat) => flat.strains.len(),
            StrainerResult::Nested(nested) => nested.children.iter().map(|c| c.result.size()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Every strain, depth first in child order
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Strain> + '_> {
        match self {
            StrainerResult::Flat(flat) => Box::new(flat.strains.iter()),
            StrainerResult::Nested(nested) => {
                Box::new(nested.children.iter().flat_map(|c| c.result.iter()))
            }
        }
    }

    pub fn strains(&self) -> Vec<&Strain> {
        self.iter().collect()
    }

    pub fn into_strains(self) -> Vec<Strain> {
        match self {
            StrainerResult::Flat(flat) => flat.strains,
            StrainerResult::Nested(nested) => nested
                .children
                .into_iter()
                .flat_map(|c| c.result.into_strains())
                .collect(),
        }
    }

    /// Build the bases of every strain over its result window and return
    /// `(name, bases)` pairs in iteration order.
    ///
    /// `reference` holds the reference sequence, position 1 at index 0. With
    /// `convert_to_amino_acids`, strains whose proteins agree (`X` matching
    /// anything) are folded into the earlier one within each flat result.
    /// A repeated call with the same options returns the cached bases.
    pub fn materialize_sequences(
        &mut self,
        reference: &[u8],
        options: &MaterializeOptions,
    ) -> Result<Vec<(String, String)>> {
        let mut out = Vec::with_capacity(self.size());
        self.materialize_into(reference, options, &mut out)?;
        Ok(out)
    }

    fn materialize_into(
        &mut self,
        reference: &[u8],
        options: &MaterializeOptions,
        out: &mut Vec<(String, String)>,
    ) -> Result<()> {
        match self {
            StrainerResult::Flat(flat) => {
                flat.materialize(reference, options)?;
                for strain in &flat.strains {
                    let bases = strain.bases().unwrap_or_default().to_string();
                    out.push((strain.name().to_string(), bases));
                }
            }
            StrainerResult::Nested(nested) => {
                for child in nested.children.iter_mut() {
                    child.result.materialize_into(reference, options, out)?;
                }
            }
        }
        Ok(())
    }

    pub fn rename_strains(&mut self, rename: &mut dyn FnMut(&str) -> String) {
        match self {
            StrainerResult::Flat(flat) => {
                for strain in flat.strains.iter_mut() {
                    let name = rename(strain.name());
                    strain.set_name(name);
                }
            }
            StrainerResult::Nested(nested) => {
                for child in nested.children.iter_mut() {
                    child.result.rename_strains(rename);
                }
            }
        }
    }

    /// Drop cached bases so the next materialization rebuilds them
    pub fn clear_cached_sequences(&mut self) {
        match self {
            StrainerResult::Flat(flat) => {
                for strain in flat.strains.iter_mut() {
                    strain.clear_bases();
                }
                flat.materialized = None;
            }
            StrainerResult::Nested(nested) => {
                for child in nested.children.iter_mut() {
                    child.result.clear_cached_sequences();
                }
            }
        }
    }

    /// Serialize into a self-describing byte snapshot
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        let mut bytes = SNAPSHOT_MAGIC.to_vec();
        let body = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StrainerError::Snapshot(format!("Failed to encode result: {e}")))?;
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(SNAPSHOT_MAGIC.as_slice())
            .ok_or_else(|| StrainerError::Snapshot("Invalid magic bytes in snapshot".to_string()))?;
        let (result, _) = bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| StrainerError::Snapshot(format!("Failed to decode result: {e}")))?;
        Ok(result)
    }

    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(SNAPSHOT_MAGIC)?;
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| StrainerError::Snapshot(format!("Failed to write {:?}: {e}", path)))?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_snapshot(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(StrainerError::Snapshot(format!(
                "Invalid magic bytes in {:?}",
                path
            )));
        }
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| StrainerError::Snapshot(format!("Failed to load {:?}: {e}", path)))
    }
}

impl FlatResult {
    pub fn strains(&self) -> &[Strain] {
        &self.strains
    }

    fn materialize(&mut self, reference: &[u8], options: &MaterializeOptions) -> Result<()> {
        if self.materialized.as_ref() == Some(options) {
            debug!("Reusing cached sequences for {}", self.segment);
            return Ok(());
        }

        let mut sequences = Vec::with_capacity(self.strains.len());
        for strain in &self.strains {
            let bases =
                strain_bases(strain, &self.segment, reference, options.fill_from_composite)?;
            sequences.push(if options.convert_to_amino_acids {
                translate(&bases)
            } else {
                bases
            });
        }

        let strains = std::mem::take(&mut self.strains);
        let before = strains.len();
        let mut kept: Vec<Strain> = Vec::with_capacity(strains.len());
        for (mut strain, sequence) in strains.into_iter().zip(sequences) {
            if options.convert_to_amino_acids {
                let duplicate_of = kept
                    .iter()
                    .position(|k| k.bases().is_some_and(|b| proteins_match(b, &sequence)));
                if let Some(index) = duplicate_of {
                    debug!(
                        "Strain {} translates like {}, folding",
                        strain.name(),
                        kept[index].name()
                    );
                    kept[index].absorb(strain);
                    continue;
                }
            }
            strain.clear_bases();
            strain.set_bases(sequence);
            kept.push(strain);
        }

        if options.convert_to_amino_acids {
            info!(
                "Materialized {} protein sequences over {} ({} folded)",
                kept.len(),
                self.segment,
                before - kept.len()
            );
        }
        self.strains = kept;
        self.materialized = Some(*options);
        Ok(())
    }
}

/// Bases of `strain` over `window`. Positions the strain does not cover are
/// `-`, or the reference base when `fill_from_composite` is set.
fn strain_bases(
    strain: &Strain,
    window: &Segment,
    reference: &[u8],
    fill_from_composite: bool,
) -> Result<String> {
    if window.start < 1 || window.end > reference.len() as i64 {
        return Err(StrainerError::InvalidInput(format!(
            "Reference of {} bases does not cover {}",
            reference.len(),
            window
        )));
    }

    let alignment = strain.alignment();
    let diffs = alignment.diffs_in(window.start, window.end);
    let mut next = 0;
    let mut bases = Vec::with_capacity(window.len() as usize);

    for pos in window.start..=window.end {
        let ref_base = reference[(pos - 1) as usize];
        let covered = pos >= strain.start() && pos <= strain.end() && !alignment.is_uncovered(pos);
        if !covered {
            while next < diffs.len() && diffs[next].ref_pos <= pos {
                next += 1;
            }
            bases.push(if fill_from_composite { ref_base } else { b'-' });
            continue;
        }

        let mut base = Some(ref_base);
        let mut inserted = Vec::new();
        while next < diffs.len() && diffs[next].ref_pos == pos {
            let diff = &diffs[next];
            if diff.is_insertion() {
                inserted.push(diff.query_base);
            } else if diff.is_deletion() {
                base = None;
            } else {
                base = Some(diff.query_base);
            }
            next += 1;
        }
        bases.extend(base);
        bases.extend(inserted);
    }

    String::from_utf8(bases).map_err(|e| {
        StrainerError::InvalidInput(format!("Non-text bases in {}: {e}", strain.name()))
    })
}
