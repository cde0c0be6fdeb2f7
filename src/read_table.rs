//! Tab-separated read table parsing
//!
//! One read per line:
//!
//! ```text
//! name  sequence  start  end  diffs  [group]
//! ```
//!
//! `diffs` is `.` or a comma-separated list of `POS:REF>QUERY` tokens (`-` for
//! a gap on either side, so `15:->T` is an insertion and `20:C>-` a deletion)
//! and `START..END` uncovered ranges. Blank lines and lines starting with `#`
//! are skipped.

use crate::alignment::{Alignment, Difference, Read, ReadId, Segment};
use crate::error::{self, StrainerError};
use crate::read_index::ReadIndex;
use crate::strain::Strain;
use crate::strategy::StrainerContext;
use log::debug;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Error as IoError};
use std::num::ParseIntError;
use std::path::Path;

const DIFF_PATTERN: &str = r"^(\d+):([A-Za-z*-])>([A-Za-z*-])$";
const UNCOVERED_PATTERN: &str = r"^(\d+)\.\.(\d+)$";

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields,
    IoError(IoError),
    InvalidField(ParseIntError),
    InvalidDiff(String),
    DuplicateRead(String),
    InvalidFormat(String),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::NotEnoughFields => write!(f, "Not enough fields in read record"),
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            ParseErr::InvalidDiff(token) => write!(f, "Invalid difference '{}'", token),
            ParseErr::DuplicateRead(name) => write!(f, "Read '{}' appears more than once", name),
            ParseErr::InvalidFormat(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseErr {}

impl From<ParseErr> for StrainerError {
    fn from(err: ParseErr) -> Self {
        match err {
            ParseErr::IoError(e) => StrainerError::Io(e),
            other => StrainerError::Parse(other.to_string()),
        }
    }
}

/// Reads of one table with their optional group labels
#[derive(Debug)]
pub struct ReadTable {
    pub reads: Vec<Read>,
    /// Group names in first-seen order with their member ids
    pub groups: Vec<(String, Vec<ReadId>)>,
    pub index: ReadIndex,
}

impl ReadTable {
    /// Sequences the reads are aligned to, in first-seen order
    pub fn sequences(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for read in &self.reads {
            if !seen.contains(&read.sequence_id()) {
                seen.push(read.sequence_id());
            }
        }
        seen
    }

    /// Smallest segment covering every read on `sequence_id`
    pub fn extent(&self, sequence_id: &str) -> Option<Segment> {
        let mut on_sequence = self.reads.iter().filter(|r| r.sequence_id() == sequence_id);
        let first = on_sequence.next()?;
        let (start, end) = on_sequence.fold((first.start(), first.end()), |(s, e), r| {
            (s.min(r.start()), e.max(r.end()))
        });
        Some(Segment {
            sequence_id: sequence_id.to_string(),
            start,
            end,
        })
    }

    /// Context holding every read, with one group strain per labelled group
    pub fn into_context(self) -> error::Result<StrainerContext> {
        let mut groups = Vec::with_capacity(self.groups.len());
        for (name, ids) in &self.groups {
            let members = ids.iter().map(|&id| self.reads[id as usize].clone());
            groups.push(Strain::from_reads(name.clone(), members)?);
        }
        Ok(StrainerContext::new(self.reads, groups))
    }
}

struct TokenPatterns {
    diff: Regex,
    uncovered: Regex,
}

impl TokenPatterns {
    fn new() -> Result<Self, ParseErr> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ParseErr::InvalidFormat(format!("Bad pattern: {}", e)))
        };
        Ok(TokenPatterns {
            diff: compile(DIFF_PATTERN)?,
            uncovered: compile(UNCOVERED_PATTERN)?,
        })
    }
}

fn parse_position(field: &str) -> Result<i64, ParseErr> {
    field.trim().parse::<i64>().map_err(ParseErr::InvalidField)
}

fn parse_diffs(
    field: &str,
    patterns: &TokenPatterns,
) -> Result<(Vec<Difference>, Vec<(i64, i64)>), ParseErr> {
    let mut diffs = Vec::new();
    let mut unknown = Vec::new();
    if field == "." || field.is_empty() {
        return Ok((diffs, unknown));
    }
    for token in field.split(',').map(str::trim) {
        if let Some(caps) = patterns.diff.captures(token) {
            let pos = parse_position(&caps[1])?;
            let ref_base = caps[2].as_bytes()[0];
            let query_base = caps[3].as_bytes()[0];
            if ref_base == Difference::GAP && query_base == Difference::GAP {
                return Err(ParseErr::InvalidDiff(token.to_string()));
            }
            diffs.push(Difference::new(pos, ref_base, 0, query_base));
        } else if let Some(caps) = patterns.uncovered.captures(token) {
            unknown.push((parse_position(&caps[1])?, parse_position(&caps[2])?));
        } else {
            return Err(ParseErr::InvalidDiff(token.to_string()));
        }
    }
    diffs.sort_by_key(|d| d.ref_pos);
    Ok((diffs, unknown))
}

struct Record {
    name: String,
    alignment: Alignment,
    group: Option<String>,
}

fn parse_read_line(line: &str, patterns: &TokenPatterns) -> Result<Record, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return Err(ParseErr::NotEnoughFields);
    }

    let name = fields[0].trim().to_string();
    let sequence = fields[1].trim();
    if name.is_empty() || sequence.is_empty() {
        return Err(ParseErr::InvalidFormat(
            "Read and sequence names must not be empty".to_string(),
        ));
    }
    let start = parse_position(fields[2])?;
    let end = parse_position(fields[3])?;
    if start < 1 {
        return Err(ParseErr::InvalidFormat(format!(
            "Read {} starts at {}, positions are 1-based",
            name, start
        )));
    }
    let reference = Segment::new(sequence, start, end)
        .map_err(|e| ParseErr::InvalidFormat(e.to_string()))?;
    let (diffs, unknown) = parse_diffs(fields[4].trim(), patterns)?;

    let query = Segment {
        sequence_id: name.clone(),
        start: 1,
        end: reference.len(),
    };
    let mut alignment = Alignment::new(reference, query, diffs, unknown)
        .map_err(|e| ParseErr::InvalidFormat(e.to_string()))?;
    alignment.renumber_query();

    let group = fields
        .get(5)
        .map(|g| g.trim())
        .filter(|g| !g.is_empty() && *g != ".")
        .map(str::to_string);

    Ok(Record {
        name,
        alignment,
        group,
    })
}

pub fn parse_read_table<R: BufRead>(reader: R) -> Result<ReadTable, ParseErr> {
    let patterns = TokenPatterns::new()?;
    let mut index = ReadIndex::new();
    let mut reads = Vec::new();
    let mut groups: Vec<(String, Vec<ReadId>)> = Vec::new();

    for (line_number, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(ParseErr::IoError)?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record = parse_read_line(trimmed, &patterns).map_err(|e| match e {
            ParseErr::IoError(e) => ParseErr::IoError(e),
            other => ParseErr::InvalidFormat(format!("Line {}: {}", line_number + 1, other)),
        })?;

        let (id, fresh) = index.get_or_insert_id(&record.name);
        if !fresh {
            return Err(ParseErr::InvalidFormat(format!(
                "Line {}: {}",
                line_number + 1,
                ParseErr::DuplicateRead(record.name)
            )));
        }
        if let Some(group) = record.group {
            match groups.iter_mut().find(|(name, _)| *name == group) {
                Some((_, members)) => members.push(id),
                None => groups.push((group, vec![id])),
            }
        }
        reads.push(Read::new(id, record.name, record.alignment));
    }

    debug!("Parsed {} reads in {} groups", reads.len(), groups.len());
    Ok(ReadTable {
        reads,
        groups,
        index,
    })
}

pub fn parse_read_table_file(path: &Path) -> std::io::Result<ReadTable> {
    let file = File::open(path)?;
    parse_read_table(BufReader::new(file)).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse read table {}: {}", path.display(), e),
        )
    })
}
