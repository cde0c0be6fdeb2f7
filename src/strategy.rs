//! Closed set of straining strategies and the trait they share
//!
//! Strategies are picked by [`StrategyId`] and built with [`build_strainer`].
//! Adding one means adding a variant here.

use crate::alignment::{Read, Segment};
use crate::crawler::{GeneCrawler, SimpleGeneCrawler};
use crate::error::{Result, StrainerError};
use crate::linker::SegmentLinker;
use crate::options::CrawlOptions;
use crate::progress::ProgressSink;
use crate::result::StrainerResult;
use crate::strain::Strain;
use crate::substrainer::Substrainer;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    /// Returns the pre-existing groups unchanged
    Manual,
    /// Chain enumeration without gap completion
    SimpleGeneCrawler,
    /// Chain enumeration with gap completion
    GeneCrawler,
    /// Divide and conquer over sub-segments
    SegmentLinker,
    /// One inner run per pre-existing group
    Substrainer,
}

impl StrategyId {
    pub const ALL: [StrategyId; 5] = [
        StrategyId::Manual,
        StrategyId::SimpleGeneCrawler,
        StrategyId::GeneCrawler,
        StrategyId::SegmentLinker,
        StrategyId::Substrainer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyId::Manual => "manual",
            StrategyId::SimpleGeneCrawler => "simple-gene-crawler",
            StrategyId::GeneCrawler => "gene-crawler",
            StrategyId::SegmentLinker => "segment-linker",
            StrategyId::Substrainer => "substrainer",
        }
    }

    /// Crawler variants that work on a plain read set
    pub fn is_crawler(&self) -> bool {
        matches!(self, StrategyId::SimpleGeneCrawler | StrategyId::GeneCrawler)
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyId {
    type Err = StrainerError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        StrategyId::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| {
                StrainerError::Configuration(format!(
                    "Unknown strategy '{}' (expected one of: {})",
                    s,
                    StrategyId::ALL.map(|id| id.name()).join(", ")
                ))
            })
    }
}

/// Reads and groups a strainer falls back on when the caller does not supply
/// a read set.
#[derive(Clone, Default)]
pub struct StrainerContext {
    reads: Arc<Vec<Read>>,
    groups: Arc<Vec<Strain>>,
}

impl StrainerContext {
    pub fn new(reads: Vec<Read>, groups: Vec<Strain>) -> Self {
        StrainerContext {
            reads: Arc::new(reads),
            groups: Arc::new(groups),
        }
    }

    pub fn from_reads(reads: Vec<Read>) -> Self {
        Self::new(reads, Vec::new())
    }

    pub fn reads(&self) -> &[Read] {
        &self.reads
    }

    pub fn groups(&self) -> &[Strain] {
        &self.groups
    }

    /// The supplied reads, or the anchored read set when none are given
    pub fn resolve<'a>(&'a self, reads: Option<&'a [Read]>) -> &'a [Read] {
        reads.unwrap_or(&self.reads)
    }
}

/// A strategy that partitions the reads over a segment into strains.
pub trait SegmentStrainer: Send + Sync {
    fn strategy(&self) -> StrategyId;

    fn options(&self) -> &CrawlOptions;

    /// Strain `segment`. `reads` of `None` means the anchored read set.
    fn strain(
        &self,
        segment: &Segment,
        reads: Option<&[Read]>,
        progress: &dyn ProgressSink,
    ) -> Result<StrainerResult>;
}

/// Build the strainer for `id`, validating the options and any inner strategy.
pub fn build_strainer(
    id: StrategyId,
    options: &CrawlOptions,
    context: &StrainerContext,
) -> Result<Box<dyn SegmentStrainer>> {
    options.validate()?;
    debug!("Building {} strainer", id);
    let strainer: Box<dyn SegmentStrainer> = match id {
        StrategyId::Manual => Box::new(ManualStrainer::new(options.clone(), context.clone())),
        StrategyId::SimpleGeneCrawler => {
            Box::new(SimpleGeneCrawler::new(options.clone(), context.clone()))
        }
        StrategyId::GeneCrawler => Box::new(GeneCrawler::new(options.clone(), context.clone())),
        StrategyId::SegmentLinker => {
            Box::new(SegmentLinker::new(options.clone(), context.clone())?)
        }
        StrategyId::Substrainer => Box::new(Substrainer::new(options.clone(), context.clone())?),
    };
    Ok(strainer)
}

/// Hands back the pre-existing groups that overlap the segment, restricted to
/// it. Used to compare automatic results against curated ones.
pub struct ManualStrainer {
    options: CrawlOptions,
    context: StrainerContext,
}

impl ManualStrainer {
    pub fn new(options: CrawlOptions, context: StrainerContext) -> Self {
        ManualStrainer { options, context }
    }
}

impl SegmentStrainer for ManualStrainer {
    fn strategy(&self) -> StrategyId {
        StrategyId::Manual
    }

    fn options(&self) -> &CrawlOptions {
        &self.options
    }

    fn strain(
        &self,
        segment: &Segment,
        reads: Option<&[Read]>,
        progress: &dyn ProgressSink,
    ) -> Result<StrainerResult> {
        let groups = self.context.groups();
        progress.set_total(groups.len());

        let allowed: Option<rustc_hash::FxHashSet<_>> =
            reads.map(|reads| reads.iter().map(|r| r.id).collect());

        let mut strains = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(StrainerError::Cancelled);
            }
            progress.set_current(i + 1);

            let Some(mut strain) = group.restricted_to(segment) else {
                continue;
            };
            if let Some(allowed) = &allowed {
                let kept: Vec<Read> = strain
                    .reads()
                    .filter(|r| allowed.contains(&r.id))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    continue;
                }
                if kept.len() != strain.read_count() {
                    strain = Strain::from_reads(group.name(), kept)?;
                }
            }
            strains.push(strain);
        }

        Ok(StrainerResult::flat(segment.clone(), strains))
    }
}
