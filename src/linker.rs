//! Divide and conquer over long segments
//!
//! The segment is cut into sub-segments, each crawled on its own with the full
//! read set in view, and strains of neighbouring sub-segments are joined where
//! exactly the same member reads cross the junction.

use crate::alignment::{Alignment, Read, ReadId, Segment};
use crate::crawler::crawl_segment;
use crate::error::{Result, StrainerError};
use crate::options::{CrawlOptions, SegmentMethod};
use crate::progress::{CancelOnly, ProgressSink};
use crate::result::StrainerResult;
use crate::strain::Strain;
use crate::strategy::{SegmentStrainer, StrainerContext, StrategyId};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SegmentLinker {
    options: CrawlOptions,
    context: StrainerContext,
}

impl SegmentLinker {
    /// Fails when the inner strategy is not one of the crawlers.
    pub fn new(options: CrawlOptions, context: StrainerContext) -> Result<Self> {
        if !options.inner_strainer.is_crawler() {
            return Err(StrainerError::Configuration(format!(
                "Segment linker cannot run {} per sub-segment",
                options.inner_strainer
            )));
        }
        Ok(SegmentLinker { options, context })
    }
}

impl SegmentStrainer for SegmentLinker {
    fn strategy(&self) -> StrategyId {
        StrategyId::SegmentLinker
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
        let reads = self.context.resolve(reads);
        let strains = link_segment(segment, reads, &self.options, progress)?;
        Ok(StrainerResult::flat(segment.clone(), strains))
    }
}

fn link_segment(
    segment: &Segment,
    reads: &[Read],
    options: &CrawlOptions,
    progress: &dyn ProgressSink,
) -> Result<Vec<Strain>> {
    options.validate()?;
    let inner = options
        .clone()
        .with_keep_all_reads(true)
        .with_restrict_matches_to_segment(false);
    let complete_gaps = options.inner_strainer == StrategyId::GeneCrawler;

    let pieces = split_segment(segment, reads, options.segment_method, options.segment_size);
    debug!("Split {} into {} sub-segments", segment, pieces.len());
    progress.set_total(pieces.len());

    let done = AtomicUsize::new(0);
    let quiet = CancelOnly(progress);
    let results: Vec<Vec<Strain>> = pieces
        .par_iter()
        .map(|piece| {
            let strains = crawl_segment(piece, reads, &inner, complete_gaps, &quiet)?;
            progress.set_current(done.fetch_add(1, Ordering::Relaxed) + 1);
            Ok(strains)
        })
        .collect::<Result<Vec<_>>>()?;

    if progress.is_cancelled() {
        return Err(StrainerError::Cancelled);
    }

    let (strains, links) = link_results(&pieces, results);
    info!(
        "Linked {} sub-segments of {}: {} strains ({} junctions joined)",
        pieces.len(),
        segment,
        strains.len(),
        links
    );
    Ok(strains)
}

/// Cut `segment` into consecutive sub-segments covering it exactly.
///
/// `ByLength` cuts every `size` bases. `ByReadCount` starts a new piece at the
/// start of every `size`-th read intersecting the segment, ordered by start.
pub fn split_segment(
    segment: &Segment,
    reads: &[Read],
    method: SegmentMethod,
    size: u32,
) -> Vec<Segment> {
    let size = size.max(1) as i64;
    let cuts: Vec<i64> = match method {
        SegmentMethod::ByLength => (segment.start + size..=segment.end)
            .step_by(size as usize)
            .collect(),
        SegmentMethod::ByReadCount => {
            let mut starts: Vec<(i64, ReadId)> = reads
                .iter()
                .filter(|r| r.intersects(segment))
                .map(|r| (r.start(), r.id))
                .collect();
            starts.sort_unstable();
            let mut cuts: Vec<i64> = starts
                .iter()
                .skip(size as usize)
                .step_by(size as usize)
                .map(|&(start, _)| start)
                .filter(|&start| start > segment.start)
                .collect();
            cuts.dedup();
            cuts
        }
    };

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = segment.start;
    for cut in cuts {
        pieces.push(Segment {
            sequence_id: segment.sequence_id.clone(),
            start,
            end: cut - 1,
        });
        start = cut;
    }
    pieces.push(Segment {
        sequence_id: segment.sequence_id.clone(),
        start,
        end: segment.end,
    });
    pieces
}

/// Member reads spanning both sides of the junction after `boundary`
fn crossing_reads(strain: &Strain, boundary: i64) -> BTreeSet<ReadId> {
    strain
        .reads()
        .filter(|r| r.start() <= boundary && r.end() > boundary)
        .map(|r| r.id)
        .collect()
}

/// Join strains across every junction, left to right. Strains that find no
/// partner survive on their own. Returns the strains and the number of joins.
fn link_results(pieces: &[Segment], results: Vec<Vec<Strain>>) -> (Vec<Strain>, usize) {
    let mut finished: Vec<Strain> = Vec::new();
    let mut open: Vec<Strain> = Vec::new();
    let mut links = 0;

    for (i, strains) in results.into_iter().enumerate() {
        if i == 0 {
            open = strains;
            continue;
        }
        let boundary = pieces[i - 1].end;

        let mut left: Vec<Option<Strain>> =
            std::mem::take(&mut open).into_iter().map(Some).collect();
        let left_keys: Vec<BTreeSet<ReadId>> = left
            .iter()
            .flatten()
            .map(|s| crossing_reads(s, boundary))
            .collect();

        for right in strains {
            let key = crossing_reads(&right, boundary);
            let partner = if key.is_empty() {
                None
            } else {
                (0..left.len()).find(|&j| left[j].is_some() && left_keys[j] == key)
            };

            match partner.and_then(|j| left[j].take()) {
                Some(mut joined) => {
                    debug!(
                        "Joining {} and {} across {} on {} shared reads",
                        joined.name(),
                        right.name(),
                        boundary,
                        key.len()
                    );
                    let alignment =
                        Alignment::splice(joined.alignment(), right.alignment(), joined.name());
                    let mut filled = joined.filled().to_vec();
                    filled.extend(right.filled().iter().filter(|(_, e)| *e > boundary).copied());
                    joined.set_alignment(alignment);
                    joined.set_filled(filled);
                    joined.absorb(right);
                    open.push(joined);
                    links += 1;
                }
                None => open.push(right),
            }
        }
        finished.extend(left.into_iter().flatten());
    }
    finished.extend(open);

    for (i, strain) in finished.iter_mut().enumerate() {
        strain.set_name(format!("strain_{}", i + 1));
    }
    (finished, links)
}
