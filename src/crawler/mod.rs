//! Chain-enumerating crawlers
//!
//! A crawl builds the overlap graph of the reads intersecting a segment and
//! walks it depth first from every unused read, emitting one candidate strain
//! per maximal chain. Candidates that match an accepted strain within
//! tolerance are folded into it. [`GeneCrawler`] then completes strains that
//! stop short of a segment boundary using the closest spanning strain;
//! [`SimpleGeneCrawler`] keeps them as they are.

mod chain;
mod completion;
mod graph;

use crate::alignment::{Alignment, Difference, Read, Segment};
use crate::compare::sequences_match;
use crate::error::{Result, StrainerError};
use crate::options::CrawlOptions;
use crate::progress::ProgressSink;
use crate::result::StrainerResult;
use crate::strain::Strain;
use crate::strategy::{SegmentStrainer, StrainerContext, StrategyId};
use bitvec::prelude::*;
use chain::Chain;
use graph::{NodeId, ReadGraph};
use log::{debug, info};
use std::collections::BTreeSet;

/// Crawler without gap completion
pub struct SimpleGeneCrawler {
    options: CrawlOptions,
    context: StrainerContext,
}

impl SimpleGeneCrawler {
    pub fn new(options: CrawlOptions, context: StrainerContext) -> Self {
        SimpleGeneCrawler { options, context }
    }
}

impl SegmentStrainer for SimpleGeneCrawler {
    fn strategy(&self) -> StrategyId {
        StrategyId::SimpleGeneCrawler
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
        let strains = crawl_segment(segment, reads, &self.options, false, progress)?;
        Ok(StrainerResult::flat(segment.clone(), strains))
    }
}

/// Crawler that completes partial strains from the best matching donor
pub struct GeneCrawler {
    options: CrawlOptions,
    context: StrainerContext,
}

impl GeneCrawler {
    pub fn new(options: CrawlOptions, context: StrainerContext) -> Self {
        GeneCrawler { options, context }
    }
}

impl SegmentStrainer for GeneCrawler {
    fn strategy(&self) -> StrategyId {
        StrategyId::GeneCrawler
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
        let strains = crawl_segment(segment, reads, &self.options, true, progress)?;
        Ok(StrainerResult::flat(segment.clone(), strains))
    }
}

/// Run one crawl over `segment` and return the accepted strains in discovery
/// order.
pub(crate) fn crawl_segment(
    segment: &Segment,
    reads: &[Read],
    options: &CrawlOptions,
    complete_gaps: bool,
    progress: &dyn ProgressSink,
) -> Result<Vec<Strain>> {
    options.validate()?;
    let graph = ReadGraph::build(segment, reads, options)?;
    let mut crawl = Crawl::new(&graph, options);
    crawl.run(progress)?;

    let chains = crawl.complete.len() + crawl.incomplete.len();
    if complete_gaps {
        crawl.complete_gaps();
    } else {
        crawl.settle_all_incomplete();
    }

    info!(
        "Crawled {}: {} reads, {} overlaps, {} chains, {} strains \
         ({} complete, {} duplicates folded)",
        segment,
        graph.len(),
        graph.edge_count,
        chains,
        crawl.complete.len() + crawl.incomplete.len(),
        crawl.complete.len(),
        crawl.duplicates
    );

    Ok(crawl.into_strains())
}

/// A finished chain, before it is turned into a [`Strain`]
#[derive(Clone)]
pub(crate) struct CrawlStrain {
    members: BTreeSet<NodeId>,
    alignment: Alignment,
    filled: Vec<(i64, i64)>,
}

impl CrawlStrain {
    fn new(
        segment: &Segment,
        members: BTreeSet<NodeId>,
        start: i64,
        end: i64,
        diffs: Vec<Difference>,
        filled: Vec<(i64, i64)>,
    ) -> Self {
        let reference = Segment {
            sequence_id: segment.sequence_id.clone(),
            start,
            end,
        };
        CrawlStrain {
            members,
            alignment: Alignment::assemble(reference, "chain", diffs, Vec::new()),
            filled,
        }
    }

    fn start(&self) -> i64 {
        self.alignment.start()
    }

    fn end(&self) -> i64 {
        self.alignment.end()
    }

    fn spans(&self, segment: &Segment) -> bool {
        self.start() <= segment.start && self.end() >= segment.end
    }
}

/// Traversal state for one crawl. Nothing here outlives the call that built it.
struct Crawl<'g, 'r> {
    graph: &'g ReadGraph<'r>,
    options: &'g CrawlOptions,
    /// Nodes that already belong to some chain; never reset
    used: BitVec,
    /// Nodes not to be taken again at the current recursion level
    blocked: BitVec,
    /// Blocked nodes in blocking order, rolled back on return from a level
    block_stack: Vec<NodeId>,
    complete: Vec<CrawlStrain>,
    incomplete: Vec<CrawlStrain>,
    duplicates: usize,
}

impl<'g, 'r> Crawl<'g, 'r> {
    fn new(graph: &'g ReadGraph<'r>, options: &'g CrawlOptions) -> Self {
        let n = graph.len();
        Crawl {
            graph,
            options,
            used: bitvec![0; n],
            blocked: bitvec![0; n],
            block_stack: Vec::new(),
            complete: Vec::new(),
            incomplete: Vec::new(),
            duplicates: 0,
        }
    }

    fn run(&mut self, progress: &dyn ProgressSink) -> Result<()> {
        let graph = self.graph;
        let mut seeds: Vec<NodeId> = (0..graph.len()).collect();
        seeds.sort_by_key(|&id| (graph.nodes[id].end, graph.nodes[id].start, id));

        progress.set_total(seeds.len());
        for (i, &seed) in seeds.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(StrainerError::Cancelled);
            }
            progress.set_current(i + 1);
            if self.used[seed] {
                continue;
            }

            let node = &graph.nodes[seed];
            let diffs = graph.read(seed).alignment.diffs_in(node.start, node.end).to_vec();
            let chain = Chain::seed(seed, node.start, node.end, diffs);
            self.extend_right(&chain, seed, None);

            if !self.block_stack.is_empty() {
                return Err(StrainerError::Algorithm(format!(
                    "{} nodes left blocked after seed {}",
                    self.block_stack.len(),
                    graph.read(seed).name
                )));
            }
        }
        Ok(())
    }

    fn extend_right(&mut self, chain: &Chain, node: NodeId, prev: Option<NodeId>) {
        let graph = self.graph;
        self.used.set(node, true);
        let checkpoint = self.block_stack.len();
        let mut extended = false;

        for &candidate in &graph.nodes[node].right_overlaps {
            if self.blocked[candidate] {
                // Already explored from `prev`; this node sits between the two
                if let Some(prev) = prev {
                    extended |= self.splice(node, candidate, prev);
                }
                continue;
            }

            if let Some(prev) = prev {
                if graph.nodes[candidate].read_start <= graph.nodes[prev].read_end
                    && !graph.agrees(prev, candidate)
                {
                    self.block(candidate);
                    continue;
                }
            }

            let next_node = &graph.nodes[candidate];
            let diffs = if graph.nodes[node].intersects_end_of_segment {
                Vec::new()
            } else {
                graph
                    .read(candidate)
                    .alignment
                    .diffs_in(chain.end() + 1, next_node.end)
                    .to_vec()
            };
            let next = chain.extend(candidate, next_node.end, diffs);
            self.block(candidate);
            extended = true;

            // Past the segment end the chain stops growing but still takes in
            // reads that run on beyond it
            self.extend_right(&next, candidate, Some(node));
        }

        if !extended {
            self.finish(chain);
        }
        self.rollback(checkpoint);
    }

    fn block(&mut self, node: NodeId) {
        self.blocked.set(node, true);
        self.block_stack.push(node);
    }

    fn rollback(&mut self, checkpoint: usize) {
        while self.block_stack.len() > checkpoint {
            if let Some(node) = self.block_stack.pop() {
                self.blocked.set(node, false);
            }
        }
    }

    /// Add `node` to every finished strain holding both `candidate` and `prev`
    fn splice(&mut self, node: NodeId, candidate: NodeId, prev: NodeId) -> bool {
        let mut found = false;
        for strain in self.complete.iter_mut().chain(self.incomplete.iter_mut()) {
            if strain.members.contains(&candidate) && strain.members.contains(&prev) {
                strain.members.insert(node);
                found = true;
            }
        }
        found
    }

    fn finish(&mut self, chain: &Chain) {
        let strain = CrawlStrain::new(
            &self.graph.segment,
            chain.nodes().into_iter().collect(),
            chain.start(),
            chain.end(),
            chain.diffs(),
            Vec::new(),
        );
        if strain.spans(&self.graph.segment) {
            let options = self.options;
            if !fold_unique(&mut self.complete, strain, options) {
                self.duplicates += 1;
            }
        } else {
            self.incomplete.push(strain);
        }
    }

    /// Fold a strain that does not span the segment into the accepted strains,
    /// keeping it on its own when nothing matches.
    fn settle_incomplete(&mut self, strain: CrawlStrain) {
        let options = self.options;
        if matching_strain(&self.complete, &strain, options).is_some() {
            fold_unique(&mut self.complete, strain, options);
            self.duplicates += 1;
        } else if !fold_unique(&mut self.incomplete, strain, options) {
            self.duplicates += 1;
        }
    }

    fn settle_all_incomplete(&mut self) {
        let pending = std::mem::take(&mut self.incomplete);
        for strain in pending {
            self.settle_incomplete(strain);
        }
    }

    fn into_strains(self) -> Vec<Strain> {
        let graph = self.graph;
        self.complete
            .into_iter()
            .chain(self.incomplete)
            .enumerate()
            .map(|(i, crawled)| {
                let mut strain = Strain::new(format!("strain_{}", i + 1), crawled.alignment);
                for &node in &crawled.members {
                    strain.add_read(graph.read(node).clone());
                }
                strain.set_filled(crawled.filled);
                strain
            })
            .collect()
    }
}

/// First strain in `pool` that covers `strain` and agrees with it
fn matching_strain(
    pool: &[CrawlStrain],
    strain: &CrawlStrain,
    options: &CrawlOptions,
) -> Option<usize> {
    pool.iter().position(|existing| {
        existing.start() <= strain.start()
            && existing.end() >= strain.end()
            && sequences_match(
                &existing.alignment,
                &strain.alignment,
                strain.start(),
                strain.end(),
                options.maximum_diff_fraction,
                options.ignore_ambiguous,
            )
    })
}

/// Add `strain` to `pool` unless it matches an existing member within
/// tolerance, in which case its reads are merged (with `keep_all_reads`) or
/// dropped. Returns whether the strain was accepted.
fn fold_unique(pool: &mut Vec<CrawlStrain>, strain: CrawlStrain, options: &CrawlOptions) -> bool {
    match matching_strain(pool, &strain, options) {
        Some(index) => {
            debug!(
                "Folding duplicate chain {}-{} into strain {}",
                strain.start(),
                strain.end(),
                index + 1
            );
            if options.keep_all_reads {
                pool[index].members.extend(strain.members);
            }
            false
        }
        None => {
            pool.push(strain);
            true
        }
    }
}
