use crate::alignment::{Read, Segment};
use crate::compare::sequences_match;
use crate::error::{Result, StrainerError};
use crate::options::CrawlOptions;
use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::debug;
use std::cmp::{max, min};

/// Index of a node in the crawl arena
pub(crate) type NodeId = usize;

/// A read wrapped for one crawl
pub(crate) struct CrawlNode {
    pub read: usize,
    /// Read span clipped to the segment
    pub start: i64,
    pub end: i64,
    /// Full read span, used for overlap edges
    pub read_start: i64,
    pub read_end: i64,
    pub intersects_end_of_segment: bool,
    /// Nodes that extend this one to the right, longest first
    pub right_overlaps: Vec<NodeId>,
}

/// Directed overlap graph over the reads intersecting one segment.
pub(crate) struct ReadGraph<'r> {
    pub segment: Segment,
    pub reads: Vec<&'r Read>,
    pub nodes: Vec<CrawlNode>,
    pub edge_count: usize,
    max_diff: f64,
    restrict: bool,
    ignore_ambiguous: bool,
}

impl<'r> ReadGraph<'r> {
    pub fn build(segment: &Segment, reads: &'r [Read], options: &CrawlOptions) -> Result<Self> {
        let mut selected = Vec::new();
        let mut nodes = Vec::new();
        for read in reads {
            if read.sequence_id() != segment.sequence_id {
                return Err(StrainerError::InvalidInput(format!(
                    "Read {} is aligned to {}, not to {}",
                    read.name,
                    read.sequence_id(),
                    segment.sequence_id
                )));
            }
            let Some((start, end)) = segment.clip(read.start(), read.end()) else {
                continue;
            };
            nodes.push(CrawlNode {
                read: selected.len(),
                start,
                end,
                read_start: read.start(),
                read_end: read.end(),
                intersects_end_of_segment: end >= segment.end,
                right_overlaps: Vec::new(),
            });
            selected.push(read);
        }

        let mut graph = ReadGraph {
            segment: segment.clone(),
            reads: selected,
            nodes,
            edge_count: 0,
            max_diff: options.maximum_diff_fraction,
            restrict: options.restrict_matches_to_segment,
            ignore_ambiguous: options.ignore_ambiguous,
        };
        graph.link(options.minimum_overlap as i64)?;
        Ok(graph)
    }

    /// Record an edge B -> A for every A that starts at least
    /// `minimum_overlap` bases before the end of B, ends after B, and agrees
    /// with B over the overlap. Spans are the unclipped read spans, so reads
    /// running past the segment end still chain.
    fn link(&mut self, minimum_overlap: i64) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let to_i32 = |pos: i64| {
            i32::try_from(pos).map_err(|_| {
                StrainerError::InvalidInput(format!(
                    "Position {} does not fit the interval index",
                    pos
                ))
            })
        };

        let mut intervals = Vec::with_capacity(self.nodes.len());
        for (id, node) in self.nodes.iter().enumerate() {
            intervals.push(Interval::new(
                to_i32(node.read_start)?,
                to_i32(node.read_end)?,
                id,
            ));
        }
        let tree: BasicCOITree<NodeId, u32> = BasicCOITree::new(intervals.as_slice());

        for b in 0..self.nodes.len() {
            let b_end = self.nodes[b].read_end;
            let latest_start = b_end - (minimum_overlap - 1);

            let mut hits: Vec<NodeId> = Vec::new();
            let stab = to_i32(b_end)?;
            tree.query(stab, stab, |interval| hits.push(interval.metadata.clone()));

            let mut edges: Vec<NodeId> = hits
                .into_iter()
                .filter(|&a| {
                    a != b
                        && self.nodes[a].read_end > b_end
                        && self.nodes[a].read_start <= latest_start
                })
                .filter(|&a| self.agrees(a, b))
                .collect();
            edges.sort_by(|&x, &y| {
                self.nodes[y]
                    .read_end
                    .cmp(&self.nodes[x].read_end)
                    .then(x.cmp(&y))
            });
            self.edge_count += edges.len();
            self.nodes[b].right_overlaps = edges;
        }

        debug!(
            "Built overlap graph over {} with {} nodes and {} edges",
            self.segment,
            self.nodes.len(),
            self.edge_count
        );
        Ok(())
    }

    pub fn read(&self, node: NodeId) -> &'r Read {
        self.reads[self.nodes[node].read]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Window in which two nodes are compared, `None` if they do not overlap
    pub fn comparison_window(&self, a: NodeId, b: NodeId) -> Option<(i64, i64)> {
        if self.restrict {
            let (na, nb) = (&self.nodes[a], &self.nodes[b]);
            let start = max(na.start, nb.start);
            let end = min(na.end, nb.end);
            (start <= end).then_some((start, end))
        } else {
            let (ra, rb) = (self.read(a), self.read(b));
            let start = max(ra.start(), rb.start());
            let end = min(ra.end(), rb.end());
            (start <= end).then_some((start, end))
        }
    }

    /// Whether the reads behind two nodes agree over their overlap
    pub fn agrees(&self, a: NodeId, b: NodeId) -> bool {
        let Some((start, end)) = self.comparison_window(a, b) else {
            return false;
        };
        sequences_match(
            &self.read(a).alignment,
            &self.read(b).alignment,
            start,
            end,
            self.max_diff,
            self.ignore_ambiguous,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{Alignment, Difference};

    fn read(id: u32, start: i64, end: i64, diffs: &[(i64, u8)]) -> Read {
        let reference = Segment::new("ref", start, end).unwrap();
        let diffs = diffs
            .iter()
            .map(|&(p, q)| Difference::new(p, b'A', 0, q))
            .collect();
        Read::new(id, format!("r{}", id), Alignment::assemble(reference, "r", diffs, vec![]))
    }

    #[test]
    fn test_edges_follow_overlap_and_agreement() {
        let segment = Segment::new("ref", 1, 300).unwrap();
        let reads = vec![
            read(0, 1, 120, &[(50, b'C')]),
            read(1, 31, 200, &[(50, b'C')]),
            read(2, 111, 300, &[]),
            read(3, 61, 250, &[(100, b'G'), (110, b'G')]),
        ];
        let options = CrawlOptions::default().with_minimum_overlap(20);
        let graph = ReadGraph::build(&segment, &reads, &options).unwrap();

        // 0 -> 1 (overlap 90); 0 -> 2 is too short; 0 -> 3 disagrees at 100 and 110
        assert_eq!(graph.nodes[0].right_overlaps, vec![1]);
        // 1 -> 2 and 1 -> 3 both have long enough overlaps; 3 disagrees
        assert_eq!(graph.nodes[1].right_overlaps, vec![2]);
        assert!(graph.nodes[2].intersects_end_of_segment);
        assert!(graph.nodes[2].right_overlaps.is_empty());
    }

    #[test]
    fn test_overlap_one_short_of_minimum_gives_no_edge() {
        let segment = Segment::new("ref", 1, 200).unwrap();
        // Overlap is 101..=120, 20 bases
        let reads = vec![read(0, 1, 120, &[]), read(1, 101, 200, &[])];

        let options = CrawlOptions::default().with_minimum_overlap(21);
        let graph = ReadGraph::build(&segment, &reads, &options).unwrap();
        assert_eq!(graph.edge_count, 0);

        let options = CrawlOptions::default().with_minimum_overlap(20);
        let graph = ReadGraph::build(&segment, &reads, &options).unwrap();
        assert_eq!(graph.edge_count, 1);
    }

    #[test]
    fn test_reads_past_segment_end_still_overlap() {
        let segment = Segment::new("ref", 1, 150).unwrap();
        let reads = vec![read(0, 1, 200, &[]), read(1, 101, 300, &[]), read(2, 151, 350, &[])];
        let graph = ReadGraph::build(&segment, &reads, &CrawlOptions::default()).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!((graph.nodes[0].end, graph.nodes[1].end), (150, 150));
        assert_eq!(graph.nodes[1].read_end, 300);
        assert_eq!(graph.nodes[0].right_overlaps, vec![1]);
    }

    #[test]
    fn test_reads_on_other_sequence_are_rejected() {
        let segment = Segment::new("other", 1, 200).unwrap();
        let reads = vec![read(0, 1, 120, &[])];
        let result = ReadGraph::build(&segment, &reads, &CrawlOptions::default());
        assert!(matches!(result, Err(StrainerError::InvalidInput(_))));
    }

    #[test]
    fn test_reads_outside_segment_are_skipped() {
        let segment = Segment::new("ref", 150, 200).unwrap();
        let reads = vec![read(0, 1, 120, &[]), read(1, 101, 250, &[])];
        let graph = ReadGraph::build(&segment, &reads, &CrawlOptions::default()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.nodes[0].start, 150);
        assert_eq!(graph.nodes[0].end, 200);
    }
}
