use super::{fold_unique, Crawl, CrawlStrain};
use crate::alignment::Segment;
use crate::compare::diff_ratio;
use log::{debug, warn};
use std::cmp::{max, min};

/// Which side of a strain a donor fills
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Left,
    Right,
}

impl<'g, 'r> Crawl<'g, 'r> {
    /// Complete strains that stop short of a segment boundary.
    ///
    /// The right side is filled first, from strains already reaching the end of
    /// the segment; the left side then from strains reaching its start. Every
    /// donor within `completion_tolerance` yields its own completed copy; when
    /// none is, the single closest donor is used. Strains that still fall short
    /// afterwards are kept as they are.
    pub(super) fn complete_gaps(&mut self) {
        let pending = std::mem::take(&mut self.incomplete);
        let right_done = self.fill_side(pending, Side::Right);
        let left_done = self.fill_side(right_done, Side::Left);

        let graph = self.graph;
        let segment = &graph.segment;
        let options = self.options;
        for strain in left_done {
            if strain.spans(segment) {
                if !fold_unique(&mut self.complete, strain, options) {
                    self.duplicates += 1;
                }
            } else {
                self.settle_incomplete(strain);
            }
        }
    }

    fn fill_side(&self, strains: Vec<CrawlStrain>, side: Side) -> Vec<CrawlStrain> {
        let segment = &self.graph.segment;
        let (mut needy, mut done): (Vec<CrawlStrain>, Vec<CrawlStrain>) =
            strains.into_iter().partition(|s| match side {
                Side::Right => s.end() < segment.end,
                Side::Left => s.start() > segment.start,
            });
        match side {
            // Closest to the boundary first, so later strains can borrow from them
            Side::Right => needy.sort_by(|a, b| b.end().cmp(&a.end())),
            Side::Left => needy.sort_by_key(|s| s.start()),
        }

        for strain in needy {
            let filled = {
                let donors: Vec<&CrawlStrain> = self
                    .complete
                    .iter()
                    .chain(done.iter())
                    .filter(|d| match side {
                        Side::Right => d.end() >= segment.end,
                        Side::Left => d.start() <= segment.start,
                    })
                    .collect();
                self.pick_donors(&strain, &donors, side)
                    .into_iter()
                    .map(|donor| match side {
                        Side::Right => fill_right(&strain, donor, segment),
                        Side::Left => fill_left(&strain, donor, segment),
                    })
                    .collect::<Vec<_>>()
            };

            if filled.is_empty() {
                debug!(
                    "No donor overlaps strain {}-{} on the {:?} side",
                    strain.start(),
                    strain.end(),
                    side
                );
                done.push(strain);
            } else {
                done.extend(filled);
            }
        }
        done
    }

    /// Donors within tolerance in donor order, or the single closest one
    fn pick_donors<'d>(
        &self,
        strain: &CrawlStrain,
        donors: &[&'d CrawlStrain],
        side: Side,
    ) -> Vec<&'d CrawlStrain> {
        let options = self.options;
        let scored: Vec<(&'d CrawlStrain, f64)> = donors
            .iter()
            .filter_map(|&donor| {
                let (start, end) = match side {
                    Side::Right => (max(strain.start(), donor.start()), strain.end()),
                    Side::Left => (strain.start(), min(strain.end(), donor.end())),
                };
                diff_ratio(
                    &strain.alignment,
                    &donor.alignment,
                    start,
                    end,
                    options.ignore_ambiguous,
                )
                .map(|ratio| (donor, ratio))
            })
            .collect();

        let within: Vec<&'d CrawlStrain> = scored
            .iter()
            .filter(|(_, ratio)| *ratio <= options.completion_tolerance)
            .map(|(donor, _)| *donor)
            .collect();
        if !within.is_empty() {
            return within;
        }

        let mut best: Option<(&'d CrawlStrain, f64)> = None;
        for &(donor, ratio) in &scored {
            if best.map_or(true, |(_, r)| ratio < r) {
                best = Some((donor, ratio));
            }
        }
        if let Some((donor, ratio)) = best {
            warn!(
                "Completing strain {}-{} from a donor at {:.4} divergence, above tolerance {}",
                strain.start(),
                strain.end(),
                ratio,
                options.completion_tolerance
            );
            vec![donor]
        } else {
            Vec::new()
        }
    }
}

fn fill_right(strain: &CrawlStrain, donor: &CrawlStrain, segment: &Segment) -> CrawlStrain {
    let mut diffs = strain.alignment.diffs().to_vec();
    diffs.extend_from_slice(donor.alignment.diffs_in(strain.end() + 1, donor.end()));
    let mut filled = strain.filled.clone();
    filled.push((strain.end() + 1, donor.end()));
    CrawlStrain::new(
        segment,
        strain.members.clone(),
        strain.start(),
        donor.end(),
        diffs,
        filled,
    )
}

fn fill_left(strain: &CrawlStrain, donor: &CrawlStrain, segment: &Segment) -> CrawlStrain {
    let mut diffs = donor.alignment.diffs_in(donor.start(), strain.start() - 1).to_vec();
    diffs.extend_from_slice(strain.alignment.diffs());
    let mut filled = vec![(donor.start(), strain.start() - 1)];
    filled.extend_from_slice(&strain.filled);
    CrawlStrain::new(
        segment,
        strain.members.clone(),
        donor.start(),
        strain.end(),
        diffs,
        filled,
    )
}

#[cfg(test)]
mod tests {
    use super::super::crawl_segment;
    use super::*;
    use crate::alignment::{Alignment, Difference, Read};
    use crate::options::CrawlOptions;
    use crate::progress::NoProgress;

    fn read(id: u32, start: i64, end: i64, diffs: &[(i64, u8)]) -> Read {
        let reference = Segment::new("ref", start, end).unwrap();
        let diffs = diffs
            .iter()
            .map(|&(p, q)| Difference::new(p, b'A', 0, q))
            .collect();
        let name = format!("r{}", id);
        Read::new(id, name.clone(), Alignment::assemble(reference, &name, diffs, vec![]))
    }

    fn options() -> CrawlOptions {
        CrawlOptions::default()
            .with_minimum_overlap(20)
            .with_maximum_diff_fraction(0.0)
    }

    #[test]
    fn test_left_side_is_filled_from_spanning_strain() {
        let reads = vec![
            read(0, 1, 120, &[(10, b'G'), (100, b'C')]),
            read(1, 81, 200, &[(100, b'C'), (150, b'T')]),
            // Starts late and disagrees with read 0 at 90
            read(2, 71, 200, &[(90, b'T'), (100, b'C'), (150, b'T')]),
        ];
        let segment = Segment::new("ref", 1, 200).unwrap();
        let strains = crawl_segment(&segment, &reads, &options(), true, &NoProgress).unwrap();
        assert_eq!(strains.len(), 2);
        let completed = &strains[1];
        assert!(completed.contains_read(2));
        assert_eq!(completed.start(), 1);
        assert_eq!(completed.filled(), &[(1, 70)]);
        let positions: Vec<i64> = completed.alignment().diffs().iter().map(|d| d.ref_pos).collect();
        assert_eq!(positions, vec![10, 90, 100, 150]);
    }

    #[test]
    fn test_every_donor_within_tolerance_yields_a_copy() {
        let reads = vec![
            read(0, 1, 120, &[]),
            read(1, 81, 200, &[(180, b'C')]),
            read(2, 1, 120, &[(5, b'T')]),
            read(3, 81, 200, &[(190, b'G')]),
            // Close to the chains through read 0, further from those through read 2
            read(4, 1, 130, &[(60, b'A'), (125, b'A')]),
        ];
        let options = options().with_completion_tolerance(0.02);
        let segment = Segment::new("ref", 1, 200).unwrap();
        let strains = crawl_segment(&segment, &reads, &options, true, &NoProgress).unwrap();
        let copies: Vec<_> = strains.iter().filter(|s| s.contains_read(4)).collect();
        assert_eq!(copies.len(), 2);
        for copy in copies {
            assert_eq!(copy.end(), 200);
            assert_eq!(copy.filled(), &[(131, 200)]);
        }
    }

    #[test]
    fn test_closest_donor_used_when_none_within_tolerance() {
        let reads = vec![
            read(0, 1, 120, &[]),
            read(1, 81, 200, &[(180, b'C')]),
            read(2, 1, 120, &[(30, b'T'), (40, b'T'), (50, b'T')]),
            read(3, 81, 200, &[(190, b'G')]),
            read(4, 1, 130, &[(60, b'A'), (70, b'A'), (125, b'A')]),
        ];
        let options = options().with_completion_tolerance(0.0);
        let segment = Segment::new("ref", 1, 200).unwrap();
        let strains = crawl_segment(&segment, &reads, &options, true, &NoProgress).unwrap();
        let copies: Vec<_> = strains.iter().filter(|s| s.contains_read(4)).collect();
        assert_eq!(copies.len(), 1);
        let positions: Vec<i64> = copies[0].alignment().diffs().iter().map(|d| d.ref_pos).collect();
        assert_eq!(positions, vec![60, 70, 125, 180]);
    }
}
