//! One inner strainer run per pre-existing group

use crate::alignment::{Read, Segment};
use crate::error::{Result, StrainerError};
use crate::options::CrawlOptions;
use crate::progress::{CancelOnly, ProgressSink};
use crate::result::{NestedChild, StrainerResult};
use crate::strategy::{build_strainer, SegmentStrainer, StrainerContext, StrategyId};
use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Re-strains every group of the context on its own reads, so no read ever
/// moves between groups.
pub struct Substrainer {
    options: CrawlOptions,
    context: StrainerContext,
    inner: Box<dyn SegmentStrainer>,
}

impl Substrainer {
    pub fn new(options: CrawlOptions, context: StrainerContext) -> Result<Self> {
        if matches!(
            options.inner_strainer,
            StrategyId::Substrainer | StrategyId::Manual
        ) {
            return Err(StrainerError::Configuration(format!(
                "Substrainer cannot run {} per group",
                options.inner_strainer
            )));
        }
        // A linker run per group crawls each sub-segment with the gene crawler
        let inner_options = match options.inner_strainer {
            StrategyId::SegmentLinker => {
                options.clone().with_inner_strainer(StrategyId::GeneCrawler)
            }
            _ => options.clone(),
        };
        let inner = build_strainer(options.inner_strainer, &inner_options, &context)?;
        Ok(Substrainer {
            options,
            context,
            inner,
        })
    }
}

impl SegmentStrainer for Substrainer {
    fn strategy(&self) -> StrategyId {
        StrategyId::Substrainer
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
        let allowed: Option<FxHashSet<_>> = reads.map(|reads| reads.iter().map(|r| r.id).collect());
        progress.set_total(groups.len());

        let done = AtomicUsize::new(0);
        let quiet = CancelOnly(progress);
        let children: Vec<Option<NestedChild>> = groups
            .par_iter()
            .map(|group| {
                let finished = || progress.set_current(done.fetch_add(1, Ordering::Relaxed) + 1);

                let Some(scope) = group.alignment().reference.intersection(segment) else {
                    finished();
                    return Ok(None);
                };
                let members: Vec<Read> = group
                    .reads()
                    .filter(|r| r.intersects(&scope))
                    .filter(|r| allowed.as_ref().map_or(true, |a| a.contains(&r.id)))
                    .cloned()
                    .collect();
                if members.is_empty() {
                    warn!("Skipping group {}: no reads within {}", group.name(), scope);
                    finished();
                    return Ok(None);
                }

                debug!(
                    "Running {} on group {} over {} with {} reads",
                    self.inner.strategy(),
                    group.name(),
                    scope,
                    members.len()
                );
                let mut result = self.inner.strain(&scope, Some(members.as_slice()), &quiet)?;
                prefix_names(&mut result, group.name());
                finished();
                Ok(Some(NestedChild {
                    group: group.name().to_string(),
                    result,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        if progress.is_cancelled() {
            return Err(StrainerError::Cancelled);
        }

        let children: Vec<NestedChild> = children.into_iter().flatten().collect();
        let result = StrainerResult::nested(segment.clone(), children);
        info!(
            "Substrained {} groups over {}: {} strains",
            groups.len(),
            segment,
            result.size()
        );
        Ok(result)
    }
}

/// Qualify child strain names with their group, `group/strain_1`
fn prefix_names(result: &mut StrainerResult, group: &str) {
    result.rename_strains(&mut |name| format!("{}/{}", group, name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{Alignment, Difference};
    use crate::options::SegmentMethod;
    use crate::progress::NoProgress;
    use crate::strain::Strain;

    fn read(id: u32, start: i64, end: i64, diffs: &[(i64, u8)]) -> Read {
        let reference = Segment::new("ref", start, end).unwrap();
        let diffs = diffs
            .iter()
            .map(|&(p, q)| Difference::new(p, b'A', 0, q))
            .collect();
        let name = format!("r{}", id);
        Read::new(id, name.clone(), Alignment::assemble(reference, &name, diffs, vec![]))
    }

    fn context() -> StrainerContext {
        let reads = vec![
            read(0, 1, 120, &[(50, b'C')]),
            read(1, 81, 200, &[(150, b'C')]),
            read(2, 1, 120, &[(30, b'G'), (60, b'G')]),
            read(3, 81, 200, &[(170, b'G'), (190, b'G')]),
            read(4, 300, 400, &[]),
        ];
        let groups = vec![
            Strain::from_reads("alpha", vec![reads[0].clone(), reads[1].clone()]).unwrap(),
            Strain::from_reads("beta", vec![reads[2].clone(), reads[3].clone()]).unwrap(),
            Strain::from_reads("gamma", vec![reads[4].clone()]).unwrap(),
        ];
        StrainerContext::new(reads, groups)
    }

    fn options(inner: StrategyId) -> CrawlOptions {
        CrawlOptions::default()
            .with_minimum_overlap(20)
            .with_inner_strainer(inner)
    }

    #[test]
    fn test_children_follow_group_order_and_keep_reads_apart() {
        let substrainer = Substrainer::new(options(StrategyId::GeneCrawler), context()).unwrap();
        let segment = Segment::new("ref", 1, 200).unwrap();
        let result = substrainer.strain(&segment, None, &NoProgress).unwrap();

        let StrainerResult::Nested(nested) = &result else {
            panic!("expected a nested result");
        };
        let groups: Vec<&str> = nested.children().iter().map(|c| c.group.as_str()).collect();
        assert_eq!(groups, vec!["alpha", "beta"]);

        let alpha = nested.child("alpha").unwrap();
        assert_eq!(alpha.size(), 1);
        let ids: Vec<u32> = alpha.iter().flat_map(|s| s.read_ids()).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(alpha.strains()[0].name(), "alpha/strain_1");

        let beta = nested.child("beta").unwrap();
        let ids: Vec<u32> = beta.iter().flat_map(|s| s.read_ids()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(result.size(), 2);
    }

    #[test]
    fn test_supplied_reads_narrow_groups() {
        let substrainer =
            Substrainer::new(options(StrategyId::SimpleGeneCrawler), context()).unwrap();
        let segment = Segment::new("ref", 1, 400).unwrap();
        let context = context();
        let subset = vec![context.reads()[4].clone()];
        let result = substrainer.strain(&segment, Some(subset.as_slice()), &NoProgress).unwrap();
        let StrainerResult::Nested(nested) = &result else {
            panic!("expected a nested result");
        };
        assert_eq!(nested.children().len(), 1);
        assert_eq!(nested.children()[0].group, "gamma");
    }

    #[test]
    fn test_nested_inner_strategies_are_rejected() {
        for inner in [StrategyId::Substrainer, StrategyId::Manual] {
            let result = Substrainer::new(options(inner), context());
            assert!(matches!(result, Err(StrainerError::Configuration(_))));
        }
    }

    #[test]
    fn test_linker_as_inner_strategy() {
        let options = options(StrategyId::SegmentLinker)
            .with_segmentation(SegmentMethod::ByLength, 100);
        let substrainer = Substrainer::new(options, context()).unwrap();
        let segment = Segment::new("ref", 1, 200).unwrap();
        let result = substrainer.strain(&segment, None, &NoProgress).unwrap();
        let StrainerResult::Nested(nested) = &result else {
            panic!("expected a nested result");
        };
        assert_eq!(nested.children().len(), 2);
        for child in nested.children() {
            assert_eq!(child.result.size(), 1);
            let strain = child.result.strains()[0];
            assert_eq!((strain.start(), strain.end()), (1, 200));
            assert_eq!(strain.read_count(), 2);
        }
    }
}
