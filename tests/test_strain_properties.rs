//! End-to-end properties of the strainers over a two-haplotype read table
//! Reads are 150 bases long and tiled every 50 bases over chr1:1-400

use std::collections::BTreeSet;
use std::io::Cursor;
use strainer::compare::diff_ratio;
use strainer::read_table::{parse_read_table, ReadTable};
use strainer::{
    build_strainer, AtomicProgress, CrawlOptions, MaterializeOptions, NoProgress, ReadId,
    Segment, SegmentMethod, StrainerContext, StrainerError, StrainerResult, StrategyId,
};
use tempfile::TempDir;

const HAP_A: [i64; 4] = [50, 150, 250, 350];
const HAP_B: [i64; 3] = [100, 200, 300];

fn table_text() -> String {
    let mut text = String::from("# name\tseq\tstart\tend\tdiffs\tgroup\n");
    for (prefix, positions, base, group) in [
        ("a", &HAP_A[..], 'C', "hapA"),
        ("b", &HAP_B[..], 'T', "hapB"),
    ] {
        for (i, start) in (1..=251).step_by(50).enumerate() {
            let end = start + 149;
            let diffs: Vec<String> = positions
                .iter()
                .filter(|&&p| p >= start && p <= end)
                .map(|p| format!("{}:A>{}", p, base))
                .collect();
            let diffs = if diffs.is_empty() {
                ".".to_string()
            } else {
                diffs.join(",")
            };
            text.push_str(&format!(
                "{}{}\tchr1\t{}\t{}\t{}\t{}\n",
                prefix,
                i + 1,
                start,
                end,
                diffs,
                group
            ));
        }
    }
    text
}

fn load_table() -> ReadTable {
    parse_read_table(Cursor::new(table_text())).unwrap()
}

fn context() -> StrainerContext {
    load_table().into_context().unwrap()
}

/// Zero completion tolerance keeps partial strains from borrowing the other
/// haplotype when sub-segments are crawled on their own
fn options() -> CrawlOptions {
    CrawlOptions::default()
        .with_minimum_overlap(20)
        .with_completion_tolerance(0.0)
}

fn segment() -> Segment {
    Segment::new("chr1", 1, 400).unwrap()
}

fn run(id: StrategyId, options: &CrawlOptions) -> StrainerResult {
    let strainer = build_strainer(id, options, &context()).unwrap();
    strainer.strain(&segment(), None, &NoProgress).unwrap()
}

fn member_sets(result: &StrainerResult) -> Vec<BTreeSet<ReadId>> {
    let mut sets: Vec<BTreeSet<ReadId>> = result.iter().map(|s| s.read_ids().collect()).collect();
    sets.sort();
    sets
}

fn expected_sets() -> Vec<BTreeSet<ReadId>> {
    vec![(0..6).collect(), (6..12).collect()]
}

#[test]
fn test_table_parses_both_haplotypes() {
    let table = load_table();
    assert_eq!(table.reads.len(), 12);
    assert_eq!(table.groups.len(), 2);
    assert_eq!(table.groups[0].0, "hapA");
    assert_eq!(table.reads[0].alignment.diffs().len(), 2);
    let extent = table.extent("chr1").unwrap();
    assert_eq!((extent.start, extent.end), (1, 400));
}

#[test]
fn test_crawlers_recover_haplotypes() {
    for id in [StrategyId::SimpleGeneCrawler, StrategyId::GeneCrawler] {
        let result = run(id, &options());
        assert!(!result.is_nested());
        assert_eq!(result.size(), 2, "{}", id);
        assert_eq!(member_sets(&result), expected_sets(), "{}", id);
        for strain in result.iter() {
            assert_eq!((strain.start(), strain.end()), (1, 400));
            assert!(strain.filled().is_empty());
        }
        assert_eq!(result.strains()[0].name(), "strain_1");
    }
}

#[test]
fn test_every_intersecting_read_is_assigned() {
    let context = context();
    let result = run(StrategyId::GeneCrawler, &options());
    let assigned: BTreeSet<ReadId> = result.iter().flat_map(|s| s.read_ids()).collect();
    let expected: BTreeSet<ReadId> = context
        .reads()
        .iter()
        .filter(|r| r.intersects(&segment()))
        .map(|r| r.id)
        .collect();
    assert_eq!(assigned, expected);
}

fn diff_positions(result: &StrainerResult) -> Vec<Vec<i64>> {
    let mut positions: Vec<Vec<i64>> = result
        .iter()
        .map(|s| s.alignment().diffs().iter().map(|d| d.ref_pos).collect())
        .collect();
    positions.sort();
    positions
}

#[test]
fn test_linker_agrees_with_single_crawl() {
    let direct = run(StrategyId::GeneCrawler, &options());
    for (method, size) in [
        (SegmentMethod::ByLength, 100),
        (SegmentMethod::ByLength, 200),
        (SegmentMethod::ByLength, 333),
        (SegmentMethod::ByReadCount, 3),
        (SegmentMethod::ByReadCount, 4),
    ] {
        let linked = run(
            StrategyId::SegmentLinker,
            &options().with_segmentation(method, size),
        );
        assert_eq!(member_sets(&linked), member_sets(&direct), "{:?} {}", method, size);
        assert_eq!(diff_positions(&linked), diff_positions(&direct), "{:?} {}", method, size);
    }
}

#[test]
fn test_strains_of_one_result_stay_apart() {
    let options = options();
    for result in [
        run(StrategyId::SimpleGeneCrawler, &options),
        run(StrategyId::GeneCrawler, &options),
        run(
            StrategyId::SegmentLinker,
            &options.clone().with_segmentation(SegmentMethod::ByLength, 333),
        ),
    ] {
        let strains = result.strains();
        for (i, a) in strains.iter().enumerate() {
            for b in &strains[i + 1..] {
                let ratio = diff_ratio(a.alignment(), b.alignment(), 1, 400, true).unwrap();
                assert!(
                    ratio > options.maximum_diff_fraction,
                    "{} and {} differ by only {}",
                    a.name(),
                    b.name(),
                    ratio
                );
            }
        }
    }
}

#[test]
fn test_substrainer_never_moves_reads_between_groups() {
    let result = run(StrategyId::Substrainer, &options());
    let StrainerResult::Nested(nested) = &result else {
        panic!("expected a nested result");
    };
    let mut seen: BTreeSet<ReadId> = BTreeSet::new();
    for child in nested.children() {
        for strain in child.result.iter() {
            assert!(strain.name().starts_with(&format!("{}/", child.group)));
            for id in strain.read_ids() {
                assert!(seen.insert(id), "read {} appears in two groups", id);
            }
        }
    }
    assert_eq!(seen.len(), 12);
    assert_eq!(member_sets(&result), expected_sets());
}

#[test]
fn test_manual_returns_groups() {
    let result = run(StrategyId::Manual, &options());
    let names: Vec<&str> = result.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["hapA", "hapB"]);
    assert_eq!(member_sets(&result), expected_sets());
}

#[test]
fn test_results_are_deterministic() {
    for id in [StrategyId::GeneCrawler, StrategyId::SegmentLinker, StrategyId::Substrainer] {
        let options = options().with_segmentation(SegmentMethod::ByReadCount, 4);
        let first = run(id, &options).to_snapshot().unwrap();
        let second = run(id, &options).to_snapshot().unwrap();
        assert_eq!(first, second, "{}", id);
    }
}

#[test]
fn test_materialization_is_idempotent() {
    let reference = vec![b'A'; 400];
    let mut result = run(StrategyId::GeneCrawler, &options());
    let materialize = MaterializeOptions::default();
    let first = result.materialize_sequences(&reference, &materialize).unwrap();
    let second = result.materialize_sequences(&reference, &materialize).unwrap();
    assert_eq!(first, second);

    let (_, bases) = &first[0];
    assert_eq!(bases.len(), 400);
    for pos in HAP_A {
        assert_eq!(bases.as_bytes()[pos as usize - 1], b'C');
    }
    assert_eq!(bases.matches('C').count(), HAP_A.len());
}

#[test]
fn test_snapshot_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("result.strainer");
    let result = run(StrategyId::Substrainer, &options());
    result.write_snapshot(&path).unwrap();
    let loaded = StrainerResult::read_snapshot(&path).unwrap();
    assert_eq!(loaded, result);
}

#[test]
fn test_cancelled_run_reports_cancellation() {
    let progress = AtomicProgress::new();
    progress.cancel();
    for id in [StrategyId::GeneCrawler, StrategyId::SegmentLinker, StrategyId::Substrainer] {
        let strainer = build_strainer(id, &options(), &context()).unwrap();
        let result = strainer.strain(&segment(), None, &progress);
        assert!(matches!(result, Err(StrainerError::Cancelled)), "{}", id);
    }
}
