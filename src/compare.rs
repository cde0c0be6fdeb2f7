//! Pairwise comparison of two aligned sequences over a reference window
//!
//! Every equivalence decision made by the crawlers goes through
//! [`count_diffs`], so the rules here define what "same variant" means.

use crate::alignment::{Alignment, Difference};
use crate::walker::DiffWalker;
use std::cmp::{max, min};

/// Clamp `[start, end]` to the span covered by both alignments
pub fn clamp_window(a: &Alignment, b: &Alignment, start: i64, end: i64) -> Option<(i64, i64)> {
    let start = max(start, max(a.start(), b.start()));
    let end = min(end, min(a.end(), b.end()));
    (start <= end).then_some((start, end))
}

/// Count positions where `a` and `b` disagree inside `[start, end]`.
///
/// The window is clamped to the span shared by both alignments, and
/// positions inside either alignment's uncovered ranges are skipped. An empty
/// window yields zero. With `ignore_ambiguous`, an `N` on either side never
/// counts as a mismatch.
pub fn count_diffs(
    a: &Alignment,
    b: &Alignment,
    start: i64,
    end: i64,
    ignore_ambiguous: bool,
) -> usize {
    let Some((start, end)) = clamp_window(a, b, start, end) else {
        return 0;
    };

    let mut exclusions = Vec::with_capacity(a.unknown().len() + b.unknown().len());
    exclusions.extend_from_slice(a.unknown());
    exclusions.extend_from_slice(b.unknown());

    let mut walker_a = DiffWalker::new(a, start, end, &exclusions);
    let mut walker_b = DiffWalker::new(b, start, end, &exclusions);
    let mut count = 0;

    loop {
        let pos_a = walker_a.current_pos();
        let pos_b = walker_b.current_pos();
        if pos_a > end && pos_b > end {
            break;
        }

        if pos_a < pos_b {
            if let Some(diff) = walker_a.current() {
                count += single_sided(diff, ignore_ambiguous);
            }
            walker_a.advance();
        } else if pos_b < pos_a {
            if let Some(diff) = walker_b.current() {
                count += single_sided(diff, ignore_ambiguous);
            }
            walker_b.advance();
        } else {
            let (Some(diff_a), Some(diff_b)) = (walker_a.current(), walker_b.current()) else {
                break;
            };
            // An insertion only pairs with another insertion at the same spot
            if diff_a.is_insertion() && !diff_b.is_insertion() {
                count += single_sided(diff_a, ignore_ambiguous);
                walker_a.advance();
            } else if diff_b.is_insertion() && !diff_a.is_insertion() {
                count += single_sided(diff_b, ignore_ambiguous);
                walker_b.advance();
            } else {
                if bases_differ(diff_a, diff_b, ignore_ambiguous) {
                    count += 1;
                }
                walker_a.advance();
                walker_b.advance();
            }
        }
    }

    count
}

fn single_sided(diff: &Difference, ignore_ambiguous: bool) -> usize {
    if ignore_ambiguous && diff.is_ambiguous() {
        0
    } else {
        1
    }
}

fn bases_differ(a: &Difference, b: &Difference, ignore_ambiguous: bool) -> bool {
    if ignore_ambiguous && (a.is_ambiguous() || b.is_ambiguous()) {
        return false;
    }
    !a.query_base.eq_ignore_ascii_case(&b.query_base)
}

/// Mismatches per compared base, `None` when the clamped window is empty
pub fn diff_ratio(
    a: &Alignment,
    b: &Alignment,
    start: i64,
    end: i64,
    ignore_ambiguous: bool,
) -> Option<f64> {
    let (start, end) = clamp_window(a, b, start, end)?;
    let count = count_diffs(a, b, start, end, ignore_ambiguous);
    Some(count as f64 / (end - start + 1) as f64)
}

/// True when the two sequences overlap inside the window and disagree on at
/// most `max_diff` of the compared positions.
pub fn sequences_match(
    a: &Alignment,
    b: &Alignment,
    start: i64,
    end: i64,
    max_diff: f64,
    ignore_ambiguous: bool,
) -> bool {
    diff_ratio(a, b, start, end, ignore_ambiguous).is_some_and(|ratio| ratio <= max_diff)
}
