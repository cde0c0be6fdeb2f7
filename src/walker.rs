use crate::alignment::{Alignment, Difference};

/// Cursor over the differences of one alignment that fall inside a window
/// and outside every excluded range.
///
/// Unlike an `Iterator`, the cursor is advanced explicitly so two walkers can
/// be merged by comparing [`DiffWalker::current_pos`]. Once exhausted the
/// position is `end + 1`, which sorts after any real difference.
pub struct DiffWalker<'a> {
    diffs: &'a [Difference],
    exclusions: &'a [(i64, i64)],
    end: i64,
    index: usize,
}

impl<'a> DiffWalker<'a> {
    pub fn new(
        alignment: &'a Alignment,
        start: i64,
        end: i64,
        exclusions: &'a [(i64, i64)],
    ) -> Self {
        let mut walker = DiffWalker {
            diffs: alignment.diffs_in(start, end),
            exclusions,
            end,
            index: 0,
        };
        walker.skip_excluded();
        walker
    }

    pub fn current(&self) -> Option<&'a Difference> {
        self.diffs.get(self.index)
    }

    pub fn current_pos(&self) -> i64 {
        self.current().map_or(self.end + 1, |d| d.ref_pos)
    }

    pub fn advance(&mut self) {
        if self.index < self.diffs.len() {
            self.index += 1;
            self.skip_excluded();
        }
    }

    pub fn restart(&mut self) {
        self.index = 0;
        self.skip_excluded();
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.diffs.len()
    }

    fn skip_excluded(&mut self) {
        while let Some(diff) = self.diffs.get(self.index) {
            if !self.is_excluded(diff.ref_pos) {
                break;
            }
            self.index += 1;
        }
    }

    fn is_excluded(&self, pos: i64) -> bool {
        self.exclusions.iter().any(|&(s, e)| pos >= s && pos <= e)
    }
}
