use crate::error::{Result, StrainerError};
use crate::strategy::StrategyId;
use serde::{Deserialize, Serialize};

/// How the segment linker cuts a long segment into sub-segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentMethod {
    /// A new sub-segment starts every `segment_size` reads, ordered by start
    ByReadCount,
    /// Sub-segments are `segment_size` bases long
    ByLength,
}

/// Options consumed when turning strains into sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterializeOptions {
    /// Fill positions a strain does not cover with reference bases instead of gaps.
    pub fill_from_composite: bool,
    /// Translate nucleotide sequences to protein and fold strains that collapse.
    pub convert_to_amino_acids: bool,
}

/// Configuration shared by every strainer.
///
/// Built once by the caller and passed down by reference. Nested runs derive
/// their own copy with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlOptions {
    /// Minimum number of bases two reads must share to be chained.
    /// Default: 80
    pub minimum_overlap: u32,

    /// Largest fraction of mismatching positions for two sequences to count
    /// as the same variant.
    /// Default: 0.01
    pub maximum_diff_fraction: f64,

    /// Tolerance used when picking donors to complete partial strains.
    /// Default: 0.02
    pub completion_tolerance: f64,

    /// Clamp comparison windows to the target segment.
    /// Default: true
    pub restrict_matches_to_segment: bool,

    /// Merge the reads of duplicate strains instead of dropping them.
    /// Default: false
    pub keep_all_reads: bool,

    /// Treat `N` as matching any base.
    /// Default: true
    pub ignore_ambiguous: bool,

    /// Segment linker only.
    /// Default: ByLength
    pub segment_method: SegmentMethod,

    /// Segment linker only: reads or bases per sub-segment.
    /// Default: 2000
    pub segment_size: u32,

    /// Segment linker and substrainer only: the strainer run per sub-problem.
    /// Default: GeneCrawler
    pub inner_strainer: StrategyId,

    pub materialize: MaterializeOptions,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            minimum_overlap: 80,
            maximum_diff_fraction: 0.01,
            completion_tolerance: 0.02,
            restrict_matches_to_segment: true,
            keep_all_reads: false,
            ignore_ambiguous: true,
            segment_method: SegmentMethod::ByLength,
            segment_size: 2000,
            inner_strainer: StrategyId::GeneCrawler,
            materialize: MaterializeOptions::default(),
        }
    }
}

impl CrawlOptions {
    pub fn validate(&self) -> Result<()> {
        if self.minimum_overlap == 0 {
            return Err(StrainerError::Configuration(
                "minimum_overlap must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("maximum_diff_fraction", self.maximum_diff_fraction),
            ("completion_tolerance", self.completion_tolerance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StrainerError::Configuration(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.segment_size == 0 {
            return Err(StrainerError::Configuration(
                "segment_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_minimum_overlap(mut self, minimum_overlap: u32) -> Self {
        self.minimum_overlap = minimum_overlap;
        self
    }

    pub fn with_maximum_diff_fraction(mut self, fraction: f64) -> Self {
        self.maximum_diff_fraction = fraction;
        self
    }

    pub fn with_completion_tolerance(mut self, tolerance: f64) -> Self {
        self.completion_tolerance = tolerance;
        self
    }

    pub fn with_restrict_matches_to_segment(mut self, restrict: bool) -> Self {
        self.restrict_matches_to_segment = restrict;
        self
    }

    pub fn with_keep_all_reads(mut self, keep_all_reads: bool) -> Self {
        self.keep_all_reads = keep_all_reads;
        self
    }

    pub fn with_ignore_ambiguous(mut self, ignore: bool) -> Self {
        self.ignore_ambiguous = ignore;
        self
    }

    pub fn with_segmentation(mut self, method: SegmentMethod, size: u32) -> Self {
        self.segment_method = method;
        self.segment_size = size;
        self
    }

    pub fn with_inner_strainer(mut self, inner: StrategyId) -> Self {
        self.inner_strainer = inner;
        self
    }

    pub fn with_materialize(mut self, materialize: MaterializeOptions) -> Self {
        self.materialize = materialize;
        self
    }
}
