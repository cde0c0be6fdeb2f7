// lib.rs
pub mod alignment;
pub mod compare;
pub mod crawler;
pub mod error;
pub mod linker;
pub mod options;
pub mod progress;
pub mod read_index;
pub mod read_table;
pub mod result;
pub mod strain;
pub mod strategy;
pub mod substrainer;
pub mod translate;
pub mod walker;

pub use alignment::{Alignment, Difference, Read, ReadId, Segment};
pub use error::{Result, StrainerError};
pub use options::{CrawlOptions, MaterializeOptions, SegmentMethod};
pub use progress::{AtomicProgress, NoProgress, ProgressSink};
pub use result::{NestedChild, NestedStrainerResult, StrainerResult};
pub use strain::Strain;
pub use strategy::{build_strainer, SegmentStrainer, StrainerContext, StrategyId};
