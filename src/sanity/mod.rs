// Output sanity and performance extraction
pub mod check;
pub mod extract;
pub mod pattern;
pub mod record;
pub mod verdict;

pub use check::{assert_all, SanityCheck, SanityFailure};
pub use extract::{Extraction, ExtractionFailure, Number, NumberKind, PerfRule, PerfValue};
pub use pattern::Pattern;
pub use record::{ExecutionRecord, Source};
pub use verdict::{assess, FailureKind, Stage, Verdict};
