pub mod analyzer;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod links;
pub mod probe;
pub mod result;

pub use analyzer::Analyzer;
pub use error::ScanError;
pub use fetch::{FetchConfig, Fetcher};
pub use links::{LinkKind, ResolvedLink};
pub use probe::{LinkProber, ProbeConfig};
pub use result::{HeadingCounts, PageAnalysis, ProbeOutcome};
