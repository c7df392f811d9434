pub mod index;
pub mod orchestrator;
pub mod preindexed;
#[cfg(test)]
pub mod testing;

pub use orchestrator::{AnalysisResult, AnalyzerConfig, VideoAnalyzer};
