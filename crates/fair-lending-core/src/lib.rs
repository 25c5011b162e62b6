pub mod config;
pub mod error;
pub mod metrics;
pub mod peers;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod shares;
pub mod significance;
pub mod table;
pub mod types;

pub use config::AnalysisConfig;
pub use error::FairLendingError;
pub use pipeline::{run_analysis, AnalysisInput, AnalysisOutput};
pub use types::*;

/// Standard result type for all fair-lending operations
pub type FairLendingResult<T> = Result<T, FairLendingError>;
