pub mod analyze;
pub mod metrics;
pub mod peers;
pub mod significance;
