pub mod prediction;
pub mod stats;
