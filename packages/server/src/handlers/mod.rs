pub mod health;
pub mod image;
pub mod predict;
pub mod prediction;
pub mod stats;
