pub mod config;
pub mod retry;
pub mod storage;

pub use config::MirrorConfig;
pub use storage::{MirrorError, ObjectMirror};
