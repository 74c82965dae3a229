mod error;
mod key;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::MirrorError;
pub use key::{content_type_for, validate_key};
pub use traits::{ObjectMirror, transfer};
