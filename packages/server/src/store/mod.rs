pub mod credentials;
pub mod sessions;

pub use credentials::{CreateOutcome, CredentialStore};
pub use sessions::{LabelCount, RecentStats, SessionStore};
