use async_trait::async_trait;
use tracing::warn;

use super::error::MirrorError;
use super::key::content_type_for;

/// Key-addressed object store that local scratch files are mirrored to and
/// fetched from.
///
/// Every operation is idempotent for a given key. Implementations must never
/// expose a partially written object: `fetch` returns either the complete new
/// bytes or whatever was stored under the key before.
#[async_trait]
pub trait ObjectMirror: Send + Sync {
    /// Human-readable name of the target (bucket name or root directory).
    fn target(&self) -> &str;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, MirrorError>;

    /// Retrieve all bytes stored under `key`.
    ///
    /// Fails with [`MirrorError::NotFound`] when the object is absent.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, MirrorError>;

    /// Store `data` under `key`, replacing any previous object.
    async fn store(
        &self,
        data: &[u8],
        key: &str,
        content_type: Option<&str>,
    ) -> Result<(), MirrorError>;

    /// Server-side copy of `source` to `dest` within the same store.
    async fn copy(&self, source: &str, dest: &str) -> Result<(), MirrorError>;
}

/// Copy `source` to `dest`, falling back to a download and re-upload when
/// the in-store copy fails.
pub async fn transfer(
    mirror: &dyn ObjectMirror,
    source: &str,
    dest: &str,
) -> Result<(), MirrorError> {
    match mirror.copy(source, dest).await {
        Ok(()) => Ok(()),
        Err(err @ (MirrorError::InvalidKey(_) | MirrorError::NotFound(_))) => Err(err),
        Err(err) => {
            warn!(source, dest, error = %err, "In-store copy failed, falling back to fetch + store");
            let data = mirror.fetch(source).await?;
            let content_type = content_type_for(dest);
            mirror.store(&data, dest, Some(&content_type)).await
        }
    }
}
