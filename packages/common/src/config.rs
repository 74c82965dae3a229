use serde::Deserialize;

/// Remote object-mirror configuration (S3 or an S3-compatible store).
#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    /// Bucket that holds both the source objects and the mirrored outputs.
    pub bucket: String,
    /// Region name. Default: "us-east-1".
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key. When unset, the environment/profile chain is used.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Use path-style addressing (`{endpoint}/{bucket}/{key}`). Default: false.
    #[serde(default)]
    pub path_style: bool,
    /// Retries after the first failed attempt. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Base backoff delay in milliseconds. Default: 200.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Backoff ceiling in milliseconds. Default: 5000.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_region() -> String {
    "us-east-1".into()
}
fn default_max_retries() -> u8 {
    3
}
fn default_retry_base_ms() -> u64 {
    200
}
fn default_retry_max_ms() -> u64 {
    5000
}

impl MirrorConfig {
    /// Minimal configuration for `bucket` with every other field defaulted.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }

    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy {
            max_retries: self.max_retries,
            base_ms: self.retry_base_ms,
            max_ms: self.retry_max_ms,
        }
    }
}
