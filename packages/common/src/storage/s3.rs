use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

use super::error::MirrorError;
use super::key::validate_key;
use super::traits::ObjectMirror;
use crate::config::MirrorConfig;
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Object mirror backed by an S3 (or S3-compatible) bucket.
///
/// Single-request PUTs are atomic on S3, so a failed upload never replaces
/// the previous object.
pub struct S3Mirror {
    bucket: Box<Bucket>,
    name: String,
    policy: RetryPolicy,
}

impl S3Mirror {
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config.region.parse().map_err(|e| {
                MirrorError::Config(format!("invalid region '{}': {e}", config.region))
            })?,
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| MirrorError::Config(format!("cannot resolve S3 credentials: {e}")))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| MirrorError::Config(format!("invalid bucket '{}': {e}", config.bucket)))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            name: config.bucket.clone(),
            policy: config.retry_policy(),
        })
    }

    async fn head_once(&self, key: &str) -> Result<bool, MirrorError> {
        match self.bucket.head_object(key).await {
            Ok((_, code)) if is_success(code) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) => Err(MirrorError::Remote(format!("HEAD {key} returned {code}"))),
            Err(e) => match classify(key, e) {
                MirrorError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn get_once(&self, key: &str) -> Result<Vec<u8>, MirrorError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| classify(key, e))?;
        match response.status_code() {
            code if is_success(code) => Ok(response.bytes().to_vec()),
            404 => Err(MirrorError::NotFound(key.to_string())),
            code => Err(MirrorError::Remote(format!("GET {key} returned {code}"))),
        }
    }

    async fn put_once(&self, data: &[u8], key: &str, content_type: &str) -> Result<(), MirrorError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| classify(key, e))?;
        match response.status_code() {
            code if is_success(code) => Ok(()),
            code => Err(MirrorError::Remote(format!("PUT {key} returned {code}"))),
        }
    }

    async fn copy_once(&self, source: &str, dest: &str) -> Result<(), MirrorError> {
        let code = self
            .bucket
            .copy_object_internal(source, dest)
            .await
            .map_err(|e| classify(source, e))?;
        match code {
            code if is_success(code) => Ok(()),
            404 => Err(MirrorError::NotFound(source.to_string())),
            code => Err(MirrorError::Remote(format!(
                "COPY {source} -> {dest} returned {code}"
            ))),
        }
    }
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn classify(key: &str, err: S3Error) -> MirrorError {
    match err {
        S3Error::HttpFailWithBody(404, _) => MirrorError::NotFound(key.to_string()),
        other => MirrorError::Remote(other.to_string()),
    }
}

#[async_trait]
impl ObjectMirror for S3Mirror {
    fn target(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool, MirrorError> {
        let key = validate_key(key)?;
        retry_with_backoff(self.policy, "s3.head", MirrorError::is_permanent, move || {
            self.head_once(key)
        })
        .await
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, MirrorError> {
        let key = validate_key(key)?;
        let data = retry_with_backoff(self.policy, "s3.get", MirrorError::is_permanent, move || {
            self.get_once(key)
        })
        .await?;
        debug!(bucket = %self.name, key, bytes = data.len(), "Fetched object");
        Ok(data)
    }

    async fn store(
        &self,
        data: &[u8],
        key: &str,
        content_type: Option<&str>,
    ) -> Result<(), MirrorError> {
        let key = validate_key(key)?;
        let content_type = content_type.unwrap_or("application/octet-stream");
        retry_with_backoff(self.policy, "s3.put", MirrorError::is_permanent, move || {
            self.put_once(data, key, content_type)
        })
        .await?;
        debug!(bucket = %self.name, key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<(), MirrorError> {
        let source = validate_key(source)?;
        let dest = validate_key(dest)?;
        retry_with_backoff(self.policy, "s3.copy", MirrorError::is_permanent, move || {
            self.copy_once(source, dest)
        })
        .await
    }
}
