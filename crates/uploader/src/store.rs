//! Object store seam and its S3 implementation

use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tracing::debug;

use contracts::UploadConfig;

use crate::error::{Result, UploadError};

/// Environment variable holding the access key
pub const ACCESS_KEY_ENV: &str = "SMARTMETER_ACCESS_KEY";

/// Environment variable holding the secret key
pub const SECRET_KEY_ENV: &str = "SMARTMETER_SECRET_KEY";

/// Destination of uploaded files
#[trait_variant::make(ObjectStore: Send)]
pub trait LocalObjectStore {
    /// Store name for logs (the bucket)
    fn name(&self) -> &str;

    /// Store `body` under `key`, replacing an existing object
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
}

/// Access key pair of the bucket
#[derive(Clone)]
pub struct StoreCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl StoreCredentials {
    /// Read both keys; an empty value counts as missing
    pub fn from_env() -> Result<Self> {
        let read = |var: &'static str| {
            std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or(UploadError::MissingCredential(var))
        };
        Ok(Self {
            access_key: read(ACCESS_KEY_ENV)?,
            secret_key: read(SECRET_KEY_ENV)?,
        })
    }
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// S3 (or MinIO) bucket
pub struct S3Store {
    name: String,
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(config: &UploadConfig, credentials: &StoreCredentials) -> Result<Self> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint_url(),
        };
        let credentials = Credentials::new(
            Some(credentials.access_key.as_str()),
            Some(credentials.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| UploadError::Setup(e.to_string()))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| UploadError::Setup(e.to_string()))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }
        debug!(bucket = %config.bucket, endpoint = %config.endpoint_url(), "object store ready");

        Ok(Self {
            name: config.bucket.clone(),
            bucket,
        })
    }
}

impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let response = self
            .bucket
            .put_object(key, &body)
            .await
            .map_err(|e| UploadError::store(key, e.to_string()))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(UploadError::store(key, format!("HTTP {status}")));
        }
        Ok(())
    }
}
