//! Artifact storage using object_store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use crate::declaration::UploadEnv;
use crate::error::{DeployError, DeployResult, PlatformError, PlatformResult};

use super::BlobStore;

/// [`BlobStore`] backed by any `object_store` implementation.
pub struct ObjectStoreBlobs {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreBlobs {
    /// Connect to the S3 bucket named in a declaration's upload environment.
    ///
    /// The bucket is addressed in [`UploadEnv::artifact_region`], which is
    /// the bucket region when one is declared.
    pub fn s3(env: &UploadEnv) -> DeployResult<Self> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(&env.bucket)
            .with_region(env.artifact_region())
            .with_access_key_id(&env.access_key_id)
            .with_secret_access_key(&env.secret_access_key)
            .build()
            .map_err(|e| {
                DeployError::Platform(PlatformError::service(
                    "CreateS3Store",
                    format!("failed to create S3 store: {e}"),
                ))
            })?;

        Ok(Self::with_store(Arc::new(store), env.bucket.clone()))
    }

    /// Wrap a pre-configured object store.
    #[must_use]
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, body: Bytes) -> PlatformResult<()> {
        let path = ObjectPath::from(key);
        debug!(bucket = %self.bucket, path = %path, size = body.len(), "uploading object");

        self.store
            .put(&path, body.into())
            .await
            .map_err(|e| PlatformError::service("PutObject", e.to_string()))?;
        Ok(())
    }
}
