use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use log::info;

use crate::config::ObjectStoreConfig;
use crate::error::ObjectStoreError;

/// One per process. Opaque bytes under keys of shape
/// `batches/{batch_id}/{filename}_{uuid}`; the core treats this strictly
/// as a staging area for uploaded JSONL blobs.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn connect(config: &ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "dispatch-objectstore",
        );

        let s3_config = S3ConfigBuilder::new()
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        let store = Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        };
        store.ensure_bucket_exists().await?;
        Ok(store)
    }

    async fn ensure_bucket_exists(&self) -> Result<(), ObjectStoreError> {
        let exists = self.client.head_bucket().bucket(&self.bucket).send().await;
        if exists.is_ok() {
            return Ok(());
        }

        info!("creating object store bucket {}", self.bucket);
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| ObjectStoreError::BucketSetup(e.to_string()))?;
        Ok(())
    }

    pub fn key_for(&self, batch_id: &str, filename: &str) -> String {
        format!("batches/{batch_id}/{filename}_{}", uuid::Uuid::new_v4())
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Connect(Box::new(e)))?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::Connect(Box::new(e))
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Connect(Box::new(e)))?
            .into_bytes();
        Ok(bytes)
    }

    pub async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Connect(Box::new(e)))?;
        Ok(())
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Connect(Box::new(e)))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect())
    }
}
