use serde::Deserialize;

/// MinIO/S3-compatible endpoint settings, read from the `OBJECTSTORE_`
/// prefixed environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectStoreConfig {
    pub endpoint_url: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_bucket() -> String {
    "batches".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ObjectStoreConfig {
    pub fn from_environment() -> figment::Result<Self> {
        figment::Figment::from(figment::providers::Env::prefixed("OBJECTSTORE_")).extract()
    }
}
