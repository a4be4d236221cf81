use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// The ingestion worker's own knobs, separate from the store/queue/
/// object-store connection settings each adapter reads for itself.
/// Mirrors `IngestConfig::figment` in the teacher: serde defaults,
/// overridable by a TOML file, overridable again by the environment.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Lines per chunk when partitioning an uploaded JSONL blob.
    pub chunk_size: usize,
    /// Attempts for bulk-index / bulk-publish retries within one chunk.
    pub index_publish_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            index_publish_retries: 3,
        }
    }
}

impl IngestConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("dispatch.toml"))
            .merge(Env::raw())
    }

    pub fn config() -> figment::Result<Self> {
        Self::figment().extract()
    }
}
