use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized};
use serde::{Deserialize, Serialize};

/// The execution worker's knobs from §6's Configuration table:
/// `MAX_PARALLEL_TASKS`, `MAX_RETRIES`, `LLM_TIMEOUT`. Read unprefixed
/// from the environment, same shape as `IngestConfig::figment` in the
/// teacher but without a TOML layer (these three are meant to be set per
/// deployment, not checked in).
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    pub max_parallel_tasks: usize,
    pub max_retries: u32,
    pub llm_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 200,
            max_retries: 5,
            llm_timeout_secs: 120,
        }
    }
}

impl ExecutorConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::raw())
    }

    pub fn config() -> figment::Result<Self> {
        Self::figment().extract()
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}
