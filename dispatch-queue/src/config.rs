use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_pass")]
    pub pass: String,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5672
}
fn default_user() -> String {
    "guest".to_string()
}
fn default_pass() -> String {
    "guest".to_string()
}

impl BrokerConfig {
    pub fn from_environment() -> figment::Result<Self> {
        figment::Figment::from(figment::providers::Env::prefixed("BROKER_")).extract()
    }

    pub fn amqp_url(&self) -> String {
        format!("amqp://{}:{}@{}:{}/%2f", self.user, self.pass, self.host, self.port)
    }
}

pub const BATCH_JOBS_QUEUE: &str = "batch_jobs";
pub const TASKS_QUEUE: &str = "tasks";
