use serde::Deserialize;

/// Elasticsearch connection settings, read from the `EVENTSTORE_` prefixed
/// environment the same way `postgres_url_from_environment` reads
/// `POSTGRES_` in the teacher's db crate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_index() -> String {
    "events".to_string()
}

impl StoreConfig {
    pub fn from_environment() -> figment::Result<Self> {
        figment::Figment::from(figment::providers::Env::prefixed("EVENTSTORE_")).extract()
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
