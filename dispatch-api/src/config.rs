use serde::Deserialize;

/// Bearer-token secret validated against every non-`/health` request, the
/// Rust shape of `core/auth.py::verify_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub api_secret_key: String,
}

impl ApiConfig {
    pub fn from_environment() -> figment::Result<Self> {
        figment::Figment::from(figment::providers::Env::raw()).extract()
    }
}
