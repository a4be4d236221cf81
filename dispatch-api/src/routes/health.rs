use dispatch_queue::Broker;
use dispatch_store::EventStore;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get};
use serde::Serialize;

use crate::auth::ApiToken;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
pub struct TokenBody {
    #[serde(rename = "isValid")]
    is_valid: bool,
}

/// Liveness of broker + event store, per §6. Unauthenticated (the one
/// endpoint that must answer even if the secret is misconfigured).
#[get("/health")]
pub async fn health(store: &State<EventStore>, broker: &State<Broker>) -> (Status, Json<HealthBody>) {
    if !broker.is_connected() {
        return (Status::ServiceUnavailable, Json(HealthBody { status: "unhealthy" }));
    }
    match store.ping().await {
        Ok(()) => (Status::Ok, Json(HealthBody { status: "healthy" })),
        Err(_) => (Status::ServiceUnavailable, Json(HealthBody { status: "unhealthy" })),
    }
}

#[get("/token")]
pub async fn token(_token: ApiToken) -> Json<TokenBody> {
    Json(TokenBody { is_valid: true })
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![health, token]
}
