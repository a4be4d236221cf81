use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::config::ApiConfig;

/// A validated bearer token. Every non-`/health` route takes this as a
/// guard; Rocket runs it before the handler body, the same boundary
/// `core/auth.py::get_current_user` enforces as a FastAPI dependency.
pub struct ApiToken;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = request.rocket().state::<ApiConfig>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let presented = request
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "));

        match presented {
            Some(token) if token == config.api_secret_key => Outcome::Success(ApiToken),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}
