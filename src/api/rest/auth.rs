use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Caller identity from the trusted gateway headers. Token verification
/// happens upstream; this service only consumes the resolved subject and
/// role.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)?;
        let role = header_value(parts, ACTOR_ROLE_HEADER)?;

        let id: Uuid = id
            .parse()
            .map_err(|_| AppError::BadRequest(format!("{ACTOR_ID_HEADER} is not a valid id")))?;

        let role = match role {
            "RIDER" => Role::Rider,
            "DRIVER" => Role::Driver,
            "ADMIN" => Role::Admin,
            other => {
                return Err(AppError::BadRequest(format!(
                    "unknown {ACTOR_ROLE_HEADER}: {other}"
                )));
            }
        };

        Ok(Actor { id, role })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Forbidden(format!("missing {name} header")))
}
