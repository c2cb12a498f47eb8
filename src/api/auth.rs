use axum::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Actor, ActorRole};

/// Set by the authenticating proxy in front of this service.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized(format!("Malformed {} header", ACTOR_ID_HEADER)))?;
        let role = header(parts, ACTOR_ROLE_HEADER)?
            .parse::<ActorRole>()
            .map_err(AppError::Unauthorized)?;

        Ok(Actor::new(id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    async fn extract(request: Request<()>) -> Result<Actor, AppError> {
        let (mut parts, _) = request.into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, id.to_string())
            .header(ACTOR_ROLE_HEADER, "pet_owner")
            .body(())
            .unwrap();

        let actor = extract(request).await.unwrap();
        assert_eq!(actor, Actor::customer(id));
    }

    #[tokio::test]
    async fn test_missing_actor_is_unauthorized() {
        let request = Request::builder()
            .header(ACTOR_ROLE_HEADER, "DOCTOR")
            .body(())
            .unwrap();

        let err = extract(request).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
