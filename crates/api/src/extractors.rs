//! Request extractors.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use pipeline_core::{AuthErrorCode, Error, ValidationErrorCode};

use crate::response::ApiError;

/// Header naming the caller on privileged reads.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Identity of the caller, as asserted by the layer in front of this API.
///
/// Every read of candidate data is attributed to an actor in the access log,
/// so requests without one are refused.
#[derive(Debug, Clone)]
pub struct ActorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|a| !a.is_empty() && a.len() <= 256);

        match actor {
            Some(actor) => Ok(ActorId(actor.to_string())),
            None => Err(Error::auth(AuthErrorCode::MissingActor, format!("{ACTOR_HEADER} header is required")).into()),
        }
    }
}

/// JSON body whose rejections use the API error format.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(
                ValidationErrorCode::InvalidFormat.code(),
                vec![rejection.body_text()],
            )),
        }
    }
}
