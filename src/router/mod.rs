//! HTTP routes.

pub mod create;
pub mod login;
pub mod oauth;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

pub const TOKEN_TYPE: &str = "Bearer";

const BEARER: &str = "Bearer ";

/// JSON body extractor running `validator` checks.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;

        Ok(Valid(value))
    }
}

/// Token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<String, ServerError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|token| token.replace(BEARER, ""))
        .ok_or(ServerError::Unauthorized)
}
