use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::{TOKEN_TYPE, Valid};
use crate::user::AuthUser;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    /// Tenant the token is minted for; defaults to this instance.
    pub domain: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
    pub user: AuthUser,
}

/// Handler to login user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let (user, token) = state
        .service
        .login(&body.email, &body.password, body.domain.as_deref())
        .await?;

    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: state.service.token_ttl(),
        user,
    }))
}
