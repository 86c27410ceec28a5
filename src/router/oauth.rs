//! Google sign-in round trip and cross-domain token exchange.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{TOKEN_TYPE, Valid, bearer_token};

#[derive(Debug, Deserialize)]
pub struct BeginQuery {
    /// URL of the client application the browser returns to.
    pub redirect: String,
}

/// Handler to start a Google sign-in flow.
pub async fn google(
    State(state): State<AppState>,
    Query(query): Query<BeginQuery>,
) -> Result<Redirect> {
    let url = state.service.google_begin(&query.redirect)?;

    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Handler for the provider redirect. Consumes the state entry exactly
/// once, then forwards the browser to the stored redirect URL with the
/// minted token appended.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect> {
    if let Some(error) = query.error {
        tracing::warn!(error, "provider refused authorization");
        return Err(ServerError::Unauthorized);
    }

    let code = query.code.ok_or(ServerError::Unauthorized)?;
    let oauth_state =
        query.state.ok_or(ServerError::StateExpiredOrUnknown)?;

    let url = state.service.google_callback(&code, &oauth_state).await?;
    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ExchangeBody {
    /// Target tenant for the fresh token.
    #[validate(length(min = 1, message = "Domain is required."))]
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// Handler for the cross-domain single sign-on hand-off: the presented
/// token is verified against this instance's own domain, the returned
/// one is signed for the target domain.
pub async fn exchange(
    State(state): State<AppState>,
    headers: HeaderMap,
    Valid(body): Valid<ExchangeBody>,
) -> Result<Json<ExchangeResponse>> {
    let token = bearer_token(&headers)?;
    let token = state.service.exchange(&token, &body.domain).await?;

    Ok(Json(ExchangeResponse {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: state.service.token_ttl(),
    }))
}
