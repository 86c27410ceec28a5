//! Current and per-id identity lookup.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::user::AuthUser;

#[derive(Debug, Serialize)]
pub struct Response {
    pub user: AuthUser,
}

/// Handler for the current identity behind the presented token.
pub async fn me(Extension(user): Extension<AuthUser>) -> Json<Response> {
    Json(Response { user })
}

/// Handler to get any user. Admin only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Json<Response>> {
    super::require_admin(&actor)?;

    let user = state.service.get_user(&user_id).await?;
    Ok(Json(Response { user }))
}
