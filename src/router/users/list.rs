//! List every registered user.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::user::AuthUser;

#[derive(Debug, Serialize)]
pub struct Response {
    pub users: Vec<AuthUser>,
}

/// Handler to list users, most recently created first. Admin only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> Result<Json<Response>> {
    super::require_admin(&actor)?;

    let users = state.service.list_users().await?;
    Ok(Json(Response { users }))
}
