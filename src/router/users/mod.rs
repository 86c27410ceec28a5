//! Users-related HTTP API.
mod delete;
mod get;
mod list;
mod update;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::{delete, get, patch};
use axum::{Router, middleware};

use crate::user::AuthUser;
use crate::{AppState, ServerError};

/// Custom middleware for authentification.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let token = crate::router::bearer_token(req.headers())?;
    let user = state.service.identify(&token).await?;

    req.extensions_mut().insert::<AuthUser>(user);
    Ok(next.run(req).await)
}

/// Guard for administrative routes.
fn require_admin(user: &AuthUser) -> Result<(), ServerError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ServerError::Forbidden)
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users` goes to `list`. Admin only.
        .route("/", get(list::handler))
        // `GET /users/@me` goes to `get::me`.
        .route("/@me", get(get::me))
        // `GET /users/:ID` goes to `get`. Admin only.
        .route("/{user_id}", get(get::handler))
        // `PATCH /users/:ID` goes to `update`. Admin only.
        .route("/{user_id}", patch(update::handler))
        // `DELETE /users/:ID` goes to `delete`. Admin only.
        .route("/{user_id}", delete(delete::handler))
        .route_layer(middleware::from_fn_with_state(state, auth))
}
