//! Delete a user account.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::user::AuthUser;

#[derive(Debug, Serialize)]
pub struct Response {
    pub success: bool,
}

/// Handler to delete a user. Admin only; self-deletion is refused.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Json<Response>> {
    super::require_admin(&actor)?;

    state.service.remove_user(&actor, &user_id).await?;
    Ok(Json(Response { success: true }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::*;

    #[tokio::test]
    async fn test_delete_handler() {
        let (state, _dir) = test_state();
        let app = app(state);

        let response = make_request(
            app.clone(),
            Method::POST,
            "/create",
            None,
            json!({
                "email": "admin@x.com",
                "password": "longenough1",
                "name": "A",
            })
            .to_string(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let admin_token = body["token"].as_str().unwrap().to_owned();
        let admin_id = body["user"]["id"].as_str().unwrap().to_owned();

        let response = make_request(
            app.clone(),
            Method::POST,
            "/create",
            None,
            json!({
                "email": "user@x.com",
                "password": "longenough1",
                "name": "B",
            })
            .to_string(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let user_id = body["user"]["id"].as_str().unwrap().to_owned();

        // self-deletion is refused.
        let path = format!("/users/{admin_id}");
        let response = make_request(
            app.clone(),
            Method::DELETE,
            &path,
            Some(&admin_token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let path = format!("/users/{user_id}");
        let response = make_request(
            app.clone(),
            Method::DELETE,
            &path,
            Some(&admin_token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // deleting again reports not found.
        let response = make_request(
            app,
            Method::DELETE,
            &path,
            Some(&admin_token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
