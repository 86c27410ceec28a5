//! Change a user's role.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{AuthUser, Role};

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub user: AuthUser,
}

/// Handler to change a user's role. Admin only; self-demotion is
/// refused.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    super::require_admin(&actor)?;

    let user = state
        .service
        .change_role(&actor, &user_id, body.role)
        .await?;
    Ok(Json(Response { user }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::*;

    async fn register(
        app: axum::Router,
        email: &str,
    ) -> (String, String) {
        let response = make_request(
            app,
            Method::POST,
            "/create",
            None,
            json!({
                "email": email,
                "password": "longenough1",
                "name": "A",
            })
            .to_string(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (
            body["token"].as_str().unwrap().to_owned(),
            body["user"]["id"].as_str().unwrap().to_owned(),
        )
    }

    #[tokio::test]
    async fn test_update_role() {
        let (state, _dir) = test_state();
        let app = app(state);

        let (admin_token, admin_id) =
            register(app.clone(), "admin@x.com").await;
        let (_, user_id) = register(app.clone(), "user@x.com").await;

        let path = format!("/users/{user_id}");
        let response = make_request(
            app.clone(),
            Method::PATCH,
            &path,
            Some(&admin_token),
            json!({ "role": "admin" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["user"]["role"], "admin");

        // self-demotion is refused.
        let path = format!("/users/{admin_id}");
        let response = make_request(
            app.clone(),
            Method::PATCH,
            &path,
            Some(&admin_token),
            json!({ "role": "user" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // unknown roles never deserialize.
        let response = make_request(
            app,
            Method::PATCH,
            &path,
            Some(&admin_token),
            json!({ "role": "root" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
