use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::{TOKEN_TYPE, Valid};
use crate::user::{AuthUser, RegisterInput};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name is required."))]
    pub name: String,
    /// Tenant the first token is minted for; defaults to this instance.
    pub domain: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
    pub user: AuthUser,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let (user, token) = state
        .service
        .register(
            RegisterInput {
                email: body.email,
                password: body.password,
                name: body.name,
            },
            body.domain.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            expires_in: state.service.token_ttl(),
            user,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::*;

    #[tokio::test]
    async fn test_create_handler() {
        let (state, _dir) = test_state();
        let app = app(state.clone());

        let response = make_request(
            app,
            Method::POST,
            "/create",
            None,
            json!({
                "email": "a@x.com",
                "password": "longenough1",
                "name": "A",
            })
            .to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["email"], "a@x.com");
        // first registered user becomes admin.
        assert_eq!(body["user"]["role"], "admin");
        // sensitive fields never serialize.
        assert!(body["user"].get("password_hash").is_none());
        assert!(body["user"].get("google_id").is_none());

        let token = body["token"].as_str().unwrap();
        let claims = state
            .service
            .identify(token)
            .await
            .expect("token must verify on our own domain");
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_create_binds_token_to_requested_domain() {
        let (state, _dir) = test_state();
        let app = app(state.clone());
        state.secrets.provision_or_get("other.example.com").unwrap();

        let response = make_request(
            app,
            Method::POST,
            "/create",
            None,
            json!({
                "email": "a@x.com",
                "password": "longenough1",
                "name": "A",
                "domain": "app.example.com",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let token = body["token"].as_str().unwrap();

        let codec = token::TokenCodec::new(Arc::clone(&state.secrets), 3600);
        let claims = codec.verify(token, "app.example.com").unwrap();
        assert_eq!(claims.email, "a@x.com");
        assert!(codec.verify(token, "other.example.com").is_err());
    }

    #[tokio::test]
    async fn test_create_duplicate_email() {
        let (state, _dir) = test_state();
        let app = app(state);

        let body = json!({
            "email": "a@x.com",
            "password": "longenough1",
            "name": "A",
        })
        .to_string();

        let response = make_request(
            app.clone(),
            Method::POST,
            "/create",
            None,
            body.clone(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response =
            make_request(app, Method::POST, "/create", None, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_with_short_password() {
        let (state, _dir) = test_state();
        let app = app(state);

        let response = make_request(
            app,
            Method::POST,
            "/create",
            None,
            json!({
                "email": "a@x.com",
                "password": "short",
                "name": "A",
            })
            .to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
