//! nicefox-auth is a centralized authentication service minting
//! domain-scoped JSON Web Tokens for client applications sharing one
//! sign-on provider.

#![forbid(unsafe_code)]

pub mod broker;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod google;
mod router;
pub mod secrets;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::Router;
pub use error::ServerError;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

const DEFAULT_PG_CREDENTIALS: &str = "postgres";
const DEFAULT_PG_DATABASE: &str = "nicefox_auth";
const DEFAULT_PG_POOL_SIZE: u32 = 10;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request =
            request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State to build, for handler tests only.
#[cfg(test)]
pub fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let secrets =
        Arc::new(secrets::SecretStore::new(dir.path(), false).unwrap());
    secrets.provision_or_get("auth.example.com").unwrap();
    secrets.provision_or_get("app.example.com").unwrap();

    let mut config = config::Configuration::default();
    config.name = "test".into();
    config.url = "https://auth.example.com/".into();
    config.host = "auth.example.com".into();
    config.allowed_redirect_hosts = vec!["app.example.com".into()];
    let config = Arc::new(config);

    let password = crypto::PasswordManager::new(Some(config::Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap();

    let broker = Arc::new(broker::StateBroker::new());
    let service = user::UserService::new(
        Arc::new(user::MemoryUserRepository::new()),
        Arc::clone(&secrets),
        token::TokenCodec::new(Arc::clone(&secrets), 3600),
        Arc::clone(&broker),
        None,
        password,
        config.host(),
        config.allowed_redirect_hosts.clone(),
    )
    .unwrap();

    (
        AppState {
            config,
            secrets,
            broker,
            service,
        },
        dir,
    )
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub secrets: Arc<secrets::SecretStore>,
    pub broker: Arc<broker::StateBroker>,
    pub service: user::UserService,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /create` goes to `create`.
        .route("/create", post(router::create::handler))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        // `POST /oauth/token` goes to the cross-domain exchange.
        .route("/oauth/token", post(router::oauth::exchange))
        // `GET /oauth/google` starts the provider round trip.
        .route("/oauth/google", get(router::oauth::google))
        // `GET /oauth/google/callback` finishes it.
        .route("/oauth/google/callback", get(router::oauth::callback))
        .nest("/users", router::users::router(state.clone()))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
///
/// Every required piece of configuration is checked here, once, at
/// startup; nothing is created lazily on first use.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    let secrets = Arc::new(secrets::SecretStore::new(
        config.secrets.dir.clone(),
        config.production,
    )?);

    // periodic sweep of abandoned sign-in flows.
    let broker = Arc::new(broker::StateBroker::new());
    Arc::clone(&broker).spawn_reaper();

    let repo: Arc<dyn user::UserRepository> = match config.postgres {
        Some(ref pg) => {
            let addr = format!(
                "postgres://{}:{}@{}/{}",
                pg.username
                    .as_deref()
                    .unwrap_or(DEFAULT_PG_CREDENTIALS),
                pg.password
                    .as_deref()
                    .unwrap_or(DEFAULT_PG_CREDENTIALS),
                pg.address,
                pg.database.as_deref().unwrap_or(DEFAULT_PG_DATABASE),
            );
            let pool = PgPoolOptions::new()
                .max_connections(pg.pool_size.unwrap_or(DEFAULT_PG_POOL_SIZE))
                .connect(&addr)
                .await?;

            // execute migrations scripts on start.
            sqlx::migrate!().run(&pool).await?;
            tracing::info!(address = %pg.address, "postgres connected");

            Arc::new(user::PgUserRepository::new(pool))
        }
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, user accounts will not survive a restart"
            );
            Arc::new(user::MemoryUserRepository::new())
        }
    };

    let google = match config.google {
        Some(ref cfg) => Some(google::GoogleClient::new(cfg.clone())?),
        None => {
            tracing::warn!(
                "missing `google` entry on `config.yaml` file, google sign-in is disabled"
            );
            None
        }
    };

    let password = crypto::PasswordManager::new(config.argon2.clone())?;
    let codec =
        token::TokenCodec::new(Arc::clone(&secrets), config.token.ttl);
    let service = user::UserService::new(
        repo,
        Arc::clone(&secrets),
        codec,
        Arc::clone(&broker),
        google,
        password,
        config.host(),
        config.allowed_redirect_hosts.clone(),
    )?;

    Ok(AppState {
        config,
        secrets,
        broker,
        service,
    })
}
