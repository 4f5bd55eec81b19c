pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod naver;
pub mod storage;
pub mod user;
pub mod utils;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowHeaders, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use auth::TokenIssuer;
use config::Config;
use error::AppError;
use event::{
    create_event, delete_all_events, delete_event, download_image, get_event, get_events,
    update_event,
};
use naver::NaverClient;
use storage::Storage;
use user::{naver_callback, signin, signup};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Everything a handler may need, built once from [`Config`].
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub storage: Storage,
    pub naver: NaverClient,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(config: &Config, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(AppState {
            pool,
            storage: Storage::new(&config.storage)?,
            naver: NaverClient::new(&config.naver)?,
            tokens: TokenIssuer::new(&config.secret_key),
        })
    }
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/signin", post(signin))
        .route("/users/auth/naver/callback", get(naver_callback))
        .route(
            "/events/",
            get(get_events).post(create_event).delete(delete_all_events),
        )
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/download/{id}", get(download_image))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(message = "skipping invalid CORS origin", origin = %origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
