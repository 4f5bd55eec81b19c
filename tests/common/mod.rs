#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::Query,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use eventboard::{
    auth::TokenIssuer,
    config::{Config, NaverConfig, StorageConfig},
    db, router, AppState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;

pub const PUBLIC_URL: &str = "http://images.test";
pub const CLIENT_CALLBACK_URL: &str = "http://app.test/naver/callback";
pub const BOUNDARY: &str = "eventboard-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub tokens: TokenIssuer,
    /// Paths of every object PUT to the fake object store.
    pub uploads: Arc<Mutex<Vec<String>>>,
}

impl TestApp {
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// Inserts a password-less user and returns its id with a valid token.
    pub async fn user(&self, email: &str) -> (i64, String) {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, username, password) VALUES (?1, ?2, '') RETURNING id",
        )
        .bind(email)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .unwrap();

        (id, self.tokens.issue(email, id).unwrap())
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_store(StatusCode::OK).await
}

/// Builds the app against fake object-store and Naver servers. Every upload
/// is answered with `store_status`.
pub async fn spawn_app_with_store(store_status: StatusCode) -> TestApp {
    let uploads = Arc::new(Mutex::new(Vec::new()));
    let store_url = serve(fake_store(uploads.clone(), store_status)).await;
    let naver_url = serve(fake_naver()).await;

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        secret_key: "test-secret".to_string(),
        storage: StorageConfig {
            access_key: "test-access".to_string(),
            secret_key: "test-secret".to_string(),
            bucket: "test-bucket".to_string(),
            region: "ap-northeast-2".to_string(),
            endpoint: Some(store_url),
            public_url: Some(PUBLIC_URL.to_string()),
            upload_timeout: Duration::from_secs(5),
        },
        naver: NaverConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8000/users/auth/naver/callback".to_string(),
            token_url: format!("{naver_url}/oauth2.0/token"),
            profile_url: format!("{naver_url}/v1/nid/me"),
            client_callback_url: CLIENT_CALLBACK_URL.to_string(),
        },
        allowed_origins: vec!["http://localhost:5173".to_string()],
        port: 0,
    };

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open database");
    db::conn(&pool).await.expect("Failed to create tables");

    let state = AppState::new(&config, pool.clone()).expect("Failed to build app state");

    TestApp {
        router: router(state, &config.allowed_origins),
        pool,
        tokens: TokenIssuer::new(&config.secret_key),
        uploads,
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn fake_store(uploads: Arc<Mutex<Vec<String>>>, status: StatusCode) -> Router {
    Router::new().fallback(move |method: Method, uri: Uri, _body: Bytes| {
        let uploads = uploads.clone();
        async move {
            if method == Method::PUT && status.is_success() {
                uploads.lock().unwrap().push(uri.path().to_string());
            }
            status
        }
    })
}

/// Naver stand-in. The authorization code decides the outcome: `bad` fails
/// the token request, `empty` yields no token, `fail` yields a provider error
/// code; anything else logs in as `<code>@naver.test`.
fn fake_naver() -> Router {
    Router::new()
        .route("/oauth2.0/token", get(naver_token))
        .route("/v1/nid/me", get(naver_profile))
}

async fn naver_token(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("grant_type").map(String::as_str) != Some("authorization_code")
        || params.get("client_secret").map(String::as_str) != Some("client-secret")
        || params.get("state").is_none()
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match params.get("code").map(String::as_str) {
        Some("bad") => StatusCode::UNAUTHORIZED.into_response(),
        Some("empty") => Json(json!({ "error": "invalid_request" })).into_response(),
        Some(code) => Json(json!({
            "access_token": format!("token-{code}"),
            "token_type": "bearer",
        }))
        .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn naver_profile(headers: HeaderMap) -> Response {
    let Some(code) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer token-"))
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if code == "fail" {
        return Json(json!({ "resultcode": "024", "message": "Authentication failed" }))
            .into_response();
    }

    Json(json!({
        "resultcode": "00",
        "message": "success",
        "response": {
            "id": format!("id-{code}"),
            "email": format!("{code}@naver.test"),
            "nickname": code,
        }
    }))
    .into_response()
}

pub async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn data_part(body: &mut Vec<u8>, data: &str) {
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data\"\r\n\r\n{data}\r\n")
            .as_bytes(),
    );
}

fn image_part(body: &mut Vec<u8>, filename: &str, bytes: &[u8]) {
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
}

fn closing(mut body: Vec<u8>) -> Body {
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

/// A multipart body with an optional `data` text part and an optional
/// `image` file part.
pub fn multipart_body(data: Option<&str>, image: Option<(&str, &[u8])>) -> Body {
    let mut body = Vec::new();

    if let Some(data) = data {
        data_part(&mut body, data);
    }

    if let Some((filename, bytes)) = image {
        image_part(&mut body, filename, bytes);
    }

    closing(body)
}

/// Same parts as `multipart_body`, with the file sent ahead of the data.
pub fn multipart_body_image_first(data: &str, filename: &str, bytes: &[u8]) -> Body {
    let mut body = Vec::new();
    image_part(&mut body, filename, bytes);
    data_part(&mut body, data);
    closing(body)
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
