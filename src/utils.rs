use std::path::Path;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rand::distributions::Alphanumeric;
use rand::Rng;

const OBJECT_NAME_LENGTH: usize = 32;
const EVENT_IMAGE_PREFIX: &str = "events";

/// Get a random object name for s3 bucket
pub fn get_object_name() -> String {
    rand::rngs::OsRng
        .sample_iter(&Alphanumeric)
        .take(OBJECT_NAME_LENGTH)
        .map(char::from)
        .collect::<String>()
}

/// Object key for an uploaded event image, keeping the client's extension.
pub fn event_image_key(filename: Option<&str>) -> String {
    let extension = filename
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    format!("{}/{}{}", EVENT_IMAGE_PREFIX, get_object_name(), extension)
}

/// `302 Found` pointing at `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
