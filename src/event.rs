use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{prelude::FromRow, query, query_as, query_scalar, types::Json as JsonColumn, SqliteConnection};
use tracing::{error, info, warn};

use crate::{
    auth::AuthenticatedUser,
    db::Session,
    error::AppError,
    utils::{event_image_key, found},
    AppState,
};

#[derive(FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub tags: JsonColumn<Vec<String>>,
    pub location: String,
    pub image: Option<String>,
    pub user_id: Option<i64>,
}

/// Fields a client supplies when creating an event. The image and owner are
/// filled in by the server.
#[derive(Deserialize, Debug)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: String,
}

/// Partial update; absent fields keep their stored value.
#[derive(Deserialize, Debug, Default)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
    pub image: Option<String>,
}

impl EventUpdate {
    pub fn apply(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(tags) = self.tags {
            event.tags = JsonColumn(tags);
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(image) = self.image {
            event.image = Some(image);
        }
    }
}

struct ImagePart {
    filename: Option<String>,
    content_type: String,
    data: Vec<u8>,
}

fn event_not_found() -> AppError {
    AppError::Text(StatusCode::NOT_FOUND, "Event not found".to_string())
}

async fn find_event(conn: &mut SqliteConnection, id: i64) -> Result<Option<Event>, AppError> {
    Ok(query_as::<_, Event>(
        "
            SELECT id, title, description, tags, location, image, user_id
            FROM events
            WHERE id = ?1;
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?)
}

#[tracing::instrument(skip_all)]
pub async fn get_events(mut session: Session) -> Result<Json<Vec<Event>>, AppError> {
    let events = query_as::<_, Event>(
        "SELECT id, title, description, tags, location, image, user_id FROM events ORDER BY id;",
    )
    .fetch_all(&mut *session)
    .await?;

    info!(message = "load event list", number_of_events = events.len());

    Ok(Json(events))
}

#[tracing::instrument(skip_all, fields( id = %id ))]
pub async fn get_event(
    mut session: Session,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<Event>, AppError> {
    match find_event(&mut session, id).await? {
        Some(event) => Ok(Json(event)),
        None => {
            warn!(message = "event doesn't exist");
            Err(event_not_found())
        }
    }
}

#[tracing::instrument(skip_all, fields( user_id = %user.id ))]
pub async fn create_event(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    mut session: Session,
    WithRejection(mut multipart, _): WithRejection<Multipart, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut data: Option<String> = None;
    let mut image: Option<ImagePart> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("data") => {
                data = Some(field.text().await?);
            }
            Some("image") => {
                let filename = field.file_name().map(String::from);
                let content_type = match field.content_type() {
                    Some(content_type) => content_type.to_string(),
                    None => mime_guess::from_path(filename.as_deref().unwrap_or_default())
                        .first_or_octet_stream()
                        .to_string(),
                };
                let data = field.bytes().await?;

                image = Some(ImagePart {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => {
                warn!(message = "ignoring unexpected multipart field", field = ?other);
            }
        }
    }

    let Some(data) = data else {
        error!(message = "missing data field in multipart body");
        return Err(AppError::Text(
            StatusCode::BAD_REQUEST,
            "Missing form field: data".to_string(),
        ));
    };

    let Some(image) = image else {
        error!(message = "missing image field in multipart body");
        return Err(AppError::Text(
            StatusCode::BAD_REQUEST,
            "Missing file field: image".to_string(),
        ));
    };

    let new_event = match serde_json::from_str::<NewEvent>(&data) {
        Ok(new_event) => new_event,
        Err(e) => {
            error!(message = "malformed event data", error = %e);
            return Err(AppError::Text(
                StatusCode::BAD_REQUEST,
                format!("Invalid event data: {e}"),
            ));
        }
    };

    let key = event_image_key(image.filename.as_deref());

    info!(message = "uploading image", key = %key, filename = ?image.filename);

    state
        .storage
        .upload(&key, image.data, &image.content_type)
        .await?;

    let image_url = state.storage.public_url(&key);

    // No compensating delete: the object stays behind if the insert fails.
    let event_id = query_scalar::<_, i64>(
        "
            INSERT INTO events (title, description, tags, location, image, user_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id;
        ",
    )
    .bind(new_event.title)
    .bind(new_event.description)
    .bind(JsonColumn(new_event.tags))
    .bind(new_event.location)
    .bind(&image_url)
    .bind(user.id)
    .fetch_one(&mut *session)
    .await
    .map_err(|e| {
        error!(message = "failed to store event, image left orphaned", key = %key, error = %e);
        AppError::Text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store event: {e}"),
        )
    })?;

    info!(message = "event created", event_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Event created",
            "event_id": event_id,
        })),
    ))
}

#[tracing::instrument(skip_all, fields( id = %id ))]
pub async fn update_event(
    mut session: Session,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(update), _): WithRejection<Json<EventUpdate>, AppError>,
) -> Result<Json<Event>, AppError> {
    let Some(mut event) = find_event(&mut session, id).await? else {
        warn!(message = "event doesn't exist");
        return Err(event_not_found());
    };

    update.apply(&mut event);

    query(
        "
            UPDATE events
            SET title = ?1, description = ?2, tags = ?3, location = ?4, image = ?5
            WHERE id = ?6;
        ",
    )
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.tags)
    .bind(&event.location)
    .bind(&event.image)
    .bind(event.id)
    .execute(&mut *session)
    .await?;

    info!(message = "event updated");

    Ok(Json(event))
}

#[tracing::instrument(skip_all, fields( id = %id ))]
pub async fn delete_event(
    mut session: Session,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<Value>, AppError> {
    let result = query("DELETE FROM events WHERE id = ?1;")
        .bind(id)
        .execute(&mut *session)
        .await?;

    if result.rows_affected() == 0 {
        warn!(message = "event doesn't exist");
        return Err(event_not_found());
    }

    info!(message = "event deleted");

    Ok(Json(json!({ "message": "Event deleted" })))
}

#[tracing::instrument(skip_all)]
pub async fn delete_all_events(mut session: Session) -> Result<Json<Value>, AppError> {
    let result = query("DELETE FROM events;").execute(&mut *session).await?;

    info!(message = "all events deleted", deleted = result.rows_affected());

    Ok(Json(json!({ "message": "All events deleted" })))
}

#[tracing::instrument(skip_all, fields( id = %id ))]
pub async fn download_image(
    mut session: Session,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Response, AppError> {
    let image = find_event(&mut session, id)
        .await?
        .and_then(|event| event.image)
        .filter(|image| !image.is_empty());

    match image {
        Some(url) => Ok(found(&url)),
        None => {
            warn!(message = "event or image doesn't exist");
            Err(AppError::Text(
                StatusCode::NOT_FOUND,
                "Event or image not found".to_string(),
            ))
        }
    }
}
