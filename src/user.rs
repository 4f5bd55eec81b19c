use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
    Form, Json,
};
use axum_extra::extract::WithRejection;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{prelude::FromRow, query, query_as, SqliteConnection};
use tracing::{error, info};

use crate::{
    auth::{hash_password, verify_password},
    db::Session,
    error::AppError,
    utils::found,
    AppState,
};

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Password-grant form. Only the credentials are read; `grant_type`, `scope`
/// and client fields are accepted and ignored.
#[derive(Deserialize)]
pub struct SigninForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>, AppError> {
    Ok(
        query_as::<_, User>("SELECT id, email, username, password FROM users WHERE email = ?1;")
            .bind(email)
            .fetch_optional(conn)
            .await?,
    )
}

fn email_taken() -> AppError {
    AppError::Text(
        StatusCode::CONFLICT,
        "A user with this email already exists".to_string(),
    )
}

/// Inserts a password account. A concurrent signup that won the race on the
/// `email` unique index surfaces as a conflict, like the upfront check.
async fn insert_user(
    conn: &mut SqliteConnection,
    email: &str,
    username: &str,
    digest: &str,
) -> Result<User, AppError> {
    query_as::<_, User>(
        "INSERT INTO users (email, username, password) VALUES (?1, ?2, ?3) RETURNING id, email, username, password;",
    )
    .bind(email)
    .bind(username)
    .bind(digest)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            error!(message = "Account already exists");
            email_taken()
        }
        other => other.into(),
    })
}

#[tracing::instrument(skip_all, fields( email = %account.email ))]
pub async fn signup(
    mut session: Session,
    WithRejection(Json(account), _): WithRejection<Json<SignupRequest>, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if find_by_email(&mut session, &account.email).await?.is_some() {
        error!(message = "Account already exists");
        return Err(email_taken());
    }

    let password = hash_password(&account.password).await?;

    let user = insert_user(&mut session, &account.email, &account.username, &password).await?;

    info!(message = "Account signed up", user_id = user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered",
            "user": user,
        })),
    ))
}

#[tracing::instrument(skip_all, fields( email = %form.username ))]
pub async fn signin(
    State(state): State<AppState>,
    mut session: Session,
    WithRejection(Form(form), _): WithRejection<Form<SigninForm>, AppError>,
) -> Result<Json<Value>, AppError> {
    let Some(user) = find_by_email(&mut session, &form.username).await? else {
        error!(message = "Account doesn't exist");
        return Err(AppError::Text(
            StatusCode::NOT_FOUND,
            "User not found".to_string(),
        ));
    };

    if !verify_password(&form.password, &user.password).await {
        error!(message = "Password doesn't match");
        return Err(AppError::Text(
            StatusCode::UNAUTHORIZED,
            "Password does not match".to_string(),
        ));
    }

    let access_token = state.tokens.issue(&user.email, user.id)?;

    info!(message = "Account logged in");

    Ok(Json(json!({
        "message": "Signed in",
        "username": user.username,
        "access_token": access_token,
        "token_type": "bearer",
    })))
}

/// Completes a Naver login: exchanges the code, reads the profile, registers
/// the account on first sight and hands a token back to the browser app.
#[tracing::instrument(skip_all)]
pub async fn naver_callback(
    State(state): State<AppState>,
    mut session: Session,
    WithRejection(Query(params), _): WithRejection<Query<CallbackParams>, AppError>,
) -> Result<Response, AppError> {
    let access_token = state.naver.exchange_code(&params.code, &params.state).await?;
    let profile = state.naver.fetch_profile(&access_token).await?;

    let inserted = query(
        "INSERT INTO users (email, username, password) VALUES (?1, ?2, '') ON CONFLICT (email) DO NOTHING;",
    )
    .bind(&profile.email)
    .bind(&profile.username)
    .execute(&mut *session)
    .await?;

    if inserted.rows_affected() > 0 {
        info!(message = "Registered account from Naver profile", email = %profile.email);
    }

    let Some(user) = find_by_email(&mut session, &profile.email).await? else {
        error!(message = "Account missing after registration");
        return Err(AppError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    };

    let token = state.tokens.issue(&user.email, user.id)?;

    let redirect = Url::parse_with_params(
        state.naver.client_callback_url(),
        &[("token", token.as_str()), ("username", user.username.as_str())],
    )
    .map_err(|e| {
        error!(message = "Invalid client callback URL", error = %e);
        AppError::Status(StatusCode::INTERNAL_SERVER_ERROR)
    })?;

    info!(message = "Account logged in with Naver", user_id = user.id);

    Ok(found(redirect.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn racing_insert_is_a_conflict() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        db::conn(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        insert_user(&mut conn, "a@x.com", "a", "digest").await.unwrap();

        // Skips the lookup, as a second request would that read before the
        // first one committed.
        let err = insert_user(&mut conn, "a@x.com", "b", "digest")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
