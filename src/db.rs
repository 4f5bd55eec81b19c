use std::{
    ops::{Deref, DerefMut},
    str::FromStr,
};

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqliteConnection, SqlitePool,
};
use tracing::info;

use crate::{error::AppError, AppState};

const MAX_CONNECTIONS: u32 = 16;

/// Opens the connection pool. In-memory databases live as long as their
/// connection, so they are pinned to a single connection that never expires.
#[tracing::instrument(skip_all)]
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?
    };

    info!(message = "Connected to DB");

    Ok(pool)
}

/// Creates any missing tables. Safe to run on every startup.
#[tracing::instrument(skip_all)]
pub async fn conn(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;

    info!(message = "Migrations applied");

    Ok(())
}

/// A unit of work bound to one request. The connection goes back to the pool
/// when the handler drops it, whichever way the handler exits.
pub struct Session(PoolConnection<Sqlite>);

impl Session {
    pub async fn acquire(pool: &SqlitePool) -> Result<Self, AppError> {
        Ok(Session(pool.acquire().await?))
    }
}

impl Deref for Session {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Session::acquire(&state.pool).await
    }
}
