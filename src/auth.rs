use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use bcrypt::{hash, verify};
use jiff::Timestamp;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tracing::{error, warn};

use crate::{error::AppError, AppState};

const BCRYPT_COST: u32 = 12;
const TOKEN_TTL_SEC: i64 = 3600;

/// Hashes on the blocking pool; bcrypt at this cost takes hundreds of
/// milliseconds of CPU.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    Ok(spawn_blocking(move || hash(password, BCRYPT_COST)).await??)
}

/// Checks a password against a stored digest. Anything other than a clean
/// match is `false`, including the empty digest of social-only accounts.
pub async fn verify_password(password: &str, digest: &str) -> bool {
    if digest.is_empty() {
        return false;
    }

    let password = password.to_string();
    let digest = digest.to_string();

    match spawn_blocking(move || verify(password, &digest)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            warn!(message = "stored password digest is unreadable", error = %e);
            false
        }
        Err(e) => {
            error!(message = "password check task failed", error = %e);
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Email of the subject.
    pub user: String,
    pub user_id: i64,
    pub exp: i64,
}

/// Signs and checks HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, email: &str, user_id: i64) -> Result<String, AppError> {
        let claims = Claims {
            user: email.to_string(),
            user_id,
            exp: Timestamp::now().as_second() + TOKEN_TTL_SEC,
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

/// The caller identified by a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    #[tracing::instrument(skip_all)]
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        else {
            error!(message = "Missing bearer token");
            return Err(AppError::Text(
                StatusCode::UNAUTHORIZED,
                "Not authenticated".to_string(),
            ));
        };

        let claims = state.tokens.verify(bearer.token())?;

        Ok(AuthenticatedUser {
            id: claims.user_id,
            email: claims.user,
        })
    }
}
