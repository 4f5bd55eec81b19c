use std::time::Duration;

use axum::http::StatusCode;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::{config::NaverConfig, error::AppError};

const PROVIDER_TIMEOUT_SEC: u64 = 10;
const PROFILE_OK: &str = "00";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    resultcode: String,
    message: Option<String>,
    response: Option<ProfileBody>,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    email: Option<String>,
    nickname: Option<String>,
    name: Option<String>,
}

/// Identity of a Naver account as needed for login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaverProfile {
    pub email: String,
    pub username: String,
}

/// Authorization-code client for Naver login.
#[derive(Clone, Debug)]
pub struct NaverClient {
    config: NaverConfig,
    http_client: Client,
}

impl NaverClient {
    pub fn new(config: &NaverConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SEC))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    pub fn client_callback_url(&self) -> &str {
        &self.config.client_callback_url
    }

    /// Trades an authorization code for an access token.
    // TODO: Naver accepts POST bodies on the token endpoint; move the client
    // secret out of the query string.
    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<String, AppError> {
        let response = self
            .http_client
            .get(&self.config.token_url)
            .query(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("state", state),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            error!(message = "token request failed", status = %response.status());
            return Err(AppError::Text(
                upstream_status(response.status()),
                "Access token request failed".to_string(),
            ));
        }

        let token: TokenResponse = response.json().await?;

        match token.access_token {
            Some(access_token) if !access_token.is_empty() => {
                info!(message = "obtained access token");
                Ok(access_token)
            }
            _ => {
                error!(
                    message = "token response without access token",
                    error = ?token.error,
                    description = ?token.error_description,
                );
                Err(AppError::Text(
                    StatusCode::BAD_GATEWAY,
                    "Failed to obtain access token".to_string(),
                ))
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn fetch_profile(&self, access_token: &str) -> Result<NaverProfile, AppError> {
        let response = self
            .http_client
            .get(&self.config.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(message = "profile request failed", status = %response.status());
            return Err(AppError::Text(
                upstream_status(response.status()),
                "Profile request failed".to_string(),
            ));
        }

        let profile: ProfileResponse = response.json().await?;

        if profile.resultcode != PROFILE_OK {
            error!(
                message = "provider reported failure",
                resultcode = %profile.resultcode,
                provider_message = ?profile.message,
            );
            return Err(AppError::Text(
                StatusCode::BAD_GATEWAY,
                "Profile request failed".to_string(),
            ));
        }

        profile.response.and_then(NaverProfile::from_body).ok_or_else(|| {
            error!(message = "profile has no email");
            AppError::Text(
                StatusCode::BAD_GATEWAY,
                "Profile does not include an email".to_string(),
            )
        })
    }
}

impl NaverProfile {
    fn from_body(body: ProfileBody) -> Option<Self> {
        let email = body.email.filter(|e| !e.is_empty())?;
        let username = body
            .nickname
            .or(body.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());

        Some(NaverProfile { email, username })
    }
}

fn upstream_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(email: Option<&str>, nickname: Option<&str>, name: Option<&str>) -> ProfileBody {
        ProfileBody {
            email: email.map(String::from),
            nickname: nickname.map(String::from),
            name: name.map(String::from),
        }
    }

    #[test]
    fn profile_prefers_nickname() {
        let profile = NaverProfile::from_body(body(Some("a@x.com"), Some("nick"), Some("Name")));
        assert_eq!(
            profile,
            Some(NaverProfile {
                email: "a@x.com".into(),
                username: "nick".into()
            })
        );
    }

    #[test]
    fn profile_falls_back_to_name_then_email() {
        let profile = NaverProfile::from_body(body(Some("a@x.com"), None, Some("Name"))).unwrap();
        assert_eq!(profile.username, "Name");

        let profile = NaverProfile::from_body(body(Some("a@x.com"), None, None)).unwrap();
        assert_eq!(profile.username, "a@x.com");
    }

    #[test]
    fn profile_without_email_is_unusable() {
        assert!(NaverProfile::from_body(body(None, Some("nick"), None)).is_none());
        assert!(NaverProfile::from_body(body(Some(""), Some("nick"), None)).is_none());
    }

    #[test]
    fn profile_payload_parses() {
        let raw = r#"{"resultcode":"00","message":"success","response":{"id":"1","email":"a@x.com","nickname":"nick"}}"#;
        let parsed: ProfileResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.resultcode, "00");
        assert_eq!(
            NaverProfile::from_body(parsed.response.unwrap()).unwrap().username,
            "nick"
        );
    }

    #[test]
    fn client_debug_hides_secret() {
        let client = NaverClient::new(&NaverConfig {
            client_id: "naver-id".into(),
            client_secret: "naver-secret-value".into(),
            redirect_uri: "http://localhost/cb".into(),
            token_url: "http://naver.test/token".into(),
            profile_url: "http://naver.test/me".into(),
            client_callback_url: "http://app.test/cb".into(),
        })
        .unwrap();

        let printed = format!("{client:?}");
        assert!(printed.contains("naver-id"));
        assert!(!printed.contains("naver-secret-value"));
    }
}
