use std::{env, fmt, time::Duration};

use thiserror::Error;

pub const DEFAULT_BUCKET: &str = "mini3bucket-crcl";
pub const DEFAULT_REGION: &str = "ap-northeast-2";
pub const NAVER_TOKEN_URL: &str = "https://nid.naver.com/oauth2.0/token";
pub const NAVER_PROFILE_URL: &str = "https://openapi.naver.com/v1/nid/me";
const DEFAULT_CLIENT_CALLBACK_URL: &str = "http://localhost:5173/naver/callback";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://localhost";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPLOAD_TIMEOUT_SEC: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Custom S3-compatible endpoint, addressed path style.
    pub endpoint: Option<String>,
    /// Overrides the default `https://{bucket}.s3.{region}.amazonaws.com` base.
    pub public_url: Option<String>,
    pub upload_timeout: Duration,
}

#[derive(Clone)]
pub struct NaverConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_url: String,
    pub profile_url: String,
    /// Where the browser lands after a successful login.
    pub client_callback_url: String,
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &REDACTED)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .field("upload_timeout", &self.upload_timeout)
            .finish()
    }
}

impl fmt::Debug for NaverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NaverConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .field("client_callback_url", &self.client_callback_url)
            .finish()
    }
}

/// Application configuration, built once at startup and handed to each
/// component that needs it.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub storage: StorageConfig,
    pub naver: NaverConfig,
    pub allowed_origins: Vec<String>,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("secret_key", &REDACTED)
            .field("storage", &self.storage)
            .field("naver", &self.naver)
            .field("allowed_origins", &self.allowed_origins)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Reads configuration from the process environment, after loading `.env`
    /// if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let upload_timeout = match optional("S3_UPLOAD_TIMEOUT_SEC") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    name: "S3_UPLOAD_TIMEOUT_SEC",
                    value,
                })?,
            None => DEFAULT_UPLOAD_TIMEOUT_SEC,
        };

        let port = match optional("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            secret_key: required("SECRET_KEY")?,
            storage: StorageConfig {
                access_key: required("AWS_ACCESS_KEY_ID")?,
                secret_key: required("AWS_SECRET_ACCESS_KEY")?,
                bucket: optional("S3_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                region: optional("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint: optional("S3_ENDPOINT"),
                public_url: optional("S3_PUBLIC_URL"),
                upload_timeout: Duration::from_secs(upload_timeout),
            },
            naver: NaverConfig {
                client_id: required("NAVER_CLIENT_ID")?,
                client_secret: required("NAVER_CLIENT_SECRET")?,
                redirect_uri: required("NAVER_REDIRECT_URI")?,
                token_url: optional("NAVER_TOKEN_URL")
                    .unwrap_or_else(|| NAVER_TOKEN_URL.to_string()),
                profile_url: optional("NAVER_PROFILE_URL")
                    .unwrap_or_else(|| NAVER_PROFILE_URL.to_string()),
                client_callback_url: optional("CLIENT_CALLBACK_URL")
                    .unwrap_or_else(|| DEFAULT_CLIENT_CALLBACK_URL.to_string()),
            },
            allowed_origins: parse_origins(
                &optional("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            port,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}
