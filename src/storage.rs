use std::fmt;

use axum::http::StatusCode;
use reqwest::{header::CONTENT_TYPE, Client};
use s3::{creds::Credentials, Bucket, Region};
use tracing::{error, info};

use crate::{config::StorageConfig, error::AppError};

const UPLOAD_LINK_TIMEOUT_SEC: u32 = 600;

/// Object store holding event images.
#[derive(Clone)]
pub struct Storage {
    bucket: Bucket,
    client: Client,
    public_base: String,
}

// `Bucket`'s own Debug prints its credentials.
impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("bucket", &self.bucket.name)
            .field("region", &self.bucket.region.to_string())
            .field("public_base", &self.public_base)
            .finish()
    }
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Result<Self, AppError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )?;

        let bucket = match &config.endpoint {
            Some(endpoint) => {
                let region = Region::Custom {
                    region: config.region.clone(),
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                };
                Bucket::new(&config.bucket, region, credentials)?.with_path_style()
            }
            None => {
                let region = Region::Custom {
                    region: config.region.clone(),
                    endpoint: format!("https://s3.{}.amazonaws.com", config.region),
                };
                Bucket::new(&config.bucket, region, credentials)?
            }
        };

        let public_base = match &config.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                config.bucket, config.region
            ),
        };

        let client = Client::builder().timeout(config.upload_timeout).build()?;

        Ok(Self {
            bucket,
            client,
            public_base,
        })
    }

    /// Publicly reachable URL of the object stored under `key`.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        let url = self
            .bucket
            .presign_put(format!("/{}", key), UPLOAD_LINK_TIMEOUT_SEC, None)?;

        let response = match self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(message = "failed to upload image", error = ?e);
                return Err(AppError::Text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Image upload failed: {e}"),
                ));
            }
        };

        if !response.status().is_success() {
            error!(message = "object store rejected upload", status = %response.status());
            return Err(AppError::Text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Image upload failed with status {}", response.status()),
            ));
        }

        info!(message = "uploaded image");

        Ok(())
    }
}
