#![doc = "Contentful writer for the CLI: implements the core DestinationWriter against the Content Management API."]
//
//! # Contentful client
//!
//! [`ContentfulClient`] is the production [`DestinationWriter`]. It talks to
//! two hosts: the management API for entries and assets, and the upload API
//! for raw binaries.
//!
//! ## Client Usage
//!
//! - Construct with [`ContentfulClient::new_from_env`]; the management token
//!   comes from `CONTENTFUL_MANAGEMENT_TOKEN`, the space from the loaded config.
//! - Publishing needs the current entity version, so every publish first
//!   fetches the entity.
//! - Rate-limited requests (HTTP 429) are retried after the delay the API
//!   advertises in `X-Contentful-RateLimit-Reset`, a bounded number of times.
//!   Every other non-success status fails the entity with
//!   [`WriteError::Rejected`].

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use press_migrate_core::contract::{DestinationId, DestinationWriter, NewAsset};
use press_migrate_core::error::{BoxError, WriteError};
use press_migrate_core::fields::link;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::load_config::DestinationSection;

pub const TOKEN_ENV: &str = "CONTENTFUL_MANAGEMENT_TOKEN";

const CONTENT_TYPE_HEADER: &str = "X-Contentful-Content-Type";
const VERSION_HEADER: &str = "X-Contentful-Version";
const RATE_LIMIT_RESET_HEADER: &str = "X-Contentful-RateLimit-Reset";
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

pub struct ContentfulClient {
    http: Client,
    token: String,
    management_url: String,
    upload_url: String,
    space_id: String,
    environment: String,
    locale: String,
    processing_max_attempts: u32,
    processing_interval: Duration,
}

fn transport(e: reqwest::Error) -> WriteError {
    WriteError::Transport(Box::new(e))
}

impl ContentfulClient {
    pub fn new_from_env(section: &DestinationSection, locale: &str) -> Result<Self, BoxError> {
        let token = env::var(TOKEN_ENV).map_err(|e| {
            tracing::error!(error = ?e, "{TOKEN_ENV} missing in environment");
            format!("{TOKEN_ENV} is not set")
        })?;
        let space_id = section
            .require_space_id()
            .map_err(|e| e.to_string())?
            .to_string();

        info!(
            space_id = %space_id,
            environment = %section.environment,
            token_set = !token.is_empty(),
            "Initialized ContentfulClient from environment"
        );
        Ok(Self {
            http: Client::new(),
            token,
            management_url: section.management_url.trim_end_matches('/').to_string(),
            upload_url: section.upload_url.trim_end_matches('/').to_string(),
            space_id,
            environment: section.environment.clone(),
            locale: locale.to_string(),
            processing_max_attempts: section.processing_max_attempts.max(1),
            processing_interval: Duration::from_millis(section.processing_interval_ms),
        })
    }

    fn env_url(&self, path: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}/{}",
            self.management_url, self.space_id, self.environment, path
        )
    }

    /// Sends the request built by `make`, retrying on 429.
    async fn send<F>(&self, make: F) -> Result<Response, WriteError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        loop {
            let resp = make()
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(transport)?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RATE_LIMIT_RETRIES {
                let wait = resp
                    .headers()
                    .get(RATE_LIMIT_RESET_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(1);
                retries += 1;
                warn!(retries, wait_secs = wait, url = %resp.url(), "Rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            if !status.is_success() {
                let url = resp.url().to_string();
                let body = resp.text().await.unwrap_or_default();
                return Err(WriteError::Rejected(format!("{status} from {url}: {body}")));
            }
            return Ok(resp);
        }
    }

    async fn send_json<F>(&self, make: F) -> Result<Value, WriteError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send(make).await?.json().await.map_err(transport)
    }

    async fn version_of(&self, path: &str) -> Result<u64, WriteError> {
        let url = self.env_url(path);
        let body = self.send_json(|| self.http.get(&url)).await?;
        sys_version(&body)
    }

    async fn publish_at(&self, path: &str) -> Result<(), WriteError> {
        let version = self.version_of(path).await?;
        let url = self.env_url(&format!("{path}/published"));
        self.send(|| self.http.put(&url).header(VERSION_HEADER, version))
            .await?;
        Ok(())
    }

    async fn upload(&self, bytes: &[u8]) -> Result<String, WriteError> {
        let url = format!("{}/spaces/{}/uploads", self.upload_url, self.space_id);
        let body = self
            .send_json(|| {
                self.http
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.to_vec())
            })
            .await?;
        sys_id(&body)
    }
}

fn sys_id(body: &Value) -> Result<String, WriteError> {
    body["sys"]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WriteError::Rejected(format!("response without sys.id: {body}")))
}

fn sys_version(body: &Value) -> Result<u64, WriteError> {
    body["sys"]["version"]
        .as_u64()
        .ok_or_else(|| WriteError::Rejected(format!("response without sys.version: {body}")))
}

/// `fields` for a new asset pointing at an upload.
pub fn asset_fields(asset: &NewAsset, upload_id: &str, locale: &str) -> Value {
    let mut fields = json!({
        "title": { locale: asset.title },
        "file": {
            locale: {
                "contentType": asset.content_type,
                "fileName": asset.file_name,
                "uploadFrom": link("Upload", upload_id),
            }
        }
    });
    if let Some(description) = &asset.description {
        fields["description"] = json!({ locale: description });
    }
    fields
}

#[async_trait]
impl DestinationWriter for ContentfulClient {
    async fn create_entity(
        &self,
        content_type: &str,
        fields: Value,
    ) -> Result<DestinationId, WriteError> {
        let url = self.env_url("entries");
        let payload = json!({ "fields": fields });
        let body = self
            .send_json(|| {
                self.http
                    .post(&url)
                    .header(CONTENT_TYPE_HEADER, content_type)
                    .json(&payload)
            })
            .await?;
        let id = sys_id(&body)?;
        debug!(content_type, entry_id = %id, "Created entry");
        Ok(id)
    }

    async fn publish(&self, id: &str) -> Result<(), WriteError> {
        self.publish_at(&format!("entries/{id}")).await?;
        debug!(entry_id = %id, "Published entry");
        Ok(())
    }

    async fn create_asset(&self, asset: NewAsset) -> Result<DestinationId, WriteError> {
        let upload_id = self.upload(&asset.bytes).await?;
        debug!(upload_id = %upload_id, file_name = %asset.file_name, "[ASSETS] Uploaded binary");

        let url = self.env_url("assets");
        let payload = json!({ "fields": asset_fields(&asset, &upload_id, &self.locale) });
        let body = self
            .send_json(|| self.http.post(&url).json(&payload))
            .await?;
        let id = sys_id(&body)?;
        let version = sys_version(&body)?;

        let process_url = self.env_url(&format!("assets/{id}/files/{}/process", self.locale));
        self.send(|| self.http.put(&process_url).header(VERSION_HEADER, version))
            .await?;
        debug!(asset_id = %id, "[ASSETS] Processing started");
        Ok(id)
    }

    async fn wait_until_processed(&self, id: &str) -> Result<(), WriteError> {
        let url = self.env_url(&format!("assets/{id}"));
        for attempt in 1..=self.processing_max_attempts {
            let body = self.send_json(|| self.http.get(&url)).await?;
            if body["fields"]["file"][&self.locale]["url"].is_string() {
                debug!(asset_id = %id, attempt, "[ASSETS] Asset processed");
                return Ok(());
            }
            if attempt < self.processing_max_attempts {
                tokio::time::sleep(self.processing_interval).await;
            }
        }
        Err(WriteError::ProcessingTimeout {
            asset_id: id.to_string(),
            attempts: self.processing_max_attempts,
        })
    }

    async fn publish_asset(&self, id: &str) -> Result<(), WriteError> {
        self.publish_at(&format!("assets/{id}")).await?;
        debug!(asset_id = %id, "[ASSETS] Published asset");
        Ok(())
    }
}
