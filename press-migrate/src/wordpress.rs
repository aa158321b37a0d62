//! # WordPress source: live REST client and on-disk export
//!
//! [`WordPressClient`] pages through `/wp-json/wp/v2/<endpoint>` for every
//! family. `export` writes each family's raw REST objects to
//! `<export_dir>/<endpoint>.json`; [`ExportReader`] reads those files back so
//! the migration phases always work from one stable snapshot.
//!
//! Raw objects are normalised into [`SourceEntity`] by [`normalize`]:
//! rendered fields (`title.rendered`, `content.rendered`, …) are unwrapped,
//! everything else is copied as-is. HTML is left for the core to sanitize.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use press_migrate_core::contract::SourceReader;
use press_migrate_core::error::BoxError;
use press_migrate_core::source::{Family, SourceEntity, SourceId};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::load_config::SourceSection;

const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";

/// Raw objects exported for one family.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFamily {
    pub family: Family,
    pub path: PathBuf,
    pub count: usize,
}

pub struct WordPressClient {
    http: Client,
    api_root: String,
    per_page: u32,
    auth: Option<(String, String)>,
}

impl WordPressClient {
    /// Builds a client for the configured site. `WP_USERNAME` and
    /// `WP_APP_PASSWORD` enable basic auth when both are set.
    pub fn new(section: &SourceSection) -> Self {
        let auth = match (env::var("WP_USERNAME"), env::var("WP_APP_PASSWORD")) {
            (Ok(user), Ok(password)) => Some((user, password)),
            _ => None,
        };
        info!(
            base_url = %section.base_url,
            per_page = section.per_page,
            authenticated = auth.is_some(),
            "Initialized WordPressClient"
        );
        Self {
            http: Client::new(),
            api_root: format!("{}/wp-json/wp/v2", section.base_url.trim_end_matches('/')),
            per_page: section.per_page.clamp(1, 100),
            auth,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.auth {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    /// Every raw object of a family, following `X-WP-TotalPages`.
    pub async fn list_raw(&self, family: Family) -> Result<Vec<Value>, BoxError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/{}?per_page={}&page={}",
                self.api_root,
                family.endpoint(),
                self.per_page,
                page
            );
            debug!(%url, "[EXPORT] Fetching page");
            let resp = self.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                error!(%status, %url, "[EXPORT][ERROR] WordPress API returned error");
                return Err(format!("GET {url} returned {status}: {body}").into());
            }

            let total_pages = resp
                .headers()
                .get(TOTAL_PAGES_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let batch: Vec<Value> = resp.json().await?;
            let size = batch.len();
            items.extend(batch);

            let last = match total_pages {
                Some(total) => page >= total,
                None => size < self.per_page as usize,
            };
            if last || size == 0 {
                break;
            }
            page += 1;
        }
        info!(%family, count = items.len(), "[EXPORT] Listed family");
        Ok(items)
    }

    /// Writes one JSON file per family into `export_dir`.
    pub async fn export(&self, export_dir: &Path) -> Result<Vec<ExportedFamily>> {
        fs::create_dir_all(export_dir)
            .with_context(|| format!("Failed to create export directory {}", export_dir.display()))?;

        let mut exported = Vec::new();
        for family in Family::ALL {
            let items = self
                .list_raw(family)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to export {family}: {e}"))?;
            let path = export_path(export_dir, family);
            let json = serde_json::to_string_pretty(&items)?;
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(%family, path = %path.display(), count = items.len(), "[EXPORT] Wrote family");
            exported.push(ExportedFamily {
                family,
                path,
                count: items.len(),
            });
        }
        Ok(exported)
    }
}

#[async_trait]
impl SourceReader for WordPressClient {
    async fn list_entities(&self, family: Family) -> Result<Vec<SourceEntity>, BoxError> {
        Ok(normalize_all(family, &self.list_raw(family).await?))
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, BoxError> {
        download(&self.http, url).await
    }
}

/// Reads a previous export. Media binaries are still fetched over HTTP.
pub struct ExportReader {
    dir: PathBuf,
    http: Client,
}

impl ExportReader {
    /// Fails when the export directory does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            error!(path = %dir.display(), "[EXPORT][ERROR] Export directory missing");
            anyhow::bail!(
                "export directory {} does not exist; run `press-migrate export` first",
                dir.display()
            );
        }
        info!(path = %dir.display(), "Using export directory");
        Ok(Self {
            dir,
            http: Client::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SourceReader for ExportReader {
    async fn list_entities(&self, family: Family) -> Result<Vec<SourceEntity>, BoxError> {
        let path = export_path(&self.dir, family);
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let items: Vec<Value> = serde_json::from_str(&raw)
            .map_err(|e| format!("{} is not a JSON array: {e}", path.display()))?;
        debug!(%family, path = %path.display(), count = items.len(), "Read export file");
        Ok(normalize_all(family, &items))
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, BoxError> {
        download(&self.http, url).await
    }
}

pub fn export_path(dir: &Path, family: Family) -> PathBuf {
    dir.join(format!("{}.json", family.endpoint()))
}

async fn download(http: &Client, url: &str) -> Result<Vec<u8>, BoxError> {
    debug!(%url, "[ASSETS] Downloading media");
    let resp = http.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

fn normalize_all(family: Family, items: &[Value]) -> Vec<SourceEntity> {
    items
        .iter()
        .filter_map(|item| {
            let entity = normalize(family, item);
            if entity.is_none() {
                error!(%family, "Skipping export object without a numeric id");
            }
            entity
        })
        .collect()
}

/// `obj[key].rendered` when present, else `obj[key]` when it is a string.
fn rendered(obj: &Value, key: &str) -> Option<String> {
    let field = obj.get(key)?;
    field
        .get("rendered")
        .and_then(Value::as_str)
        .or_else(|| field.as_str())
        .map(str::to_string)
}

fn string(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn id(obj: &Value, key: &str) -> Option<SourceId> {
    obj.get(key).and_then(Value::as_u64)
}

fn ids(obj: &Value, key: &str) -> Vec<SourceId> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

/// Maps one REST object onto [`SourceEntity`]. `None` without an id.
pub fn normalize(family: Family, obj: &Value) -> Option<SourceEntity> {
    let entity_id = id(obj, "id")?;
    let title = rendered(obj, "title")
        .or_else(|| string(obj, "name"))
        .unwrap_or_default();

    let mut entity = SourceEntity {
        slug: string(obj, "slug").unwrap_or_default(),
        date: string(obj, "date"),
        modified: string(obj, "modified"),
        ..SourceEntity::new(entity_id, title)
    };

    match family {
        Family::Authors | Family::Tags | Family::Categories => {
            entity.description = rendered(obj, "description").filter(|d| !d.is_empty());
            entity.parent = id(obj, "parent");
        }
        Family::Media => {
            entity.source_url = string(obj, "source_url");
            entity.mime_type = string(obj, "mime_type");
            entity.alt_text = string(obj, "alt_text").filter(|a| !a.is_empty());
            entity.caption = rendered(obj, "caption").filter(|c| !c.trim().is_empty());
            entity.description = rendered(obj, "description").filter(|d| !d.trim().is_empty());
        }
        Family::Posts | Family::Pages => {
            entity.body = rendered(obj, "content");
            entity.excerpt = rendered(obj, "excerpt").filter(|e| !e.trim().is_empty());
            entity.author = id(obj, "author").filter(|a| *a != 0);
            entity.featured_media = id(obj, "featured_media").filter(|m| *m != 0);
            entity.parent = id(obj, "parent");
            entity.categories = ids(obj, "categories");
            entity.tags = ids(obj, "tags");
        }
    }
    Some(entity)
}
