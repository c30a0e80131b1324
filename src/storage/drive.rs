//! Google Drive v3 storage backend.
//!
//! Authenticates with a bearer token from `DRIVE_ACCESS_TOKEN`. Queries
//! are rendered into the Drive `q` filter syntax. Transient failures
//! (429, 5xx, network) retry with exponential backoff capped at 2^5
//! seconds; other client errors fail immediately.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::StorageConfig;
use crate::models::{Folder, RemoteFile};

use super::{FileQuery, Storage, FOLDER_MIME};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";

pub struct DriveStorage {
    client: reqwest::Client,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
    name: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    trashed: bool,
}

impl DriveStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if std::env::var("DRIVE_ACCESS_TOKEN").is_err() {
            bail!("DRIVE_ACCESS_TOKEN environment variable not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    fn token() -> Result<String> {
        std::env::var("DRIVE_ACCESS_TOKEN").context("DRIVE_ACCESS_TOKEN not set")
    }

    /// Render a [`FileQuery`] into the Drive `q` filter string, restricted
    /// to either folders or non-folders.
    fn render_query(query: &FileQuery, folders: bool) -> String {
        let mut terms = Vec::new();

        if folders {
            terms.push(format!("mimeType = '{}'", FOLDER_MIME));
        } else if query.mime_types.is_empty() {
            terms.push(format!("mimeType != '{}'", FOLDER_MIME));
        } else {
            let alternation = query
                .mime_types
                .iter()
                .map(|m| format!("mimeType = '{}'", m))
                .collect::<Vec<_>>()
                .join(" or ");
            terms.push(format!("({})", alternation));
        }

        if !query.include_trashed {
            terms.push("trashed = false".to_string());
        }
        if let Some(parent) = &query.parent {
            terms.push(format!("'{}' in parents", parent));
        }

        terms.join(" and ")
    }

    /// Execute a request with retry. The builder closure is re-invoked per
    /// attempt since a `RequestBuilder` is consumed by `send`.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let token = Self::token()?;
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = build().bearer_auth(&token).send().await;
            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("Drive API error {}: {}", status, body));
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!("Drive API error {}: {}", status, body);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Drive request failed after retries")))
    }

    async fn list_resources(&self, q: &str) -> Result<Vec<FileResource>> {
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = format!("{}/files", API_BASE);
            let q_owned = q.to_string();
            let token_param = page_token.clone();
            let response = self
                .send_with_retry(move || {
                    let mut req = self.client.get(&url).query(&[
                        ("q", q_owned.as_str()),
                        ("fields", "nextPageToken, files(id, name, mimeType, parents, trashed)"),
                        ("pageSize", "1000"),
                    ]);
                    if let Some(t) = &token_param {
                        req = req.query(&[("pageToken", t.as_str())]);
                    }
                    req
                })
                .await?;

            let page: FileList = response.json().await?;
            resources.extend(page.files);
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(resources)
    }
}

#[async_trait]
impl Storage for DriveStorage {
    async fn list_files(&self, query: &FileQuery) -> Result<Vec<RemoteFile>> {
        let q = Self::render_query(query, false);
        let resources = self.list_resources(&q).await?;
        Ok(resources
            .into_iter()
            .map(|r| RemoteFile {
                id: r.id,
                name: r.name,
                mime_type: r.mime_type,
                parents: r.parents,
            })
            .collect())
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let q = Self::render_query(&FileQuery::default(), true);
        let resources = self.list_resources(&q).await?;
        Ok(resources
            .into_iter()
            .map(|r| {
                let mut folder = Folder::new(r.id, r.name);
                folder.parents = r.parents;
                folder.trashed = r.trashed;
                folder
            })
            .collect())
    }

    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/files/{}", API_BASE, file_id);
        let response = self
            .send_with_retry(|| self.client.get(&url).query(&[("alt", "media")]))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn create_folder(&self, name: &str) -> Result<Folder> {
        let url = format!("{}/files", API_BASE);
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
        });
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .query(&[("fields", "id, name")])
                    .json(&body)
            })
            .await?;
        let resource: FileResource = response.json().await?;
        Ok(Folder::new(resource.id, resource.name))
    }

    async fn move_file(
        &self,
        file_id: &str,
        new_parent: &str,
        old_parents: &[String],
    ) -> Result<()> {
        let url = format!("{}/files/{}", API_BASE, file_id);
        let remove = old_parents.join(",");
        self.send_with_retry(|| {
            self.client
                .patch(&url)
                .query(&[
                    ("addParents", new_parent),
                    ("removeParents", remove.as_str()),
                    ("fields", "id, parents"),
                ])
                .json(&serde_json::json!({}))
        })
        .await?;
        Ok(())
    }

    async fn has_children(&self, folder_id: &str) -> Result<bool> {
        let q = format!("'{}' in parents and trashed = false", folder_id);
        let url = format!("{}/files", API_BASE);
        let response = self
            .send_with_retry(|| {
                self.client.get(&url).query(&[
                    ("q", q.as_str()),
                    ("fields", "files(id)"),
                    ("pageSize", "1"),
                ])
            })
            .await?;
        let page: FileList = response.json().await?;
        Ok(!page.files.is_empty())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = format!("{}/files/{}", API_BASE, id);
        self.send_with_retry(|| self.client.delete(&url)).await?;
        Ok(())
    }
}
