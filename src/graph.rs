//! Microsoft Graph drive access.
//!
//! [`DriveLookup`] is the seam between the scan logic and the network: the
//! resolver and orchestrator only ever talk to this trait, and tests
//! substitute an in-memory drive. [`GraphClient`] is the real
//! implementation over the Graph v1.0 REST API.
//!
//! # Authentication
//!
//! App-only OAuth2 client-credentials flow against
//! `{authority_url}/{tenant_id}/oauth2/v2.0/token` with scope
//! `https://graph.microsoft.com/.default`. The client secret is read from
//! `GRAPH_CLIENT_SECRET`. The token is fetched on first use and kept for
//! the lifetime of the client, which is one scan or one server request.
//!
//! # Drive resolution
//!
//! `graph.drive_id` wins when configured. Otherwise the site is looked up
//! with `GET /sites/{hostname}:/{site_path}` and the drive whose name equals
//! `graph.library` is taken from `GET /sites/{site-id}/drives`.
//!
//! # Endpoints used
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list folder | `GET /drives/{d}/root:/{path}:/children` |
//! | list children | `GET /drives/{d}/items/{id}/children` |
//! | get item | `GET /drives/{d}/items/{id}` |
//! | search | `GET /drives/{d}/root/search(q='{query}')` |
//! | download | `GET {@microsoft.graph.downloadUrl}` (pre-authenticated) |
//!
//! Listings are not paginated; only the first page of each response is read.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::{secret_from_env, GraphConfig, GRAPH_SECRET_ENV};
use crate::models::{DriveItem, ItemKind};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Read-only access to one document library.
#[async_trait]
pub trait DriveLookup: Send + Sync {
    /// Children of a folder addressed by path relative to the drive root.
    async fn list_folder(&self, folder_path: &str) -> Result<Vec<DriveItem>>;

    /// Children of an item addressed by id. Works for folders and, on
    /// platforms that attach derived files to videos, for recordings.
    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>>;

    /// A single item, including its parent reference.
    async fn get_item(&self, item_id: &str) -> Result<DriveItem>;

    /// Full-text search across the whole drive.
    async fn search(&self, query: &str) -> Result<Vec<DriveItem>>;

    /// Raw bytes behind a download URL.
    async fn download(&self, download_url: &str) -> Result<Vec<u8>>;
}

/// [`DriveLookup`] over the Microsoft Graph REST API.
pub struct GraphClient {
    config: GraphConfig,
    client_secret: String,
    http: reqwest::Client,
    token: OnceCell<String>,
    drive_id: OnceCell<String>,
}

impl GraphClient {
    /// Build a client; fails if `GRAPH_CLIENT_SECRET` is not set.
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client_secret = secret_from_env(GRAPH_SECRET_ENV)?;
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            config: config.clone(),
            client_secret,
            http: builder.build()?,
            token: OnceCell::new(),
            drive_id: OnceCell::new(),
        })
    }

    async fn access_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/{}/oauth2/v2.0/token",
                    self.config.authority_url.trim_end_matches('/'),
                    self.config.tenant_id
                );
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", GRAPH_SCOPE),
                ];
                let resp = self
                    .http
                    .post(&url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| anyhow!("Failed to request Graph token: {}", e))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    bail!(
                        "Graph token request failed (HTTP {}): {}",
                        status,
                        truncate(&body)
                    );
                }
                let token: TokenResponse = resp.json().await?;
                tracing::debug!(expires_in = token.expires_in, "acquired Graph token");
                Ok::<_, anyhow::Error>(token.access_token)
            })
            .await?;
        Ok(token.as_str())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        tracing::debug!(url, "GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| anyhow!("Graph request to {} failed: {}", url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Graph request failed (HTTP {}): {}", status, truncate(&body));
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("Invalid Graph response from {}", url))
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// The configured drive id, resolving it from the site on first use.
    pub async fn drive_id(&self) -> Result<&str> {
        let id = self
            .drive_id
            .get_or_try_init(|| async {
                if let Some(id) = self.config.drive_id.as_deref().filter(|d| !d.is_empty()) {
                    return Ok(id.to_string());
                }
                self.resolve_drive_from_site().await
            })
            .await?;
        Ok(id.as_str())
    }

    async fn resolve_drive_from_site(&self) -> Result<String> {
        let hostname = self
            .config
            .site_hostname
            .as_deref()
            .context("graph.site_hostname is required when graph.drive_id is not set")?;
        let site_path = self
            .config
            .site_path
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/');

        let site_url = if site_path.is_empty() {
            self.api(&format!("/sites/{}", hostname))
        } else {
            self.api(&format!("/sites/{}:/{}", hostname, encode_path(site_path)))
        };
        let site: SiteResponse = self
            .get_json(&site_url)
            .await
            .with_context(|| format!("Failed to resolve SharePoint site {}/{}", hostname, site_path))?;

        let drives: Collection<DriveResponse> = self
            .get_json(&self.api(&format!("/sites/{}/drives", site.id)))
            .await?;
        let wanted = self.config.library.as_str();
        let drive = drives
            .value
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("Document library '{}' not found on site {}", wanted, hostname))?;

        tracing::info!(drive_id = %drive.id, library = wanted, "resolved document library");
        Ok(drive.id)
    }

    async fn list(&self, url: &str) -> Result<Vec<DriveItem>> {
        let collection: Collection<GraphItem> = self.get_json(url).await?;
        Ok(collection.value.into_iter().map(DriveItem::from).collect())
    }
}

#[async_trait]
impl DriveLookup for GraphClient {
    async fn list_folder(&self, folder_path: &str) -> Result<Vec<DriveItem>> {
        let drive = self.drive_id().await?;
        let path = folder_path.trim_matches('/');
        let url = if path.is_empty() {
            self.api(&format!("/drives/{}/root/children", drive))
        } else {
            self.api(&format!("/drives/{}/root:/{}:/children", drive, encode_path(path)))
        };
        self.list(&url).await
    }

    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>> {
        let drive = self.drive_id().await?;
        let url = self.api(&format!(
            "/drives/{}/items/{}/children",
            drive,
            uri_encode(item_id)
        ));
        self.list(&url).await
    }

    async fn get_item(&self, item_id: &str) -> Result<DriveItem> {
        let drive = self.drive_id().await?;
        let url = self.api(&format!("/drives/{}/items/{}", drive, uri_encode(item_id)));
        let item: GraphItem = self.get_json(&url).await?;
        Ok(item.into())
    }

    async fn search(&self, query: &str) -> Result<Vec<DriveItem>> {
        let drive = self.drive_id().await?;
        let url = self.api(&format!(
            "/drives/{}/root/search(q='{}')",
            drive,
            encode_search_query(query)
        ));
        self.list(&url).await
    }

    async fn download(&self, download_url: &str) -> Result<Vec<u8>> {
        // downloadUrl is pre-authenticated; a bearer token would be rejected.
        let resp = self
            .http
            .get(download_url)
            .send()
            .await
            .map_err(|e| anyhow!("Download failed: {}", e))?;
        if !resp.status().is_success() {
            bail!("Download failed (HTTP {})", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

// ============ Graph wire types ============

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct SiteResponse {
    id: String,
}

#[derive(Deserialize)]
struct DriveResponse {
    id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphItem {
    id: String,
    name: String,
    #[serde(default)]
    web_url: String,
    #[serde(rename = "@microsoft.graph.downloadUrl", default)]
    download_url: Option<String>,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    folder: Option<serde_json::Value>,
    #[serde(default)]
    parent_reference: Option<ParentReference>,
}

#[derive(Deserialize)]
struct ParentReference {
    #[serde(default)]
    id: Option<String>,
}

impl From<GraphItem> for DriveItem {
    fn from(item: GraphItem) -> Self {
        DriveItem {
            id: item.id,
            name: item.name,
            kind: if item.folder.is_some() {
                ItemKind::Folder
            } else {
                ItemKind::File
            },
            web_url: item.web_url,
            download_url: item.download_url,
            last_modified: item.last_modified_date_time.unwrap_or_default(),
            size: item.size,
            parent_id: item.parent_reference.and_then(|p| p.id),
        }
    }
}

// ============ URL helpers ============

/// Percent-encode per RFC 3986, leaving only unreserved characters.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// Encode each `/`-separated segment of a drive path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// OData string literal escaping (`'` → `''`), then percent-encoding.
fn encode_search_query(query: &str) -> String {
    uri_encode(&query.replace('\'', "''"))
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_children_response() {
        let json = r#"{
            "value": [
                {
                    "id": "01ABC",
                    "name": "Weekly Sync.vtt",
                    "webUrl": "https://contoso.sharepoint.com/sites/eng/Shared%20Documents/Weekly%20Sync.vtt",
                    "@microsoft.graph.downloadUrl": "https://contoso.sharepoint.com/download?id=1",
                    "lastModifiedDateTime": "2024-01-15T10:30:00Z",
                    "size": 1024,
                    "file": { "mimeType": "text/vtt" },
                    "parentReference": { "id": "01PARENT", "driveId": "b!x" }
                },
                {
                    "id": "01DEF",
                    "name": "Transcripts",
                    "webUrl": "https://contoso.sharepoint.com/sites/eng/Shared%20Documents/Transcripts",
                    "lastModifiedDateTime": "2024-01-16T08:00:00Z",
                    "folder": { "childCount": 3 }
                }
            ]
        }"#;
        let collection: Collection<GraphItem> = serde_json::from_str(json).unwrap();
        let items: Vec<DriveItem> = collection.value.into_iter().map(DriveItem::from).collect();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_vtt());
        assert_eq!(items[0].parent_id.as_deref(), Some("01PARENT"));
        assert_eq!(items[0].size, 1024);
        assert_eq!(items[0].last_modified.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(items[1].is_folder());
        assert!(items[1].download_url.is_none());
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(
            encode_path("/Recordings/Weekly Sync/"),
            "Recordings/Weekly%20Sync"
        );
    }

    #[test]
    fn search_query_escapes_quotes() {
        assert_eq!(encode_search_query("Bob's sync.vtt"), "Bob%27%27s%20sync.vtt");
    }

    #[test]
    fn new_requires_client_secret() {
        std::env::remove_var(GRAPH_SECRET_ENV);
        let config = crate::config::parse_config(
            "[db]\npath = \"x\"\n[graph]\ntenant_id = \"t\"\nclient_id = \"c\"\ndrive_id = \"d\"\n",
        )
        .unwrap();
        let err = GraphClient::new(&config.graph).err().unwrap();
        assert!(err.to_string().contains(GRAPH_SECRET_ENV));
    }
}
