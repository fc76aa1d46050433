//! In-memory [`DriveLookup`] for unit tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::graph::DriveLookup;
use crate::models::{DriveItem, ItemKind};

const DOWNLOAD_PREFIX: &str = "https://download.test/";
const ROOT_ID: &str = "root";

/// A drive item plus the bytes behind its download URL.
pub struct FakeItem {
    pub item: DriveItem,
    pub content: Option<Vec<u8>>,
}

fn make(id: &str, name: &str, kind: ItemKind, content: Option<&[u8]>) -> FakeItem {
    FakeItem {
        item: DriveItem {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            web_url: format!("https://contoso.sharepoint.com/sites/eng/{}", name),
            download_url: content.map(|_| format!("{}{}", DOWNLOAD_PREFIX, id)),
            last_modified: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            size: content.map(|c| c.len() as i64).unwrap_or(0),
            parent_id: None,
        },
        content: content.map(<[u8]>::to_vec),
    }
}

pub fn vtt(id: &str, name: &str, content: &str) -> FakeItem {
    make(id, name, ItemKind::File, Some(content.as_bytes()))
}

pub fn file(id: &str, name: &str, content: &str) -> FakeItem {
    make(id, name, ItemKind::File, Some(content.as_bytes()))
}

pub fn bytes_file(id: &str, name: &str, content: Vec<u8>) -> FakeItem {
    make(id, name, ItemKind::File, Some(content.as_slice()))
}

pub fn recording_item(id: &str, name: &str) -> FakeItem {
    make(id, name, ItemKind::File, None)
}

pub fn folder(id: &str, name: &str) -> FakeItem {
    make(id, name, ItemKind::Folder, None)
}

#[derive(Default)]
pub struct FakeDrive {
    root: Vec<DriveItem>,
    children: HashMap<String, Vec<DriveItem>>,
    items: HashMap<String, DriveItem>,
    searches: HashMap<String, Vec<DriveItem>>,
    contents: HashMap<String, Vec<u8>>,
    failing_children: HashSet<String>,
    failing_downloads: HashSet<String>,
    fail_listing: bool,
    search_log: Mutex<Vec<String>>,
    download_log: Mutex<Vec<String>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, fake: FakeItem, parent: Option<&str>) -> DriveItem {
        let mut item = fake.item;
        if item.parent_id.is_none() {
            item.parent_id = parent.map(str::to_string);
        }
        if let Some(content) = fake.content {
            self.contents.entry(item.id.clone()).or_insert(content);
        }
        self.items
            .entry(item.id.clone())
            .or_insert_with(|| item.clone());
        item
    }

    /// The scanned folder. Its items report `root` as their parent.
    pub fn with_root(mut self, items: Vec<FakeItem>) -> Self {
        let items: Vec<DriveItem> = items
            .into_iter()
            .map(|i| self.register(i, Some(ROOT_ID)))
            .collect();
        self.children.insert(ROOT_ID.to_string(), items.clone());
        self.root = items;
        self
    }

    pub fn with_children(mut self, parent: &str, items: Vec<FakeItem>) -> Self {
        let items: Vec<DriveItem> = items
            .into_iter()
            .map(|i| self.register(i, Some(parent)))
            .collect();
        self.children.insert(parent.to_string(), items);
        self
    }

    /// Addressable by id only (not listed anywhere).
    pub fn with_item(mut self, item: FakeItem) -> Self {
        self.register(item, None);
        self
    }

    pub fn with_search(mut self, query: &str, hits: Vec<FakeItem>) -> Self {
        let hits: Vec<DriveItem> = hits.into_iter().map(|i| self.register(i, None)).collect();
        self.searches.insert(query.to_string(), hits);
        self
    }

    pub fn failing_children(mut self, item_id: &str) -> Self {
        self.failing_children.insert(item_id.to_string());
        self
    }

    pub fn failing_download(mut self, item_id: &str) -> Self {
        self.failing_downloads.insert(item_id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn item(&self, name: &str) -> DriveItem {
        self.items
            .values()
            .find(|i| i.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no fake item named {}", name))
    }

    pub fn search_log(&self) -> Vec<String> {
        self.search_log.lock().unwrap().clone()
    }

    pub fn download_log(&self) -> Vec<String> {
        self.download_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DriveLookup for FakeDrive {
    async fn list_folder(&self, folder_path: &str) -> Result<Vec<DriveItem>> {
        if self.fail_listing {
            bail!("Graph request failed (HTTP 404 Not Found): folder {}", folder_path);
        }
        Ok(self.root.clone())
    }

    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>> {
        if self.failing_children.contains(item_id) {
            bail!("Graph request failed (HTTP 500 Internal Server Error)");
        }
        Ok(self.children.get(item_id).cloned().unwrap_or_default())
    }

    async fn get_item(&self, item_id: &str) -> Result<DriveItem> {
        self.items
            .get(item_id)
            .cloned()
            .ok_or_else(|| anyhow!("Graph request failed (HTTP 404 Not Found): {}", item_id))
    }

    async fn search(&self, query: &str) -> Result<Vec<DriveItem>> {
        self.search_log.lock().unwrap().push(query.to_string());
        Ok(self.searches.get(query).cloned().unwrap_or_default())
    }

    async fn download(&self, download_url: &str) -> Result<Vec<u8>> {
        let id = download_url
            .strip_prefix(DOWNLOAD_PREFIX)
            .ok_or_else(|| anyhow!("unexpected download URL {}", download_url))?;
        self.download_log.lock().unwrap().push(id.to_string());
        if self.failing_downloads.contains(id) {
            bail!("Download failed (HTTP 403 Forbidden)");
        }
        self.contents
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no content for {}", id))
    }
}
