use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("item {0:?} not found in catalog")]
    NotFound(String),
}

/// One viewable wallpaper: a stable id plus its preview and full-size resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub thumb: String,
    pub img: String,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, thumb: impl Into<String>, img: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thumb: thumb.into(),
            img: img.into(),
        }
    }

    /// Shareable address of the item, as reported while it is focused.
    pub fn address(&self) -> String {
        format!("/{}", self.id)
    }
}

/// The fixed list of items, shared read-only between sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    items: Arc<Vec<CatalogItem>>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog at {}", path.display()))?;
        Self::from_json(&data)
            .with_context(|| format!("Failed to parse catalog at {}", path.display()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let items: Vec<CatalogItem> = serde_json::from_str(data).context("decode catalog json")?;
        Ok(Self::new(items))
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&CatalogItem, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Picks the item a fresh visit starts from.
    pub fn random_item<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&CatalogItem, CatalogError> {
        self.items.choose(rng).ok_or(CatalogError::Empty)
    }
}

impl From<Vec<CatalogItem>> for Catalog {
    fn from(items: Vec<CatalogItem>) -> Self {
        Self::new(items)
    }
}
