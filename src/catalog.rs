//! Catalog of item types that can be assigned to a probe.

use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;

use crate::db::{Database, ItemType};

#[async_trait]
pub trait ItemTypeSource: Send + Sync {
    async fn list_item_types(&self) -> Result<Vec<ItemType>>;
}

#[async_trait]
impl ItemTypeSource for Database {
    async fn list_item_types(&self) -> Result<Vec<ItemType>> {
        Database::list_item_types(self).await
    }
}

/// Accepts the loosely-shaped catalog payloads seen in the wild: `name`
/// may be spelled `Name` or `item_type`, `description` may be
/// `Description`. Entries without a name are dropped and repeated names
/// keep their first occurrence. Anything but an array yields nothing.
pub fn normalize_item_types(payload: &Value) -> Vec<ItemType> {
    let Some(entries) = payload.as_array() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| {
            let name = first_text(entry, &["name", "Name", "item_type"])?;
            let description = first_text(entry, &["description", "Description"]).unwrap_or_default();
            Some(ItemType { name, description })
        })
        .filter(|item| seen.insert(item.name.clone()))
        .collect()
}

fn first_text(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| entry.get(*key)?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Reads the catalog once. A store failure leaves the caller with an empty
/// catalog rather than aborting startup.
pub async fn load_catalog(source: &dyn ItemTypeSource) -> Vec<ItemType> {
    match source.list_item_types().await {
        Ok(items) => {
            info!("Loaded {} item types", items.len());
            items
        }
        Err(err) => {
            warn!("Item type catalog unavailable: {err:#}");
            Vec::new()
        }
    }
}

pub async fn import_seed_file(db: &Database, path: &Path) -> Result<usize> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read item type seed {}", path.display()))?;
    let payload: Value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse item type seed {}", path.display()))?;

    let items = normalize_item_types(&payload);
    if items.is_empty() {
        warn!("Item type seed {} has no usable entries", path.display());
        return Ok(0);
    }
    db.import_item_types(items).await
}
