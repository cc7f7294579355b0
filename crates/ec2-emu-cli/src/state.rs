//! Store persistence between invocations: the whole [`StoreSnapshot`] as a
//! JSON file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ec2_emu_core::{EmulatorConfig, InMemoryStore, StoreSnapshot};
use tracing::debug;

/// Open the store saved at `path`. A missing file starts a fresh store.
pub fn open(path: Option<&Path>, config: &EmulatorConfig) -> Result<InMemoryStore> {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Ok(InMemoryStore::new(config.clone()));
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    debug!(
        path = %path.display(),
        reservations = snapshot.reservations.len(),
        "loaded state"
    );
    Ok(InMemoryStore::from_snapshot(config.clone(), snapshot))
}

/// The store's state as pretty-printed JSON.
pub fn to_json(store: &InMemoryStore) -> Result<String> {
    serde_json::to_string_pretty(&store.snapshot()).context("Failed to serialize store state")
}

pub fn save(path: &Path, store: &InMemoryStore) -> Result<()> {
    fs::write(path, to_json(store)?)
        .with_context(|| format!("Failed to write state file: {}", path.display()))
}
