use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tempfile::Builder;

use crate::error::HarvestError;

pub const DIAGNOSTIC_STEM: &str = "TEST_RESPONSE";

/// One pretty-printed JSON document per FlavorDB entity id, stored as
/// `{root}/{id}.json`. Entries are only ever added.
#[derive(Debug, Clone)]
pub struct EntityCache {
    root: Utf8PathBuf,
}

impl EntityCache {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entity_path(&self, id: u32) -> Utf8PathBuf {
        self.root.join(format!("{id}.json"))
    }

    pub fn has(&self, id: u32) -> bool {
        self.entity_path(id).as_std_path().is_file()
    }

    pub fn put(&self, id: u32, document: &Value) -> Result<Utf8PathBuf, HarvestError> {
        let content = serde_json::to_vec_pretty(document)
            .map_err(|err| HarvestError::Cache(err.to_string()))?;
        let path = self.entity_path(id);
        write_atomic(&path, &content)?;
        Ok(path)
    }

    pub fn load(&self, id: u32) -> Result<Value, HarvestError> {
        let path = self.entity_path(id);
        let content = fs::read(path.as_std_path())
            .map_err(|err| HarvestError::Cache(format!("read {path}: {err}")))?;
        serde_json::from_slice(&content)
            .map_err(|err| HarvestError::Cache(format!("parse {path}: {err}")))
    }

    /// Cached ids in ascending numeric order. Files whose stem is not an id
    /// (the preflight diagnostic, leftover temporaries) are ignored.
    pub fn list(&self) -> Result<Vec<u32>, HarvestError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| HarvestError::Cache(err.to_string()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Cache(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u32>().ok().filter(|id| id.to_string() == stem))
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Saves a rejected preflight response next to the cache entries.
    pub fn write_diagnostic(&self, body: &[u8]) -> Result<Utf8PathBuf, HarvestError> {
        let (path, content) = match serde_json::from_slice::<Value>(body) {
            Ok(value) => (
                self.root.join(format!("{DIAGNOSTIC_STEM}.json")),
                serde_json::to_vec_pretty(&value)
                    .map_err(|err| HarvestError::Cache(err.to_string()))?,
            ),
            Err(_) => (self.root.join(format!("{DIAGNOSTIC_STEM}.txt")), body.to_vec()),
        };
        write_atomic(&path, &content)?;
        Ok(path)
    }
}

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("no parent directory for {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}
