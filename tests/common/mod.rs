#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use serde_json::Value;

use flavor_harvest::app::{ProgressEvent, ProgressSink};
use flavor_harvest::cache::EntityCache;
use flavor_harvest::fetcher::{EntityFetcher, RawResult};

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Answers from a fixed table and records every requested id.
pub struct ScriptedFetcher {
    responses: HashMap<u32, RawResult>,
    fallback: RawResult,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedFetcher {
    pub fn new(fallback: RawResult) -> Self {
        Self {
            responses: HashMap::new(),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, id: u32, response: RawResult) -> Self {
        self.responses.insert(id, response);
        self
    }

    pub fn with_entity(self, id: u32, document: Value) -> Self {
        self.with(id, json_body(&document))
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl EntityFetcher for ScriptedFetcher {
    fn fetch(&self, id: u32) -> RawResult {
        self.calls.lock().unwrap().push(id);
        self.responses
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl EntityFetcher for &ScriptedFetcher {
    fn fetch(&self, id: u32) -> RawResult {
        (**self).fetch(id)
    }
}

pub fn json_body(document: &Value) -> RawResult {
    RawResult::Ok {
        body: serde_json::to_vec(document).unwrap(),
        content_type: Some("application/json".to_string()),
    }
}

pub fn html_body() -> RawResult {
    RawResult::Ok {
        body: b"<!DOCTYPE html><html><body>Server Error</body></html>".to_vec(),
        content_type: Some("text/html".to_string()),
    }
}

pub fn entity(id: i64, name: &str, molecules: Value) -> Value {
    serde_json::json!({
        "entity_id": id,
        "entity_alias_readable": name,
        "category": "Fruit",
        "molecules": molecules,
    })
}

pub fn temp_cache() -> (tempfile::TempDir, EntityCache) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("flavordb").join("entities_raw")).unwrap();
    (temp, EntityCache::new(root))
}
