use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::IdRange;
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "flavor-harvest.json";
pub const DEFAULT_RAW_ROOT: &str = "data/raw";
pub const DEFAULT_API_BASE: &str = "https://cosylab.iiitd.edu.in/flavordb2";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (FlavorManifold Research)";
pub const DEFAULT_FLAVORGRAPH_REPO: &str = "https://github.com/lamypark/FlavorGraph.git";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub raw_root: Option<String>,
    #[serde(default)]
    pub flavordb: FlavorDbEntry,
    #[serde(default)]
    pub flavorgraph: FlavorGraphEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FlavorDbEntry {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub min_entity_id: Option<u32>,
    #[serde(default)]
    pub max_entity_id: Option<u32>,
    #[serde(default)]
    pub preflight_id: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub throttle_ms: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub error_log_limit: Option<usize>,
    #[serde(default)]
    pub breaker_window: Option<usize>,
    /// `null` turns the span test off; an omitted key keeps the default.
    #[serde(default, deserialize_with = "explicit_option")]
    pub breaker_max_span: Option<Option<u32>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FlavorGraphEntry {
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

fn explicit_option<'de, D>(deserializer: D) -> Result<Option<Option<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone)]
pub struct FlavorDbSettings {
    pub api_base: String,
    pub range: IdRange,
    pub preflight_id: u32,
    pub timeout: Duration,
    pub throttle: Duration,
    pub user_agent: String,
    pub error_log_limit: usize,
    pub breaker_window: usize,
    pub breaker_max_span: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FlavorGraphSettings {
    pub repo: String,
    pub branch: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub raw_root: Utf8PathBuf,
    pub flavordb: FlavorDbSettings,
    pub flavorgraph: FlavorGraphSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file, or falls back to defaults when the implicit
    /// `flavor-harvest.json` is absent. An explicit path must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let raw_root = Utf8PathBuf::from(
            config
                .raw_root
                .unwrap_or_else(|| DEFAULT_RAW_ROOT.to_string()),
        );

        let db = config.flavordb;
        let range = IdRange::new(
            db.min_entity_id.unwrap_or(0),
            db.max_entity_id.unwrap_or(1000),
        )?;
        let breaker_window = db.breaker_window.unwrap_or(20);
        if breaker_window == 0 {
            return Err(HarvestError::ConfigParse(
                "flavordb.breaker_window must be at least 1".to_string(),
            ));
        }
        let flavordb = FlavorDbSettings {
            api_base: db
                .api_base
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            range,
            preflight_id: db.preflight_id.unwrap_or(0),
            timeout: Duration::from_secs(db.timeout_secs.unwrap_or(15)),
            throttle: Duration::from_millis(db.throttle_ms.unwrap_or(150)),
            user_agent: db
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            error_log_limit: db.error_log_limit.unwrap_or(3),
            breaker_window,
            breaker_max_span: db.breaker_max_span.unwrap_or(Some(25)),
        };

        let graph = config.flavorgraph;
        let flavorgraph = FlavorGraphSettings {
            repo: graph
                .repo
                .unwrap_or_else(|| DEFAULT_FLAVORGRAPH_REPO.to_string()),
            branch: graph.branch.unwrap_or_else(|| "master".to_string()),
            extensions: graph.extensions.unwrap_or_else(default_graph_extensions),
        };

        Ok(ResolvedConfig {
            raw_root,
            flavordb,
            flavorgraph,
        })
    }
}

pub fn default_graph_extensions() -> Vec<String> {
    vec![
        "csv".to_string(),
        "pkl".to_string(),
        "pt".to_string(),
        "npy".to_string(),
    ]
}
