use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid entity id range: {0}")]
    InvalidRange(String),

    #[error("invalid source selector: {0}")]
    InvalidSource(String),

    #[error("FlavorDB client setup failed: {0}")]
    Http(String),

    #[error("FlavorDB preflight for entity {id} failed: {reason}")]
    #[diagnostic(help("the API may be down or the endpoint may have moved; inspect the saved response"))]
    PreflightFailed {
        id: u32,
        reason: String,
        diagnostic: Option<String>,
    },

    #[error("entity cache error: {0}")]
    Cache(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install it and make sure it is on PATH"))]
    MissingTool(String),

    #[error("git clone failed: {0}")]
    Git(String),
}
