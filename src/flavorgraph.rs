use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;
use serde::Serialize;

use crate::config::FlavorGraphSettings;
use crate::error::HarvestError;

pub trait RepoCloner: Send + Sync {
    /// Shallow-clones `branch` of `repo` into `destination`.
    fn shallow_clone(
        &self,
        repo: &str,
        branch: &str,
        destination: &Path,
    ) -> Result<(), HarvestError>;
}

#[derive(Clone)]
pub struct SystemGitCloner {
    git: Option<PathBuf>,
}

impl SystemGitCloner {
    pub fn new() -> Self {
        Self {
            git: find_in_path("git"),
        }
    }
}

impl Default for SystemGitCloner {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoCloner for SystemGitCloner {
    fn shallow_clone(
        &self,
        repo: &str,
        branch: &str,
        destination: &Path,
    ) -> Result<(), HarvestError> {
        let git = self
            .git
            .as_ref()
            .ok_or_else(|| HarvestError::MissingTool("git".to_string()))?;
        let output = Command::new(git)
            .args(["clone", "--depth", "1", "--branch", branch, repo])
            .arg(destination)
            .output()
            .map_err(|err| HarvestError::Git(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("git clone {repo} exited with {}", output.status)
        } else {
            stderr
        };
        Err(HarvestError::Git(message))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlavorGraphResult {
    pub action: String,
    pub path: String,
    pub files: usize,
    pub bytes: u64,
}

/// Clones the FlavorGraph repository and keeps only its data files under
/// `{raw_root}/flavorgraph`. An existing destination is left untouched.
pub fn acquire<C: RepoCloner>(
    cloner: &C,
    settings: &FlavorGraphSettings,
    raw_root: &Utf8Path,
) -> Result<FlavorGraphResult, HarvestError> {
    let destination = raw_root.join("flavorgraph");
    if destination.as_std_path().exists() {
        tracing::info!(path = %destination, "FlavorGraph already present, delete it to re-download");
        let (files, bytes) = dir_usage(destination.as_std_path());
        return Ok(FlavorGraphResult {
            action: "cached".to_string(),
            path: destination.to_string(),
            files,
            bytes,
        });
    }

    fs::create_dir_all(raw_root.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let clone_dir = tempfile::Builder::new()
        .prefix("_fg_tmp")
        .tempdir_in(raw_root.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let checkout = clone_dir.path().join("repo");

    tracing::info!(repo = %settings.repo, branch = %settings.branch, "cloning FlavorGraph");
    cloner.shallow_clone(&settings.repo, &settings.branch, &checkout)?;

    let staged = raw_root.join(".flavorgraph.partial");
    if staged.as_std_path().exists() {
        fs::remove_dir_all(staged.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    }
    let mut files = 0usize;
    let mut bytes = 0u64;
    for source in find_data_files(&checkout, &settings.extensions) {
        let relative = source
            .strip_prefix(&checkout)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let target = staged.as_std_path().join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        bytes += fs::copy(&source, &target)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        files += 1;
    }
    fs::create_dir_all(staged.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    fs::rename(staged.as_std_path(), destination.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

    tracing::info!(files, bytes, path = %destination, "FlavorGraph files copied");
    Ok(FlavorGraphResult {
        action: "download".to_string(),
        path: destination.to_string(),
        files,
        bytes,
    })
}

fn find_data_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(entries) = fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|name| name == ".git") {
                    continue;
                }
                stack.push(path);
            } else if path
                .extension()
                .and_then(|value| value.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// File count and total size of everything below `root`.
pub fn dir_usage(root: &Path) -> (usize, u64) {
    let mut files = 0usize;
    let mut bytes = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(entries) = fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = entry.metadata() {
                files += 1;
                bytes += meta.len();
            }
        }
    }
    (files, bytes)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
