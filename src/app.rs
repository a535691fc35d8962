use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::cache::EntityCache;
use crate::config::ResolvedConfig;
use crate::domain::{IdRange, Source};
use crate::error::HarvestError;
use crate::extract::{TableCounts, extract_cache};
use crate::fetcher::EntityFetcher;
use crate::flavorgraph::{self, FlavorGraphResult, RepoCloner, dir_usage};
use crate::sweep::{SweepController, SweepOptions, SweepReport};
use crate::table::{WrittenTable, write_tables};

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Skip preflight and sweep; rebuild the tables from the existing cache.
    pub extract_only: bool,
    pub range_override: Option<IdRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireResult {
    pub generated_at: String,
    pub flavorgraph: Option<FlavorGraphResult>,
    pub flavordb: Option<FlavorDbResult>,
    pub summary: Vec<SourceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlavorDbResult {
    pub status: String,
    pub reason: Option<String>,
    pub diagnostic: Option<String>,
    pub sweep: Option<SweepReport>,
    pub counts: Option<TableCounts>,
    pub tables: Vec<WrittenTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub name: String,
    pub path: String,
    pub downloaded: bool,
    pub files: usize,
    pub megabytes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    pub position: u64,
    pub total: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub errors: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub progress: Option<SweepProgress>,
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
            progress: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Directory layout of the FlavorDB source below the raw data root.
#[derive(Debug, Clone)]
pub struct FlavorDbLayout {
    pub dir: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
}

impl FlavorDbLayout {
    pub fn new(raw_root: &Utf8Path) -> Self {
        let dir = raw_root.join(Source::Fdb.dir_name());
        let cache_dir = dir.join("entities_raw");
        Self { dir, cache_dir }
    }
}

pub struct App<F: EntityFetcher, C: RepoCloner> {
    config: ResolvedConfig,
    fetcher: F,
    cloner: C,
}

impl<F: EntityFetcher, C: RepoCloner> App<F, C> {
    pub fn new(config: ResolvedConfig, fetcher: F, cloner: C) -> Self {
        Self {
            config,
            fetcher,
            cloner,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Runs the selected sources in order, then reports what is on disk.
    /// A failed FlavorDB preflight is recorded in the result, other errors
    /// propagate.
    pub fn acquire(
        &self,
        sources: &[Source],
        options: &AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireResult, HarvestError> {
        let mut graph_result = None;
        let mut db_result = None;

        for source in sources {
            match source {
                Source::Fg => {
                    sink.event(ProgressEvent::phase("phase=FlavorGraph; cloning repository"));
                    graph_result = Some(flavorgraph::acquire(
                        &self.cloner,
                        &self.config.flavorgraph,
                        &self.config.raw_root,
                    )?);
                }
                Source::Fdb => {
                    let result = match self.acquire_flavordb(options, sink) {
                        Ok(result) => result,
                        Err(HarvestError::PreflightFailed {
                            id,
                            reason,
                            diagnostic,
                        }) => {
                            tracing::warn!(id, %reason, "FlavorDB preflight failed, skipping sweep");
                            FlavorDbResult {
                                status: "preflight_failed".to_string(),
                                reason: Some(reason),
                                diagnostic,
                                sweep: None,
                                counts: None,
                                tables: Vec::new(),
                            }
                        }
                        Err(err) => return Err(err),
                    };
                    db_result = Some(result);
                }
            }
        }

        sink.event(ProgressEvent::phase("phase=Summary; scanning sources"));
        Ok(AcquireResult {
            generated_at: chrono::Utc::now().to_rfc3339(),
            flavorgraph: graph_result,
            flavordb: db_result,
            summary: self.summarize(),
        })
    }

    pub fn acquire_flavordb(
        &self,
        options: &AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FlavorDbResult, HarvestError> {
        let settings = &self.config.flavordb;
        let layout = FlavorDbLayout::new(&self.config.raw_root);
        let cache = EntityCache::new(layout.cache_dir.clone());

        let sweep = if options.extract_only {
            None
        } else {
            let controller =
                SweepController::new(&self.fetcher, &cache, SweepOptions::from(settings));
            sink.event(ProgressEvent::phase(format!(
                "phase=Preflight; entity {}",
                settings.preflight_id
            )));
            controller.preflight(settings.preflight_id)?;

            let range = options.range_override.unwrap_or(settings.range);
            sink.event(ProgressEvent::phase(format!("phase=Sweep; ids {range}")));
            tracing::info!(%range, "starting FlavorDB sweep");
            Some(controller.sweep(range, sink)?)
        };

        sink.event(ProgressEvent::phase("phase=Extract; building tables"));
        let tables = extract_cache(&cache)?;
        let counts = tables.counts();
        let written = write_tables(&layout.dir, &tables.into_tables())?;
        tracing::info!(
            entities = counts.entities,
            molecules = counts.molecules,
            entity_molecule_edges = counts.entity_molecule_edges,
            molecule_descriptor_edges = counts.molecule_descriptor_edges,
            dir = %layout.dir,
            "FlavorDB tables written"
        );

        let status = match &sweep {
            None => "extracted",
            Some(report) if report.aborted_at.is_some() => "aborted",
            Some(_) => "complete",
        };
        Ok(FlavorDbResult {
            status: status.to_string(),
            reason: sweep
                .as_ref()
                .and_then(|report| report.aborted_at)
                .map(|id| format!("circuit breaker tripped at id {id}")),
            diagnostic: None,
            sweep,
            counts: Some(counts),
            tables: written,
        })
    }

    pub fn summarize(&self) -> Vec<SourceSummary> {
        Source::ALL
            .iter()
            .map(|source| {
                let path = self.config.raw_root.join(source.dir_name());
                let exists = path.as_std_path().exists();
                let (files, bytes) = if exists {
                    dir_usage(path.as_std_path())
                } else {
                    (0, 0)
                };
                SourceSummary {
                    source: source.to_string(),
                    name: source.display_name().to_string(),
                    path: path.to_string(),
                    downloaded: exists,
                    files,
                    megabytes: bytes as f64 / (1024.0 * 1024.0),
                }
            })
            .collect()
    }
}
