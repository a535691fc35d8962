use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SweepProgress};
use crate::cache::EntityCache;
use crate::classify::{ClassifiedResult, EntityPayload, classify};
use crate::config::FlavorDbSettings;
use crate::domain::IdRange;
use crate::error::HarvestError;
use crate::fetcher::{EntityFetcher, RawResult};

/// HTTP statuses FlavorDB uses for ids that do not exist.
pub const NOT_FOUND_STATUSES: &[u16] = &[400, 404, 500];

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub throttle: Duration,
    pub error_log_limit: usize,
    pub breaker_window: usize,
    pub breaker_max_span: Option<u32>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(150),
            error_log_limit: 3,
            breaker_window: 20,
            breaker_max_span: Some(25),
        }
    }
}

impl From<&FlavorDbSettings> for SweepOptions {
    fn from(settings: &FlavorDbSettings) -> Self {
        Self {
            throttle: settings.throttle,
            error_log_limit: settings.error_log_limit,
            breaker_window: settings.breaker_window,
            breaker_max_span: settings.breaker_max_span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepError {
    pub id: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub downloaded: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub errors: Vec<SweepError>,
    /// Id at which the circuit breaker stopped the sweep.
    pub aborted_at: Option<u32>,
}

/// Sliding window over the ids of the most recent unexpected errors. Trips
/// once the window is full and, when a span is set, its ids lie closer
/// together than that span.
///
/// With the defaults (20 errors inside a span of 25 ids) only bursts denser
/// than roughly 4 errors in 5 ids trip it. Errors on every other id span 38
/// ids per window and never do. Raise `breaker_max_span`, or clear it, to
/// catch sparser failure patterns.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    window: usize,
    max_span: Option<u32>,
    recent: VecDeque<u32>,
}

impl CircuitBreaker {
    pub fn new(window: usize, max_span: Option<u32>) -> Self {
        let window = window.max(1);
        Self {
            window,
            max_span,
            recent: VecDeque::with_capacity(window),
        }
    }

    /// Records an error at `id` and reports whether the breaker is now open.
    pub fn record(&mut self, id: u32) -> bool {
        self.recent.push_back(id);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        if self.recent.len() < self.window {
            return false;
        }
        match (self.max_span, self.recent.front(), self.recent.back()) {
            (None, _, _) => true,
            (Some(span), Some(oldest), Some(newest)) => newest.saturating_sub(*oldest) < span,
            _ => false,
        }
    }
}

pub struct SweepController<'a, F: EntityFetcher> {
    fetcher: &'a F,
    cache: &'a EntityCache,
    options: SweepOptions,
}

impl<'a, F: EntityFetcher> SweepController<'a, F> {
    pub fn new(fetcher: &'a F, cache: &'a EntityCache, options: SweepOptions) -> Self {
        Self {
            fetcher,
            cache,
            options,
        }
    }

    /// Fetches one known-good id and refuses to continue unless it classifies
    /// as an entity. Whatever body came back is saved for inspection.
    pub fn preflight(&self, id: u32) -> Result<EntityPayload, HarvestError> {
        tracing::info!(id, "testing FlavorDB connectivity");
        let (body, content_type) = match self.fetcher.fetch(id) {
            RawResult::Ok { body, content_type } => (body, content_type),
            RawResult::HttpError(status) => {
                return Err(HarvestError::PreflightFailed {
                    id,
                    reason: format!("HTTP {status}"),
                    diagnostic: None,
                });
            }
            RawResult::TransportError(message) => {
                return Err(HarvestError::PreflightFailed {
                    id,
                    reason: message,
                    diagnostic: None,
                });
            }
        };

        match classify(&body) {
            ClassifiedResult::ValidEntity(payload) => {
                tracing::info!(
                    entity_id = payload.entity_id,
                    name = payload.name.as_deref().unwrap_or("MISSING"),
                    molecules = payload.molecules.len(),
                    "preflight passed"
                );
                Ok(payload)
            }
            rejected => {
                let diagnostic = self.cache.write_diagnostic(&body)?;
                let preview: String = String::from_utf8_lossy(&body).chars().take(200).collect();
                tracing::warn!(
                    id,
                    content_type = content_type.as_deref().unwrap_or(""),
                    %preview,
                    path = %diagnostic,
                    "preflight response rejected"
                );
                Err(HarvestError::PreflightFailed {
                    id,
                    reason: rejected.label().to_string(),
                    diagnostic: Some(diagnostic.to_string()),
                })
            }
        }
    }

    pub fn sweep(
        &self,
        range: IdRange,
        sink: &dyn ProgressSink,
    ) -> Result<SweepReport, HarvestError> {
        let mut report = SweepReport::default();
        let mut breaker =
            CircuitBreaker::new(self.options.breaker_window, self.options.breaker_max_span);
        let started = Instant::now();
        let total = range.len();

        for (position, id) in range.iter().enumerate() {
            if self.cache.has(id) {
                report.skipped += 1;
                report_progress(sink, &report, position as u64 + 1, total, started, id);
                continue;
            }

            let outcome = self.fetcher.fetch(id);
            let tripped = self.apply(id, outcome, &mut report, &mut breaker)?;
            report_progress(sink, &report, position as u64 + 1, total, started, id);

            if tripped {
                tracing::warn!(
                    id,
                    errors = report.errors.len(),
                    "too many errors, stopping sweep"
                );
                report.aborted_at = Some(id);
                break;
            }

            if !self.options.throttle.is_zero() {
                thread::sleep(self.options.throttle);
            }
        }

        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            not_found = report.not_found,
            errors = report.errors.len(),
            "sweep finished"
        );
        Ok(report)
    }

    fn apply(
        &self,
        id: u32,
        outcome: RawResult,
        report: &mut SweepReport,
        breaker: &mut CircuitBreaker,
    ) -> Result<bool, HarvestError> {
        match outcome {
            RawResult::TransportError(message) => {
                tracing::debug!(id, %message, "transport error");
                report.not_found += 1;
            }
            RawResult::HttpError(status) if NOT_FOUND_STATUSES.contains(&status) => {
                tracing::debug!(id, status, "not found");
                report.not_found += 1;
            }
            RawResult::HttpError(status) => {
                report.errors.push(SweepError {
                    id,
                    message: format!("HTTP {status}"),
                });
                if report.errors.len() <= self.options.error_log_limit {
                    tracing::warn!(id, status, "unexpected HTTP status");
                } else {
                    tracing::debug!(id, status, "unexpected HTTP status");
                }
                return Ok(breaker.record(id));
            }
            RawResult::Ok { body, .. } => match classify(&body) {
                ClassifiedResult::ValidEntity(payload) => {
                    self.cache.put(id, &payload.document)?;
                    report.downloaded += 1;
                    if report.downloaded % 50 == 0 {
                        tracing::info!(downloaded = report.downloaded, id, "fetched entities");
                    }
                }
                rejected => {
                    tracing::debug!(id, kind = rejected.label(), "unusable response");
                    report.not_found += 1;
                }
            },
        }
        Ok(false)
    }
}

fn report_progress(
    sink: &dyn ProgressSink,
    report: &SweepReport,
    position: u64,
    total: u64,
    started: Instant,
    id: u32,
) {
    sink.event(ProgressEvent {
        message: format!("sweep id={id}"),
        elapsed: Some(started.elapsed()),
        progress: Some(SweepProgress {
            position,
            total,
            downloaded: report.downloaded,
            skipped: report.skipped,
            not_found: report.not_found,
            errors: report.errors.len() as u64,
        }),
    });
}
