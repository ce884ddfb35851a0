pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod scraping;
mod utils;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use config::AppConfig;
use db::EventStore;
use error::CrawlError;
use reconcile::Reconciler;
use scraping::ListingSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "sweep", rename_all = "snake_case")]
pub enum SweepOutcome {
    Ran { marked_inactive: usize },
    /// Nothing was found; a sweep now would deactivate the whole store.
    SkippedEmptyBatch,
    /// Some source did not answer, so the seen keys are incomplete.
    SkippedPartialCrawl,
    /// Only some of the configured sources were crawled.
    SkippedSubsetCrawl,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Distinct keys; repeats within the batch are counted in `duplicates`.
    pub found: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub sweep: SweepOutcome,
    pub failed_sources: Vec<String>,
}

impl CycleReport {
    pub fn marked_inactive(&self) -> usize {
        match self.sweep {
            SweepOutcome::Ran { marked_inactive } => marked_inactive,
            _ => 0,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found {} ({} skipped, {} duplicates): {} added, {} updated, {} unchanged, ",
            self.found, self.skipped, self.duplicates, self.added, self.updated, self.unchanged
        )?;
        match self.sweep {
            SweepOutcome::Ran { marked_inactive } => {
                write!(f, "{marked_inactive} marked inactive")
            }
            SweepOutcome::SkippedEmptyBatch => f.write_str("inactive sweep skipped (empty batch)"),
            SweepOutcome::SkippedPartialCrawl => write!(
                f,
                "inactive sweep skipped (failed sources: {})",
                self.failed_sources.join(", ")
            ),
            SweepOutcome::SkippedSubsetCrawl => f.write_str("inactive sweep skipped (subset crawl)"),
        }
    }
}

/// One crawl-and-reconcile pass. `full_crawl` is false when `sources` is a
/// subset of the configured ones; the absence sweep is then skipped.
pub fn run_cycle<S: EventStore>(
    store: &S,
    sources: &[Box<dyn ListingSource>],
    full_crawl: bool,
    now: DateTime<Utc>,
) -> Result<CycleReport, CrawlError> {
    tracing::info!(sources = sources.len(), "starting crawl");
    let batch = scraping::crawl(sources)?;
    let failed_sources: Vec<String> = batch.failures.iter().map(|(id, _)| id.clone()).collect();
    let all_answered = batch.is_complete();

    let mut report = CycleReport {
        started_at: now,
        found: 0,
        duplicates: 0,
        skipped: batch.skipped,
        added: 0,
        updated: 0,
        unchanged: 0,
        sweep: SweepOutcome::SkippedEmptyBatch,
        failed_sources,
    };

    if batch.candidates.is_empty() {
        tracing::warn!("crawl returned no candidates, leaving store untouched");
        return Ok(report);
    }

    let received = batch.candidates.len();
    let reconciler = Reconciler::new(store);
    let outcome = reconciler.reconcile_batch_at(batch.candidates, now)?;
    report.found = outcome.seen.len();
    report.duplicates = received - outcome.seen.len();
    report.added = outcome.added;
    report.updated = outcome.updated;
    report.unchanged = outcome.unchanged;

    report.sweep = if !all_answered {
        SweepOutcome::SkippedPartialCrawl
    } else if !full_crawl {
        SweepOutcome::SkippedSubsetCrawl
    } else {
        SweepOutcome::Ran {
            marked_inactive: reconciler.mark_absent_inactive_at(&outcome.seen, now)?,
        }
    };

    tracing::info!(
        found = report.found,
        duplicates = report.duplicates,
        skipped = report.skipped,
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        marked_inactive = report.marked_inactive(),
        "crawl complete"
    );
    Ok(report)
}

/// Crawls every configured source, or just `source_id`.
pub fn scrape<S: EventStore>(
    config: &AppConfig,
    store: &S,
    source_id: Option<&str>,
) -> Result<CycleReport, CrawlError> {
    let all = scraping::active_sources(config);
    let total = all.len();
    let sources = match source_id {
        Some(id) => vec![scraping::find_source(config, id)?],
        None => all,
    };
    let full_crawl = sources.len() == total;
    run_cycle(store, &sources, full_crawl, Utc::now())
}

/// Crawls every configured source each `interval`. See [`watch_sources`].
pub fn watch<S, F>(
    config: &AppConfig,
    store: &S,
    interval: Duration,
    max_cycles: Option<usize>,
    on_report: F,
) -> Result<(), CrawlError>
where
    S: EventStore,
    F: FnMut(&CycleReport),
{
    let sources = scraping::active_sources(config);
    watch_sources(store, &sources, interval, max_cycles, on_report)
}

/// Runs a full cycle over `sources` every `interval`. Fetch failures are
/// logged and the next cycle still runs; store failures end the loop.
pub fn watch_sources<S, F>(
    store: &S,
    sources: &[Box<dyn ListingSource>],
    interval: Duration,
    max_cycles: Option<usize>,
    mut on_report: F,
) -> Result<(), CrawlError>
where
    S: EventStore,
    F: FnMut(&CycleReport),
{
    let mut cycles = 0usize;
    loop {
        match run_cycle(store, sources, true, Utc::now()) {
            Ok(report) => on_report(&report),
            Err(CrawlError::Fetch(err)) => {
                tracing::warn!(%err, "crawl aborted, will retry next cycle");
            }
            Err(err) => return Err(err),
        }
        cycles += 1;
        if max_cycles.is_some_and(|max| cycles >= max) {
            return Ok(());
        }
        tracing::debug!(secs = interval.as_secs(), "sleeping until next crawl");
        std::thread::sleep(interval);
    }
}
