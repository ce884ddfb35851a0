use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sydney_events_lib::config::AppConfig;
use sydney_events_lib::db::{EventQuery, Store};
use sydney_events_lib::models::{EventRecord, EventStatus};
use sydney_events_lib::scraping;

const TIMEZONE: Tz = chrono_tz::Australia::Sydney;

#[derive(Parser)]
#[command(name = "sydney-events", version, about = "Scrape and track Sydney event listings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one crawl-and-reconcile cycle.
    Scrape {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Crawl repeatedly on an interval.
    Watch {
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// List stored events. Shows the public view unless --all or --status is given.
    List {
        #[arg(long)]
        status: Option<EventStatus>,
        #[arg(long)]
        search: Option<String>,
        /// First day, YYYY-MM-DD (Sydney time).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD (Sydney time).
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Mark an event as imported, by id or original URL.
    Import {
        key: String,
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show the configured listing sources.
    Sources,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    let open_store = || {
        Store::open(&config.database_path)
            .with_context(|| format!("opening store at {:?}", config.database_path))
    };

    match cli.command {
        Command::Scrape { source, json } => {
            let store = open_store()?;
            let report = sydney_events_lib::scrape(&config, &store, source.as_deref())
                .context("scrape aborted")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }
        Command::Watch {
            interval,
            max_cycles,
        } => {
            let secs = interval.unwrap_or(config.watch_interval_secs);
            if secs == 0 {
                bail!("--interval must be positive");
            }
            let store = open_store()?;
            sydney_events_lib::watch(
                &config,
                &store,
                Duration::from_secs(secs),
                max_cycles,
                |report| println!("{} {report}", report.started_at.to_rfc3339()),
            )
            .context("watch stopped")?;
        }
        Command::List {
            status,
            search,
            from,
            to,
            all,
            json,
        } => {
            let mut query = if all || status.is_some() {
                EventQuery {
                    city: Some(config.defaults.city.clone()),
                    ..EventQuery::default()
                }
            } else {
                EventQuery::public(&config.defaults.city)
            };
            if let Some(status) = status {
                query.statuses = vec![status];
            }
            query.search = search;
            query.from = from.map(|day| day_bound(day, 0, 0, 0)).transpose()?;
            query.to = to.map(end_of_day).transpose()?;

            let events = open_store()?.query(&query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in &events {
                    println!("{}", render_row(event));
                }
                eprintln!("{} events", events.len());
            }
        }
        Command::Import { key, by, notes } => {
            let by = by
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "cli".to_string());
            let record = open_store()?
                .mark_imported(&key, &by, notes.as_deref(), Utc::now())
                .with_context(|| format!("importing {key}"))?;
            tracing::info!(id = %record.id, by = %by, "event imported");
            println!("{}", render_row(&record));
        }
        Command::Sources => {
            for source in scraping::list_sources(&config) {
                println!("{}\t{}\t{}", source.id, source.name, source.url);
            }
        }
    }

    Ok(())
}

/// Start of the following day, for use as an exclusive bound.
fn end_of_day(day: NaiveDate) -> Result<DateTime<Utc>> {
    let next = day
        .succ_opt()
        .with_context(|| format!("no day after {day}"))?;
    day_bound(next, 0, 0, 0)
}

fn day_bound(day: NaiveDate, hour: u32, min: u32, sec: u32) -> Result<DateTime<Utc>> {
    let naive = day
        .and_hms_opt(hour, min, sec)
        .with_context(|| format!("invalid time on {day}"))?;
    TIMEZONE
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{naive} does not exist in {TIMEZONE}"))
}

fn render_row(event: &EventRecord) -> String {
    let local = event.date.with_timezone(&TIMEZONE);
    let flag = match event.status {
        EventStatus::Imported => "*",
        _ => " ",
    };
    format!(
        "{}{}  {:<8}  {}  {}  @ {}",
        flag,
        event.id,
        event.status,
        local.format("%a %d %b %H:%M"),
        event.title,
        event.venue.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn to_bound_covers_the_whole_last_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let bound = end_of_day(day).unwrap();
        // AEDT is UTC+11 in late October.
        assert_eq!(bound, Utc.with_ymd_and_hms(2026, 10, 19, 13, 0, 0).unwrap());

        let last_moment = bound - ChronoDuration::microseconds(1);
        assert!(last_moment < bound);
        assert_eq!(last_moment.with_timezone(&TIMEZONE).date_naive(), day);
    }
}
