//! CSV loading for the reference data
//!
//! Reads `timezones.csv`, `menu_hours.csv` and `store_status.csv` from a data
//! directory into a [`MemoryStore`]. Columns are located by header name.
//! Malformed rows are logged and skipped; a missing file or a missing
//! required column fails the whole load.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::model::{Observation, ScheduleEntry, Status};
use crate::store::{MemoryStore, MemoryStoreBuilder};

pub const TIMEZONES_FILE: &str = "timezones.csv";
pub const MENU_HOURS_FILE: &str = "menu_hours.csv";
pub const STORE_STATUS_FILE: &str = "store_status.csv";

pub const INPUT_FILES: [&str; 3] = [TIMEZONES_FILE, MENU_HOURS_FILE, STORE_STATUS_FILE];

/// Rows loaded and skipped for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub timezones: TableCount,
    pub menu_hours: TableCount,
    pub store_status: TableCount,
}

/// Load all three input files from `dir`
pub fn load_dir(dir: &Path) -> Result<(MemoryStore, IngestSummary)> {
    let read = |name: &str| {
        let path = dir.join(name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    };

    let mut builder = MemoryStore::builder();
    let summary = IngestSummary {
        timezones: load_timezones(&mut builder, &read(TIMEZONES_FILE)?)
            .context("Failed to load timezones")?,
        menu_hours: load_menu_hours(&mut builder, &read(MENU_HOURS_FILE)?)
            .context("Failed to load business hours")?,
        store_status: load_store_status(&mut builder, &read(STORE_STATUS_FILE)?)
            .context("Failed to load store status")?,
    };

    info!(
        "Loaded {} timezones, {} business hour entries, {} observations from {}",
        summary.timezones.loaded,
        summary.menu_hours.loaded,
        summary.store_status.loaded,
        dir.display()
    );
    Ok((builder.build(), summary))
}

/// `store_id,timezone_str`
pub fn load_timezones(builder: &mut MemoryStoreBuilder, csv: &str) -> Result<TableCount> {
    let table = Table::parse(csv)?;
    let store_col = table.column("store_id")?;
    let tz_col = table.column("timezone_str")?;

    let mut count = TableCount::default();
    for (line, row) in table.rows() {
        let store_id = field(&row, store_col);
        if store_id.is_empty() {
            warn!("{}:{}: missing store_id, skipping", TIMEZONES_FILE, line);
            count.skipped += 1;
            continue;
        }

        let name = field(&row, tz_col);
        let tz = match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!(
                    "{}:{}: unknown timezone '{}' for store {}, using default",
                    TIMEZONES_FILE, line, name, store_id
                );
                None
            }
        };
        builder.timezone(store_id, tz);
        count.loaded += 1;
    }
    Ok(count)
}

/// `store_id,dayOfWeek,start_time_local,end_time_local`
pub fn load_menu_hours(builder: &mut MemoryStoreBuilder, csv: &str) -> Result<TableCount> {
    let table = Table::parse(csv)?;
    let store_col = table.column("store_id")?;
    let day_col = table.column("dayOfWeek")?;
    let start_col = table.column("start_time_local")?;
    let end_col = table.column("end_time_local")?;

    let mut count = TableCount::default();
    for (line, row) in table.rows() {
        let store_id = field(&row, store_col);
        let day = field(&row, day_col).parse::<u8>().ok().filter(|d| *d <= 6);
        let open = parse_local_time(field(&row, start_col));
        let close = parse_local_time(field(&row, end_col));

        match (store_id.is_empty(), day, open, close) {
            (false, Some(day), Some(open), Some(close)) => {
                builder.schedule_entry(store_id, ScheduleEntry::new(day, open, close));
                count.loaded += 1;
            }
            _ => {
                warn!("{}:{}: malformed row, skipping", MENU_HOURS_FILE, line);
                count.skipped += 1;
            }
        }
    }
    Ok(count)
}

/// `store_id,status,timestamp_utc`
pub fn load_store_status(builder: &mut MemoryStoreBuilder, csv: &str) -> Result<TableCount> {
    let table = Table::parse(csv)?;
    let store_col = table.column("store_id")?;
    let status_col = table.column("status")?;
    let ts_col = table.column("timestamp_utc")?;

    let mut count = TableCount::default();
    for (line, row) in table.rows() {
        let store_id = field(&row, store_col);
        let status = field(&row, status_col).parse::<Status>();
        let timestamp = parse_timestamp(field(&row, ts_col));

        match (store_id.is_empty(), status, timestamp) {
            (false, Ok(status), Some(timestamp)) => {
                builder.observation(store_id, Observation::new(status, timestamp));
                count.loaded += 1;
            }
            _ => {
                warn!("{}:{}: malformed row, skipping", STORE_STATUS_FILE, line);
                count.skipped += 1;
            }
        }
    }

    if count.skipped > 0 {
        warn!("Skipped {} malformed status rows", count.skipped);
    }
    Ok(count)
}

/// Parse `YYYY-MM-DD HH:MM:SS[.ffffff][ UTC]` or RFC 3339
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = value.strip_suffix("UTC").unwrap_or(value).trim_end();

    if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse `HH:MM:SS` or `HH:MM`
pub fn parse_local_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn field<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(|s| s.trim()).unwrap_or("")
}

/// Header plus the raw data lines of a CSV file
struct Table<'a> {
    header: Vec<String>,
    body: Vec<(usize, &'a str)>,
}

impl<'a> Table<'a> {
    fn parse(csv: &'a str) -> Result<Self> {
        let mut lines = csv
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            bail!("file is empty, expected a header row");
        };
        let header = split_row(header.trim_start_matches('\u{feff}'))
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            header,
            body: lines.collect(),
        })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("missing column '{}'", name))
    }

    fn rows(&self) -> impl Iterator<Item = (usize, Vec<String>)> + '_ {
        self.body.iter().map(|(line, text)| (*line, split_row(text)))
    }
}

/// Split one CSV line, honouring double quotes
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
