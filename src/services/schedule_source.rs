//! Exam schedule retrieval: spreadsheet download, sheet parsing and a
//! day-long cache in front of both.

use crate::storage::models::{Event, Grade, Schedule, WeekBucket};
use crate::utils::datetime::week_start;
use async_trait::async_trait;
use calamine::{open_workbook_from_rs, Data, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, Utc};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Week offsets (in days) fetched when nothing else is asked for.
pub const DEFAULT_WEEK_OFFSETS: [i64; 3] = [0, 7, 14];

/// Columns a single grade may span in the sheet.
const MAX_GRADE_COLUMNS: usize = 3;

/// School days in a week bucket, Sunday to Friday.
const DAYS_PER_BUCKET: i64 = 6;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule download returned status {0}")]
    Status(u16),
    #[error("schedule download failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    #[error("no sheet name starts with '{0}'")]
    MissingSheet(String),
    #[error("no header row with grade labels")]
    MissingHeader,
    #[error("no date column below the header row")]
    MissingDates,
    #[error("no rows for the week starting {0}")]
    MissingCurrentWeek(NaiveDate),
}

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Per-grade week buckets, one for each offset in `offsets`.
    async fn get_schedule(&self, offsets: &[i64]) -> Result<Schedule, ScheduleError>;
}

/// A sheet cell reduced to the kinds the parser cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetCell {
    Empty,
    Text(String),
    Date(NaiveDate),
    Number(f64),
}

impl From<&Data> for SheetCell {
    fn from(data: &Data) -> Self {
        match data {
            Data::DateTime(_) | Data::DateTimeIso(_) => {
                data.as_date().map(SheetCell::Date).unwrap_or(SheetCell::Empty)
            }
            Data::String(s) if s.trim().is_empty() => SheetCell::Empty,
            Data::String(s) => SheetCell::Text(s.trim().to_string()),
            Data::Int(i) => SheetCell::Number(*i as f64),
            Data::Float(f) => SheetCell::Number(*f),
            Data::Bool(b) => SheetCell::Text(b.to_string()),
            _ => SheetCell::Empty,
        }
    }
}

impl SheetCell {
    fn text(&self) -> Option<&str> {
        match self {
            SheetCell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Builds a schedule out of a sheet grid.
///
/// The header row is the first row holding a grade label. A grade owns the
/// columns from its label up to the next label, at most three. The date
/// column is the first column with a date below the header. Bucket `k`
/// covers the six days starting `7 + offsets[k]` days after the most
/// recent Sunday, with events in row order and repeats within a row dropped.
pub fn parse_schedule(
    grid: &[Vec<SheetCell>],
    today: NaiveDate,
    offsets: &[i64],
    labels: &[(Grade, String)],
) -> Result<Schedule, ScheduleError> {
    let (header_idx, header) = grid
        .iter()
        .enumerate()
        .find(|(_, row)| {
            row.iter()
                .filter_map(SheetCell::text)
                .any(|text| labels.iter().any(|(_, label)| label == text))
        })
        .ok_or(ScheduleError::MissingHeader)?;

    let mut label_columns: Vec<(usize, Grade)> = header
        .iter()
        .enumerate()
        .filter_map(|(col, cell)| {
            let text = cell.text()?;
            labels.iter().find(|(_, label)| label == text).map(|(grade, _)| (col, *grade))
        })
        .collect();
    label_columns.sort_by_key(|(col, _)| *col);

    let grade_columns: Vec<(Grade, std::ops::Range<usize>)> = label_columns
        .iter()
        .enumerate()
        .map(|(i, (col, grade))| {
            let next = label_columns.get(i + 1).map_or(usize::MAX, |(c, _)| *c);
            (*grade, *col..next.min(col + MAX_GRADE_COLUMNS))
        })
        .collect();

    let body = &grid[header_idx + 1..];
    let date_col = body
        .iter()
        .find_map(|row| row.iter().position(|cell| matches!(cell, SheetCell::Date(_))))
        .ok_or(ScheduleError::MissingDates)?;

    let dated_rows: Vec<(NaiveDate, &Vec<SheetCell>)> = body
        .iter()
        .filter_map(|row| match row.get(date_col) {
            Some(SheetCell::Date(date)) => Some((*date, row)),
            _ => None,
        })
        .collect();

    let sunday = week_start(today);
    let this_week = sunday..sunday + Duration::days(7);
    if !dated_rows.iter().any(|(date, _)| this_week.contains(date)) {
        return Err(ScheduleError::MissingCurrentWeek(sunday));
    }

    let mut schedule = Schedule::new();
    for (grade, columns) in &grade_columns {
        let weeks: Vec<WeekBucket> = offsets
            .iter()
            .map(|offset| {
                let start = sunday + Duration::days(7 + offset);
                let end = start + Duration::days(DAYS_PER_BUCKET);
                dated_rows
                    .iter()
                    .filter(|(date, _)| (start..end).contains(date))
                    .flat_map(|(date, row)| row_events(row, columns.clone(), *date))
                    .collect()
            })
            .collect();
        schedule.insert(*grade, weeks);
    }
    debug!("Parsed schedule for {} grades", grade_columns.len());
    Ok(schedule)
}

fn row_events(row: &[SheetCell], columns: std::ops::Range<usize>, date: NaiveDate) -> Vec<Event> {
    let mut seen: Vec<&str> = Vec::new();
    let mut events = Vec::new();
    for cell in columns.filter_map(|col| row.get(col)) {
        let Some(text) = cell.text() else { continue };
        if seen.contains(&text) {
            continue;
        }
        seen.push(text);
        events.extend(Event::from_cell_text(text, date));
    }
    events
}

/// Reads the first sheet (by name) starting with `prefix` into a grid.
pub fn read_sheet(bytes: Vec<u8>, prefix: &str) -> Result<Vec<Vec<SheetCell>>, ScheduleError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let name = workbook
        .sheet_names()
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .min()
        .ok_or_else(|| ScheduleError::MissingSheet(prefix.to_string()))?;
    let range = workbook.worksheet_range(&name)?;
    debug!("Reading sheet '{}' ({} rows)", name, range.height());
    Ok(range
        .rows()
        .map(|row| row.iter().map(SheetCell::from).collect())
        .collect())
}

/// Downloads the spreadsheet export on every call.
pub struct SpreadsheetSource {
    client: reqwest::Client,
    url: String,
    sheet_prefix: String,
    labels: Vec<(Grade, String)>,
}

impl SpreadsheetSource {
    pub fn new(url: impl Into<String>, sheet_prefix: impl Into<String>, labels: Vec<(Grade, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            sheet_prefix: sheet_prefix.into(),
            labels,
        }
    }

    async fn download(&self) -> Result<Vec<u8>, ScheduleError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScheduleError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ScheduleSource for SpreadsheetSource {
    async fn get_schedule(&self, offsets: &[i64]) -> Result<Schedule, ScheduleError> {
        let bytes = self.download().await?;
        info!("Downloaded schedule workbook ({} bytes)", bytes.len());
        let grid = read_sheet(bytes, &self.sheet_prefix)?;
        parse_schedule(&grid, Utc::now().date_naive(), offsets, &self.labels)
    }
}

struct CacheEntry {
    fetched_on: NaiveDate,
    offsets: Vec<i64>,
    schedule: Schedule,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Serves one fetch per day: a schedule is reused until the day after it
/// was fetched, or until different offsets are asked for.
pub struct CachedScheduleSource {
    inner: Arc<dyn ScheduleSource>,
    clock: Clock,
    entry: Mutex<Option<CacheEntry>>,
}

impl CachedScheduleSource {
    pub fn new(inner: Arc<dyn ScheduleSource>) -> Self {
        Self::with_clock(inner, Arc::new(|| Utc::now().date_naive()))
    }

    pub fn with_clock(inner: Arc<dyn ScheduleSource>, clock: Clock) -> Self {
        Self {
            inner,
            clock,
            entry: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ScheduleSource for CachedScheduleSource {
    async fn get_schedule(&self, offsets: &[i64]) -> Result<Schedule, ScheduleError> {
        let today = (self.clock)();
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if today <= cached.fetched_on && cached.offsets == offsets {
                debug!("Schedule cache hit (fetched {})", cached.fetched_on);
                return Ok(cached.schedule.clone());
            }
        }

        let schedule = self.inner.get_schedule(offsets).await?;
        *entry = Some(CacheEntry {
            fetched_on: today,
            offsets: offsets.to_vec(),
            schedule: schedule.clone(),
        });
        Ok(schedule)
    }
}
