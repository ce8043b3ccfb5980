//! Paginated read of the post table plus the due-window filter.
//!
//! Rows are accumulated across every page before anything is filtered. A row
//! becomes a [`Record`] only when its due-date field parses; rows without one
//! are dropped silently, so a misspelled field name yields an empty report
//! rather than an error.

use crate::airtable_client::{AirtableError, RecordSource};
use crate::airtable_types::SourceRow;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_DUE_DATE_FIELD: &str = "Due Date";
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_STATUS: &str = "Not Started";
pub const DEFAULT_AUTHOR: &str = "Unassigned";
pub const DEFAULT_PRIORITY: &str = "Medium";

const TITLE_FIELD: &str = "Title";
const STATUS_FIELD: &str = "Status";
const AUTHOR_FIELD: &str = "Author";
const CATEGORY_FIELD: &str = "Category";
const NOTES_FIELD: &str = "Notes";
const WORD_COUNT_FIELD: &str = "Word Count Target";
const PRIORITY_FIELD: &str = "Priority";

// Guards against a source that keeps handing back the same token.
const MAX_PAGES: usize = 1000;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl From<AirtableError> for FetchError {
    fn from(err: AirtableError) -> Self {
        match err {
            AirtableError::SerializationError(e) => FetchError::MalformedResponse(e.to_string()),
            other => FetchError::SourceUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub due_date_field: String,
    pub window_days: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            due_date_field: DEFAULT_DUE_DATE_FIELD.to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// A normalized blog post row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "id")]
    pub identifier: String,
    pub title: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub author: String,
    pub category: String,
    pub priority: String,
    pub notes: String,
    #[serde(rename = "word_count_target")]
    pub target_word_count: u32,
    pub days_until_due: i64,
}

impl Record {
    /// Returns `None` when the due-date field is missing or unparsable.
    pub fn from_row(row: &SourceRow, due_date_field: &str, today: NaiveDate) -> Option<Self> {
        let due_date = row.date(due_date_field)?;

        Some(Record {
            identifier: row.id.clone(),
            title: row.text_or(TITLE_FIELD, DEFAULT_TITLE),
            due_date,
            status: row.text_or(STATUS_FIELD, DEFAULT_STATUS),
            author: row.text_or(AUTHOR_FIELD, DEFAULT_AUTHOR),
            category: row.text_or(CATEGORY_FIELD, ""),
            priority: row.text_or(PRIORITY_FIELD, DEFAULT_PRIORITY),
            notes: row.text_or(NOTES_FIELD, ""),
            target_word_count: row.count_or(WORD_COUNT_FIELD, 0),
            days_until_due: (due_date - today).num_days(),
        })
    }

    pub fn is_urgent(&self) -> bool {
        self.days_until_due <= 2
    }

    pub fn is_not_started(&self) -> bool {
        self.status == DEFAULT_STATUS
    }
}

pub async fn fetch_all_rows<S: RecordSource>(source: &S) -> Result<Vec<SourceRow>, FetchError> {
    let mut rows = Vec::new();
    let mut offset: Option<String> = None;

    for page_no in 1..=MAX_PAGES {
        let page = source.fetch_page(offset.as_deref()).await?;
        debug!(page = page_no, rows = page.records.len(), "fetched page");
        rows.extend(page.records);

        match page.offset {
            Some(next) if offset.as_deref() == Some(next.as_str()) => {
                return Err(FetchError::MalformedResponse(format!(
                    "continuation token {} repeated",
                    next
                )));
            }
            Some(next) => offset = Some(next),
            None => return Ok(rows),
        }
    }

    Err(FetchError::MalformedResponse(format!(
        "pagination did not finish after {} pages",
        MAX_PAGES
    )))
}

/// Keeps rows due in `[today, today + window_days]`, ascending by due date.
/// Rows sharing a due date stay in fetch order.
pub fn filter_due(rows: &[SourceRow], options: &FetchOptions, today: NaiveDate) -> Vec<Record> {
    let window = i64::from(options.window_days);

    let mut records: Vec<Record> = rows
        .iter()
        .filter_map(|row| Record::from_row(row, &options.due_date_field, today))
        .filter(|r| (0..=window).contains(&r.days_until_due))
        .collect();

    records.sort_by_key(|r| r.due_date);
    records
}

pub async fn fetch_due_records<S: RecordSource>(
    source: &S,
    options: &FetchOptions,
    today: NaiveDate,
) -> Result<Vec<Record>, FetchError> {
    let rows = fetch_all_rows(source).await?;
    let records = filter_due(&rows, options, today);

    if !rows.is_empty() && !rows.iter().any(|r| r.fields.contains_key(&options.due_date_field)) {
        warn!(
            field = %options.due_date_field,
            "no row has the due date field, check the configured field name"
        );
    }
    info!(
        fetched = rows.len(),
        kept = records.len(),
        window_days = options.window_days,
        %today,
        "filtered records"
    );

    Ok(records)
}
