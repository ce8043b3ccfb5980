use crate::fetch::Record;
use crate::mailer;
use crate::report::{self, ReportContext, ReportStats};
use clap::ValueEnum;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    CsvBuffer(String),

    #[error("{0} is written from a built email message, not rendered directly")]
    NeedsMessage(&'static str),
}

const GMAIL_COMPOSE: &str = "https://mail.google.com/mail/?view=cm&fs=1";

/// Gmail rejects compose links much past 2k characters.
const GMAIL_BODY_LIMIT: usize = 1900;

// unreserved characters stay as they are, like a query component
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
    Html,
    Text,
    Eml,
    GmailUrl,
}

impl ExportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "blog_posts_due.json",
            ExportFormat::Csv => "blog_posts.csv",
            ExportFormat::Markdown => "blog_posts_report.md",
            ExportFormat::Html => "email_content.html",
            ExportFormat::Text => "email_content.txt",
            ExportFormat::Eml => "email_draft.eml",
            ExportFormat::GmailUrl => "gmail_compose_url.txt",
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    due_date: String,
    days_until_due: i64,
    status: &'a str,
    priority: &'a str,
    author: &'a str,
    category: &'a str,
    word_count_target: u32,
}

pub fn to_json(records: &[Record]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn to_csv(records: &[Record]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for r in records {
        writer.serialize(CsvRow {
            title: &r.title,
            due_date: r.due_date.format("%Y-%m-%d").to_string(),
            days_until_due: r.days_until_due,
            status: &r.status,
            priority: &r.priority,
            author: &r.author,
            category: &r.category,
            word_count_target: r.target_word_count,
        })?;
    }
    if records.is_empty() {
        writer.write_record([
            "title",
            "due_date",
            "days_until_due",
            "status",
            "priority",
            "author",
            "category",
            "word_count_target",
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::CsvBuffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::CsvBuffer(e.to_string()))
}

/// A Gmail "compose" link prefilled with `subject` and the first
/// 1900 characters of `body`.
pub fn gmail_compose_url(subject: &str, body: &str) -> String {
    let body: String = body.chars().take(GMAIL_BODY_LIMIT).collect();
    format!(
        "{}&su={}&body={}",
        GMAIL_COMPOSE,
        utf8_percent_encode(subject, QUERY_VALUE),
        utf8_percent_encode(&body, QUERY_VALUE)
    )
}

/// Renders `format` for the records. `Eml` needs a built message and is
/// written through [`write_file`] by the caller instead.
pub fn render(format: ExportFormat, records: &[Record], ctx: &ReportContext) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(records),
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Markdown => Ok(report::render_markdown(records, ctx)),
        ExportFormat::Html => Ok(report::render_html(records, ctx)),
        ExportFormat::Text => Ok(report::render_plain_text(records, ctx)),
        ExportFormat::GmailUrl => {
            let subject = mailer::default_subject(&ReportStats::from_records(records));
            Ok(gmail_compose_url(&subject, &report::render_plain_text(records, ctx)))
        }
        ExportFormat::Eml => Err(ExportError::NeedsMessage(format.file_name())),
    }
}

pub fn write_file(dir: &Path, format: ExportFormat, content: &[u8]) -> Result<PathBuf, ExportError> {
    let path = dir.join(format.file_name());
    fs::write(&path, content)?;
    Ok(path)
}

pub fn export(
    format: ExportFormat,
    records: &[Record],
    ctx: &ReportContext,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let content = render(format, records, ctx)?;
    write_file(dir, format, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Vec<Record> {
        vec![Record {
            identifier: "rec1".to_string(),
            title: "Commas, \"quotes\" and all".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: "Not Started".to_string(),
            author: "Unassigned".to_string(),
            category: "News".to_string(),
            priority: "High".to_string(),
            notes: "internal only".to_string(),
            target_word_count: 900,
            days_until_due: 2,
        }]
    }

    fn ctx() -> ReportContext {
        ReportContext {
            title: "Weekly Blog Post Schedule".to_string(),
            generated_at: NaiveDate::from_ymd_opt(2024, 1, 13)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            base_link: None,
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &value[0];
        assert_eq!(first["id"], "rec1");
        assert_eq!(first["due_date"], "2024-01-15");
        assert_eq!(first["word_count_target"], 900);
        assert_eq!(first["days_until_due"], 2);
    }

    #[test]
    fn test_csv_quotes_and_skips_notes() {
        let csv = to_csv(&sample()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("title,due_date,days_until_due,status,priority,author,category,word_count_target")
        );
        assert_eq!(
            lines.next(),
            Some("\"Commas, \"\"quotes\"\" and all\",2024-01-15,2,Not Started,High,Unassigned,News,900")
        );
        assert!(!csv.contains("internal only"));
    }

    #[test]
    fn test_csv_empty_has_header() {
        let csv = to_csv(&[]).unwrap();
        assert!(csv.starts_with("title,due_date"));
    }

    #[test]
    fn test_export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(ExportFormat::Markdown, &sample(), &ctx(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("blog_posts_report.md"));

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("### Commas"));
    }

    #[test]
    fn test_eml_is_not_rendered_as_text() {
        let err = render(ExportFormat::Eml, &sample(), &ctx()).unwrap_err();
        assert!(matches!(err, ExportError::NeedsMessage("email_draft.eml")));

        let dir = tempfile::tempdir().unwrap();
        assert!(export(ExportFormat::Eml, &sample(), &ctx(), dir.path()).is_err());
        assert!(!dir.path().join("email_draft.eml").exists());
    }

    #[test]
    fn test_gmail_compose_url() {
        let url = gmail_compose_url("Posts due: 3 & more", "Line one\nsecond_line ~ok");
        assert_eq!(
            url,
            "https://mail.google.com/mail/?view=cm&fs=1\
             &su=Posts%20due%3A%203%20%26%20more\
             &body=Line%20one%0Asecond_line%20~ok"
        );
    }

    #[test]
    fn test_gmail_compose_url_truncates_body() {
        let body = "é".repeat(2500);
        let url = gmail_compose_url("s", &body);
        let encoded_body = url.split("&body=").nth(1).unwrap();
        assert_eq!(encoded_body, "%C3%A9".repeat(1900));
    }

    #[test]
    fn test_gmail_export_uses_report_subject() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(ExportFormat::GmailUrl, &sample(), &ctx(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("gmail_compose_url.txt"));

        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("https://mail.google.com/mail/?view=cm&fs=1&su=%F0%9F%94%B4%201%20URGENT"));
        assert!(content.contains("&body="));
        assert!(!content.contains(' '));
    }
}
