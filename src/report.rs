use crate::fetch::{DEFAULT_AUTHOR, Record};
use chrono::{NaiveDate, NaiveDateTime};
use comrak::{Options, markdown_to_html};
use std::collections::BTreeMap;

const TEXT_NOTES_PREVIEW: usize = 100;
const HTML_NOTES_PREVIEW: usize = 150;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStats {
    pub total: usize,
    pub urgent: usize,
    pub not_started: usize,
}

impl ReportStats {
    pub fn from_records(records: &[Record]) -> Self {
        ReportStats {
            total: records.len(),
            urgent: records.iter().filter(|r| r.is_urgent()).count(),
            not_started: records.iter().filter(|r| r.is_not_started()).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Urgent,
    DueSoon,
    Normal,
}

impl Urgency {
    pub fn from_days(days: i64) -> Self {
        if days <= 1 {
            Urgency::Urgent
        } else if days <= 2 {
            Urgency::DueSoon
        } else {
            Urgency::Normal
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Urgency::Urgent => Some("URGENT"),
            Urgency::DueSoon => Some("DUE SOON"),
            Urgency::Normal => None,
        }
    }
}

/// Header and footer text shared by every rendering.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub title: String,
    pub generated_at: NaiveDateTime,
    pub base_link: Option<String>,
}

impl ReportContext {
    fn generated_line(&self) -> String {
        self.generated_at.format("%B %d, %Y at %I:%M %p").to_string()
    }
}

pub fn group_by_due_date(records: &[Record]) -> BTreeMap<NaiveDate, Vec<&Record>> {
    let mut groups: BTreeMap<NaiveDate, Vec<&Record>> = BTreeMap::new();
    for record in records {
        groups.entry(record.due_date).or_default().push(record);
    }
    groups
}

pub fn date_heading(date: &NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

pub fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Makes an Airtable cell safe to splice into one Markdown line: whitespace
/// runs (newlines included) collapse to a space and inline metacharacters
/// are backslash-escaped.
pub fn md_inline(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(flat.len());
    for c in flat.chars() {
        if matches!(
            c,
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '#' | '|' | '!' | '~' | '&'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn render_plain_text(records: &[Record], ctx: &ReportContext) -> String {
    let stats = ReportStats::from_records(records);
    let rule = "=".repeat(RULE_WIDTH);

    let mut text = format!("{}\n{}\n\n", ctx.title.to_uppercase(), rule);
    text.push_str(&format!("Report Generated: {}\n\n", ctx.generated_line()));

    text.push_str("SUMMARY\n");
    text.push_str(&format!("{}\n", "-".repeat(30)));
    text.push_str(&format!("Total Posts Due: {}\n", stats.total));
    text.push_str(&format!("Urgent (≤2 days): {}\n", stats.urgent));
    text.push_str(&format!("Not Started: {}\n\n", stats.not_started));

    for (date, posts) in group_by_due_date(records) {
        text.push_str(&format!("\n{}\n{}", rule, date_heading(&date)));
        let days = posts.first().map(|p| p.days_until_due).unwrap_or_default();
        if let Some(label) = Urgency::from_days(days).label() {
            text.push_str(&format!(" [{}]", label));
        }
        text.push_str(&format!("\n{}\n\n", rule));

        for (i, post) in posts.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, post.title));
            text.push_str(&format!("   Status: {}\n", post.status));
            text.push_str(&format!("   Priority: {}\n", post.priority));
            text.push_str(&format!("   Days Until Due: {}\n", post.days_until_due));
            if post.author != DEFAULT_AUTHOR {
                text.push_str(&format!("   Author: {}\n", post.author));
            }
            if !post.category.is_empty() {
                text.push_str(&format!("   Category: {}\n", post.category));
            }
            if post.target_word_count > 0 {
                text.push_str(&format!("   Target Words: {}\n", post.target_word_count));
            }
            if !post.notes.is_empty() {
                text.push_str(&format!(
                    "   Notes: {}\n",
                    preview(&post.notes, TEXT_NOTES_PREVIEW)
                ));
            }
            text.push('\n');
        }
    }

    text.push_str(&format!("\n{}\n", "-".repeat(RULE_WIDTH)));
    text.push_str("This report was automatically generated from Airtable data.\n");
    if let Some(link) = &ctx.base_link {
        text.push_str(&format!("To update: {}\n", link));
    }

    text
}

fn render_markdown_with(records: &[Record], ctx: &ReportContext, notes_limit: usize) -> String {
    let stats = ReportStats::from_records(records);

    let mut md = format!("# {}\n\n", md_inline(&ctx.title));
    md.push_str(&format!("*Generated: {}*\n\n", ctx.generated_line()));
    md.push_str("| Total Posts Due | Urgent (≤2 days) | Not Started |\n");
    md.push_str("|---|---|---|\n");
    md.push_str(&format!(
        "| {} | {} | {} |\n\n",
        stats.total, stats.urgent, stats.not_started
    ));

    if records.is_empty() {
        md.push_str("No blog posts are due in this window.\n\n");
    }

    for (date, posts) in group_by_due_date(records) {
        md.push_str(&format!("## {}", date_heading(&date)));
        let days = posts.first().map(|p| p.days_until_due).unwrap_or_default();
        if let Some(label) = Urgency::from_days(days).label() {
            md.push_str(&format!(" **{}**", label));
        }
        md.push_str("\n\n");

        for post in posts {
            md.push_str(&format!("### {}\n", md_inline(&post.title)));
            md.push_str(&format!("- **Status:** {}\n", md_inline(&post.status)));
            md.push_str(&format!("- **Priority:** {}\n", md_inline(&post.priority)));
            md.push_str(&format!("- **Days Until Due:** {}\n", post.days_until_due));
            if post.author != DEFAULT_AUTHOR {
                md.push_str(&format!("- **Author:** {}\n", md_inline(&post.author)));
            }
            if !post.category.is_empty() {
                md.push_str(&format!("- **Category:** {}\n", md_inline(&post.category)));
            }
            if post.target_word_count > 0 {
                md.push_str(&format!("- **Target Words:** {}\n", post.target_word_count));
            }
            if !post.notes.is_empty() {
                let flat = post.notes.split_whitespace().collect::<Vec<_>>().join(" ");
                md.push_str(&format!("- **Notes:** {}\n", md_inline(&preview(&flat, notes_limit))));
            }
            md.push('\n');
        }
    }

    md.push_str("---\n\n");
    md.push_str("This report was automatically generated from Airtable data.");
    if let Some(link) = &ctx.base_link {
        md.push_str(&format!(" [Open the Airtable base]({})", link));
    }
    md.push('\n');

    md
}

pub fn render_markdown(records: &[Record], ctx: &ReportContext) -> String {
    render_markdown_with(records, ctx, TEXT_NOTES_PREVIEW)
}

pub fn render_html(records: &[Record], ctx: &ReportContext) -> String {
    let mut options = Options::default();
    options.extension.table = true;
    // raw HTML coming from Airtable cells is escaped
    options.render.escape = true;

    let body = markdown_to_html(&render_markdown_with(records, ctx, HTML_NOTES_PREVIEW), &options);

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        HTML_STYLE, body
    )
}

const HTML_STYLE: &str = "\
body { font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; line-height: 1.6; }
h1 { color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 10px; }
h2 { color: #34495e; background: #ecf0f1; padding: 10px; border-left: 4px solid #3498db; }
h2 strong { color: #dc3545; }
table { border-collapse: collapse; }
td, th { border: 1px solid #dee2e6; padding: 6px 14px; }
";

/// Terminal listing for `--list`.
pub fn display_records(records: &[Record], window_days: u32) {
    if records.is_empty() {
        println!("No blog posts due in the next {} days.", window_days);
        return;
    }

    println!(
        "\n📝 Blog Posts Due in the Next {} Days ({} total)",
        window_days,
        records.len()
    );
    println!("{}", "=".repeat(RULE_WIDTH));

    for post in records {
        let marker = match Urgency::from_days(post.days_until_due) {
            Urgency::Urgent => "🔴",
            Urgency::DueSoon => "🟡",
            Urgency::Normal => "📌",
        };
        println!("\n{} {}", marker, post.title);
        println!(
            "   Due: {} ({} days)",
            post.due_date.format("%Y-%m-%d"),
            post.days_until_due
        );
        println!("   Status: {}", post.status);
        println!("   Author: {}", post.author);
        println!("   Priority: {}", post.priority);
        if !post.category.is_empty() {
            println!("   Category: {}", post.category);
        }
        if post.target_word_count > 0 {
            println!("   Target Word Count: {}", post.target_word_count);
        }
        if !post.notes.is_empty() {
            println!("   Notes: {}", preview(&post.notes, TEXT_NOTES_PREVIEW));
        }
    }

    println!("\n{}", "=".repeat(RULE_WIDTH));
}
