mod airtable_client;
mod airtable_types;
mod config;
mod export;
mod fetch;
mod mailer;
mod report;

use airtable_client::AirtableClient;
use chrono::{Local, NaiveDate};
use clap::Parser;
use config::{CONFIG_FILE_NAME, Settings};
use export::{ExportError, ExportFormat};
use fetch::{FetchOptions, Record};
use mailer::{EmailContent, Mailer, SendSummary};
use report::{ReportContext, ReportStats};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The directory holding the config file and exports; `--path` if given
/// (created when missing), the current directory otherwise.
fn working_dir(path: Option<&str>) -> AppResult<PathBuf> {
    let work_dir = if let Some(p) = path {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            fs::create_dir_all(&pb)?;
            println!("📁 Created directory: {}", pb.display());
        }
        if !pb.is_dir() {
            return Err(format!("Path {} is not a directory", pb.display()).into());
        }
        pb.canonicalize()?
    } else {
        env::current_dir()?
    };

    Ok(work_dir)
}

#[derive(Parser)]
#[command(name = "duepost")]
#[command(author, version, about = "email the team the blog posts due in the coming days", long_about = None)]
struct Cli {
    /// path to directory holding report_config.toml and exports (creates if doesn't exist)
    #[arg(short, long, value_name = "DIR")]
    path: Option<String>,

    /// config file to use instead of report_config.toml in the working directory
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// write a default report_config.toml
    #[arg(long)]
    setup: bool,

    /// how many days ahead to include
    #[arg(long, value_name = "N", env = "REPORT_WINDOW_DAYS")]
    days: Option<u32>,

    /// list posts due in the window (default when no other action is given)
    #[arg(short, long)]
    list: bool,

    /// write the report to a file in the working directory
    #[arg(short = 'x', long, value_enum, value_name = "FORMAT")]
    export: Vec<ExportFormat>,

    /// email the report to the configured recipients
    #[arg(short, long)]
    email: bool,

    /// recipients, replacing the configured list
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    to: Vec<String>,

    /// carbon copy recipients
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    cc: Vec<String>,

    /// blind carbon copy recipients
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    bcc: Vec<String>,

    /// subject line instead of the urgency-based default
    #[arg(long)]
    subject: Option<String>,

    /// build the email and show who would get it, without sending
    #[arg(long)]
    dry_run: bool,

    /// run as daemon, emailing the report on report.daemon_schedule
    #[arg(long)]
    daemon: bool,
}

#[derive(Debug, Clone)]
struct EmailOptions {
    subject: Option<String>,
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let dir = match working_dir(cli.path.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error setting up working directory: {}", e);
            std::process::exit(1);
        }
    };

    if cli.path.is_some() {
        println!("📂 Working directory: {}", dir.display());
    }

    if cli.setup {
        if let Err(e) = setup_config(&config_path(&cli, &dir)) {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
        return;
    }

    let settings = match load_settings(&cli, &dir) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let email_options = EmailOptions {
        subject: cli.subject.clone(),
        dry_run: cli.dry_run,
    };

    let result = if cli.daemon {
        run_daemon(settings, email_options).await
    } else {
        run_once(&cli, &dir, &settings, &email_options).await
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(cli: &Cli, dir: &Path) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| dir.join(CONFIG_FILE_NAME))
}

fn load_settings(cli: &Cli, dir: &Path) -> AppResult<Settings> {
    let path = config_path(cli, dir);
    let mut settings = if cli.config.is_some() {
        Settings::load(&path)?
    } else {
        Settings::load_or_default(&path)?
    };
    settings.apply_env();

    if let Some(days) = cli.days {
        settings.report.window_days = days;
    }
    if !cli.to.is_empty() {
        settings.email.recipients = cli.to.clone();
    }
    if !cli.cc.is_empty() {
        settings.email.cc = cli.cc.clone();
    }
    if !cli.bcc.is_empty() {
        settings.email.bcc = cli.bcc.clone();
    }

    Ok(settings)
}

fn setup_config(path: &Path) -> AppResult<()> {
    println!("Setting up report configuration...");

    Settings::write_default(path)?;

    println!("✓ Created {}", path.display());
    println!("Please edit it with your settings:");
    println!("  - airtable.api_key / airtable.base_id: personal access token and base (appXXXX)");
    println!("  - airtable.due_date_field: the date column to filter on");
    println!("  - report.window_days: how many days ahead to include");
    println!("  - email.username/password: Gmail address and an App Password, not the regular password");
    println!("  - email.recipients: who receives the report");
    println!("Secrets can also come from AIRTABLE_API_KEY and GMAIL_APP_PASSWORD.");
    Ok(())
}

async fn run_once(
    cli: &Cli,
    dir: &Path,
    settings: &Settings,
    email_options: &EmailOptions,
) -> AppResult<()> {
    let today = Local::now().date_naive();
    let send = cli.email || cli.dry_run;

    println!("🔍 Fetching blog posts from Airtable...");
    let records = fetch_posts(settings, today).await?;
    let ctx = report_context(settings);

    if cli.list || (!send && cli.export.is_empty()) {
        report::display_records(&records, settings.report.window_days);
    }

    for format in &cli.export {
        let path = match format {
            ExportFormat::Eml => write_draft(dir, settings, &records, &ctx, email_options)?,
            ExportFormat::GmailUrl => {
                let subject = subject_for(email_options, &ReportStats::from_records(&records));
                let url = export::gmail_compose_url(&subject, &report::render_plain_text(&records, &ctx));
                export::write_file(dir, *format, url.as_bytes())?
            }
            _ => export::export(*format, &records, &ctx, dir)?,
        };
        println!("✅ Exported {} posts to {}", records.len(), path.display());
    }

    if send {
        send_report(settings, &records, &ctx, email_options).await?;
    }

    Ok(())
}

async fn fetch_posts(settings: &Settings, today: NaiveDate) -> AppResult<Vec<Record>> {
    settings.validate_for_fetch()?;

    let client = AirtableClient::new(&settings.airtable)?;
    let options = FetchOptions {
        due_date_field: settings.airtable.due_date_field.clone(),
        window_days: settings.report.window_days,
    };

    let records = fetch::fetch_due_records(&client, &options, today).await?;
    Ok(records)
}

fn report_context(settings: &Settings) -> ReportContext {
    ReportContext {
        title: settings.report.title.clone(),
        generated_at: Local::now().naive_local(),
        base_link: settings.report.base_link.clone(),
    }
}

fn email_content(
    settings: &Settings,
    records: &[Record],
    ctx: &ReportContext,
) -> Result<EmailContent, ExportError> {
    let json_attachment = if settings.email.attach_json {
        let name = format!("blog_posts_{}.json", ctx.generated_at.format("%Y%m%d"));
        Some((name, export::to_json(records)?))
    } else {
        None
    };

    Ok(EmailContent {
        text: report::render_plain_text(records, ctx),
        html: report::render_html(records, ctx),
        json_attachment,
        stats: ReportStats::from_records(records),
    })
}

fn subject_for(email_options: &EmailOptions, stats: &ReportStats) -> String {
    email_options
        .subject
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| mailer::default_subject(stats))
}

fn write_draft(
    dir: &Path,
    settings: &Settings,
    records: &[Record],
    ctx: &ReportContext,
    email_options: &EmailOptions,
) -> AppResult<PathBuf> {
    let content = email_content(settings, records, ctx)?;
    let delivery = mailer::plan_deliveries(
        &settings.email.recipients,
        &settings.email.cc,
        &settings.email.bcc,
    )
    .into_iter()
    .next()
    .ok_or("an .eml draft needs at least one recipient (email.recipients or --to)")?;

    let subject = subject_for(email_options, &content.stats);
    let message = Mailer::new(settings.email.clone()).build_message(&delivery, &subject, &content)?;
    let path = export::write_file(dir, ExportFormat::Eml, &message.formatted())?;
    Ok(path)
}

async fn send_report(
    settings: &Settings,
    records: &[Record],
    ctx: &ReportContext,
    email_options: &EmailOptions,
) -> AppResult<SendSummary> {
    if !email_options.dry_run {
        settings.validate_for_email()?;
    } else if settings.email.recipients.is_empty() {
        return Err("No recipients configured (email.recipients, GMAIL_AUTO_RECIPIENTS or --to)".into());
    }

    let content = email_content(settings, records, ctx)?;
    let subject = subject_for(email_options, &content.stats);
    let deliveries = mailer::plan_deliveries(
        &settings.email.recipients,
        &settings.email.cc,
        &settings.email.bcc,
    );

    println!(
        "{}",
        delivery_banner(settings.email.recipients.len(), email_options.dry_run)
    );

    let mailer = Mailer::new(settings.email.clone());
    let dry_run = email_options.dry_run;
    let summary = tokio::task::spawn_blocking(move || {
        mailer.send_all(&deliveries, &subject, &content, dry_run)
    })
    .await?;

    summary.print();
    info!(
        sent = summary.successful.len(),
        failed = summary.failed.len(),
        posts = records.len(),
        "report delivery finished"
    );

    if summary.successful.is_empty() && !summary.failed.is_empty() {
        return Err("Failed to deliver the report to any recipient".into());
    }
    Ok(summary)
}

fn delivery_banner(recipients: usize, dry_run: bool) -> String {
    if dry_run {
        format!(
            "📧 Preparing report for {} recipient(s) (dry run, nothing will be sent)",
            recipients
        )
    } else {
        format!("📧 Sending report to {} recipient(s)", recipients)
    }
}

async fn email_report(settings: &Settings, email_options: &EmailOptions) -> AppResult<()> {
    let today = Local::now().date_naive();
    let records = fetch_posts(settings, today).await?;
    let ctx = report_context(settings);
    send_report(settings, &records, &ctx, email_options).await?;
    Ok(())
}

async fn run_daemon(settings: Settings, email_options: EmailOptions) -> AppResult<()> {
    settings.validate_for_fetch()?;
    if !email_options.dry_run {
        settings.validate_for_email()?;
    }

    let schedule = settings.report.daemon_schedule.clone();
    println!("🔄 Starting duepost daemon...");
    println!("📧 Report will be emailed on schedule \"{}\" (UTC)", schedule);
    println!("💡 Press Ctrl+C to stop");

    let settings = Arc::new(settings);
    let email_options = Arc::new(email_options);

    let sched = JobScheduler::new().await?;

    let job = Job::new_async(schedule.as_str(), move |_uuid, _l| {
        let settings = Arc::clone(&settings);
        let email_options = Arc::clone(&email_options);
        Box::pin(async move {
            println!(
                "[{}] Running scheduled report...",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            if let Err(e) = email_report(&settings, &email_options).await {
                eprintln!("Failed to send scheduled report: {}", e);
            }
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    println!("👋 Stopping daemon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_lists_and_formats() {
        let cli = Cli::try_parse_from([
            "duepost",
            "--days",
            "14",
            "-x",
            "csv",
            "--export",
            "eml",
            "--to",
            "a@example.com,b@example.com",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.days, Some(14));
        assert_eq!(cli.export, vec![ExportFormat::Csv, ExportFormat::Eml]);
        assert_eq!(cli.to, vec!["a@example.com", "b@example.com"]);
        assert!(cli.dry_run);
        assert!(!cli.email);
    }

    #[test]
    fn test_cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "[report]\nwindow_days = 3\n\n[email]\nrecipients = [\"team@example.com\"]\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "duepost",
            "--config",
            path.to_str().unwrap(),
            "--days",
            "10",
            "--cc",
            "lead@example.com",
        ])
        .unwrap();

        let settings = load_settings(&cli, dir.path()).unwrap();
        assert_eq!(settings.report.window_days, 10);
        assert_eq!(settings.email.recipients, vec!["team@example.com"]);
        assert_eq!(settings.email.cc, vec!["lead@example.com"]);
    }

    #[test]
    fn test_subject_override() {
        let stats = ReportStats {
            total: 2,
            urgent: 0,
            not_started: 0,
        };
        let custom = EmailOptions {
            subject: Some("Posts this week".to_string()),
            dry_run: false,
        };
        assert_eq!(subject_for(&custom, &stats), "Posts this week");

        let blank = EmailOptions {
            subject: Some("  ".to_string()),
            dry_run: false,
        };
        assert_eq!(
            subject_for(&blank, &stats),
            "Weekly Blog Schedule - 2 Posts Due This Week"
        );
    }

    #[test]
    fn test_working_dir_is_created_and_holds_config() {
        let root = tempfile::tempdir().unwrap();
        let wanted = root.path().join("reports").join("weekly");

        let dir = working_dir(wanted.to_str()).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, wanted.canonicalize().unwrap());

        let cli = Cli::try_parse_from(["duepost"]).unwrap();
        assert_eq!(config_path(&cli, &dir), dir.join(CONFIG_FILE_NAME));

        let cli = Cli::try_parse_from(["duepost", "--config", "/etc/duepost.toml"]).unwrap();
        assert_eq!(config_path(&cli, &dir), PathBuf::from("/etc/duepost.toml"));
    }

    #[test]
    fn test_working_dir_rejects_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not_a_dir");
        fs::write(&file, "").unwrap();
        assert!(working_dir(file.to_str()).is_err());
    }

    #[test]
    fn test_delivery_banner() {
        assert_eq!(delivery_banner(3, false), "📧 Sending report to 3 recipient(s)");

        let dry = delivery_banner(2, true);
        assert!(!dry.contains("Sending"));
        assert!(dry.contains("dry run, nothing will be sent"));
    }
}
