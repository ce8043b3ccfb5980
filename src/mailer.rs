use crate::config::EmailConfig;
use crate::report::ReportStats;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, warn};

// Above this many urgent posts the mail goes out flagged high priority.
const HIGH_PRIORITY_URGENT_THRESHOLD: usize = 5;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Invalid attachment: {0}")]
    Attachment(String),

    #[error("SMTP authentication failed: {0}")]
    AuthFailed(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// `X-Priority` header, 1 (highest) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XPriority(pub u8);

impl Header for XPriority {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Priority")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(XPriority(s.trim().parse()?))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.to_string())
    }
}

impl XPriority {
    pub fn for_stats(stats: &ReportStats) -> Self {
        if stats.urgent > HIGH_PRIORITY_URGENT_THRESHOLD {
            XPriority(2)
        } else {
            XPriority(3)
        }
    }
}

/// Rendered report bodies plus the optional JSON attachment.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub text: String,
    pub html: String,
    pub json_attachment: Option<(String, String)>, // (file name, body)
    pub stats: ReportStats,
}

/// One outgoing message's addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SendSummary {
    pub successful: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Recipients get one message each. When copies are requested, a single
/// message goes to all primary recipients together with the CC/BCC list.
pub fn plan_deliveries(recipients: &[String], cc: &[String], bcc: &[String]) -> Vec<Delivery> {
    if cc.is_empty() && bcc.is_empty() {
        recipients
            .iter()
            .map(|r| Delivery {
                to: vec![r.clone()],
                cc: Vec::new(),
                bcc: Vec::new(),
            })
            .collect()
    } else if recipients.is_empty() {
        Vec::new()
    } else {
        vec![Delivery {
            to: recipients.to_vec(),
            cc: cc.to_vec(),
            bcc: bcc.to_vec(),
        }]
    }
}

pub fn default_subject(stats: &ReportStats) -> String {
    if stats.urgent > 0 {
        format!(
            "🔴 {} URGENT Posts Due - Weekly Blog Schedule ({} total)",
            stats.urgent, stats.total
        )
    } else {
        format!("Weekly Blog Schedule - {} Posts Due This Week", stats.total)
    }
}

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Mailer { config }
    }

    fn sender(&self) -> Result<Mailbox, MailError> {
        let name = Some(self.config.sender_name.clone()).filter(|n| !n.is_empty());
        Ok(Mailbox::new(name, self.config.from_email.parse()?))
    }

    pub fn build_message(
        &self,
        delivery: &Delivery,
        subject: &str,
        content: &EmailContent,
    ) -> Result<Message, MailError> {
        let mut builder = Message::builder()
            .from(self.sender()?)
            .subject(subject)
            .header(XPriority::for_stats(&content.stats));

        for to in &delivery.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        for cc in &delivery.cc {
            builder = builder.cc(cc.parse::<Mailbox>()?);
        }
        for bcc in &delivery.bcc {
            builder = builder.bcc(bcc.parse::<Mailbox>()?);
        }

        let body = MultiPart::alternative_plain_html(content.text.clone(), content.html.clone());

        let message = match &content.json_attachment {
            Some((file_name, json)) => {
                let content_type = ContentType::parse("application/json")
                    .map_err(|e| MailError::Attachment(e.to_string()))?;
                let attachment = Attachment::new(file_name.clone()).body(json.clone(), content_type);
                builder.multipart(MultiPart::mixed().multipart(body).singlepart(attachment))?
            }
            None => builder.multipart(body)?,
        };

        Ok(message)
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = SmtpTransport::starttls_relay(&self.config.smtp_server)?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();
        Ok(mailer)
    }

    pub fn send(&self, message: &Message) -> Result<(), MailError> {
        let transport = self.transport()?;
        debug!(server = %self.config.smtp_server, port = self.config.smtp_port, "submitting message");

        transport.send(message).map(|_| ()).map_err(|e| {
            if is_auth_failure(&e) {
                MailError::AuthFailed(e.to_string())
            } else {
                MailError::Smtp(e)
            }
        })
    }

    /// Builds and sends every delivery, continuing past failures. With
    /// `dry_run` the messages are built and summarised but never submitted.
    pub fn send_all(
        &self,
        deliveries: &[Delivery],
        subject: &str,
        content: &EmailContent,
        dry_run: bool,
    ) -> SendSummary {
        let mut summary = SendSummary::default();

        for delivery in deliveries {
            let label = delivery.to.join(", ");
            let result = self
                .build_message(delivery, subject, content)
                .and_then(|message| {
                    if dry_run {
                        print_dry_run(&self.config.from_email, delivery, subject, content);
                        Ok(())
                    } else {
                        println!("📧 Sending to {}...", label);
                        self.send(&message)
                    }
                });

            match result {
                Ok(()) => summary.successful.push(label),
                Err(e) => {
                    if let MailError::AuthFailed(_) = e {
                        print_auth_help();
                    }
                    warn!(recipient = %label, error = %e, "delivery failed");
                    summary.failed.push((label, e.to_string()));
                }
            }
        }

        summary
    }
}

fn is_auth_failure(err: &lettre::transport::smtp::Error) -> bool {
    err.status()
        .map(|code| code.to_string() == "535")
        .unwrap_or(false)
}

fn print_dry_run(from: &str, delivery: &Delivery, subject: &str, content: &EmailContent) {
    println!("📧 DRY RUN - Email prepared but not sent");
    println!("   From: {}", from);
    println!("   To: {}", delivery.to.join(", "));
    if !delivery.cc.is_empty() {
        println!("   CC: {}", delivery.cc.join(", "));
    }
    if !delivery.bcc.is_empty() {
        println!("   BCC: {}", delivery.bcc.join(", "));
    }
    println!("   Subject: {}", subject);
    println!("   Posts included: {}", content.stats.total);
}

fn print_auth_help() {
    eprintln!("❌ Authentication failed!");
    eprintln!("   Please check:");
    eprintln!("   1. The sender address is correct");
    eprintln!("   2. You're using an App Password, not the account password");
    eprintln!("   3. 2-Step Verification is enabled on the Google account");
    eprintln!("   App Passwords: https://myaccount.google.com/apppasswords");
}

impl SendSummary {
    pub fn print(&self) {
        println!("\n{}", "=".repeat(50));
        println!("📊 SENDING SUMMARY");
        println!("{}", "=".repeat(50));
        println!("✅ Successful: {}", self.successful.len());
        for email in &self.successful {
            println!("   • {}", email);
        }

        if !self.failed.is_empty() {
            println!("\n❌ Failed: {}", self.failed.len());
            for (email, reason) in &self.failed {
                println!("   • {} ({})", email, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            username: "bot@example.com".to_string(),
            password: "app-password".to_string(),
            from_email: "bot@example.com".to_string(),
            ..EmailConfig::default()
        }
    }

    fn content(urgent: usize, attach: bool) -> EmailContent {
        EmailContent {
            text: "plain body".to_string(),
            html: "<p>html body</p>".to_string(),
            json_attachment: attach.then(|| ("blog_posts_20240113.json".to_string(), "[]".to_string())),
            stats: ReportStats {
                total: 8,
                urgent,
                not_started: 1,
            },
        }
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subjects() {
        let calm = ReportStats { total: 4, urgent: 0, not_started: 0 };
        assert_eq!(default_subject(&calm), "Weekly Blog Schedule - 4 Posts Due This Week");

        let busy = ReportStats { total: 4, urgent: 3, not_started: 0 };
        assert_eq!(
            default_subject(&busy),
            "🔴 3 URGENT Posts Due - Weekly Blog Schedule (4 total)"
        );
    }

    #[test]
    fn test_priority_threshold() {
        let stats = |urgent| ReportStats { total: 10, urgent, not_started: 0 };
        assert_eq!(XPriority::for_stats(&stats(5)), XPriority(3));
        assert_eq!(XPriority::for_stats(&stats(6)), XPriority(2));
    }

    #[test]
    fn test_plan_individual_deliveries() {
        let plan = plan_deliveries(&addrs(&["a@example.com", "b@example.com"]), &[], &[]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].to, addrs(&["b@example.com"]));
    }

    #[test]
    fn test_plan_with_copies() {
        let plan = plan_deliveries(
            &addrs(&["a@example.com", "b@example.com"]),
            &addrs(&["lead@example.com"]),
            &addrs(&["archive@example.com"]),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].to.len(), 2);
        assert_eq!(plan[0].cc, addrs(&["lead@example.com"]));

        assert!(plan_deliveries(&[], &addrs(&["lead@example.com"]), &[]).is_empty());
    }

    #[test]
    fn test_build_message_headers() {
        let mailer = Mailer::new(config());
        let delivery = Delivery {
            to: addrs(&["editor@example.com"]),
            cc: addrs(&["lead@example.com"]),
            bcc: addrs(&["archive@example.com"]),
        };

        let message = mailer
            .build_message(&delivery, "Weekly report", &content(6, false))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Weekly report"));
        assert!(raw.contains("X-Priority: 2"));
        assert!(raw.contains("Blog Report System"));
        assert!(raw.contains("multipart/alternative"));
        assert!(!raw.contains("multipart/mixed"));

        let envelope_to: Vec<String> = message.envelope().to().iter().map(|a| a.to_string()).collect();
        assert!(envelope_to.contains(&"archive@example.com".to_string()));
        assert!(envelope_to.contains(&"lead@example.com".to_string()));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mailer = Mailer::new(config());
        let delivery = plan_deliveries(&addrs(&["editor@example.com"]), &[], &[]).remove(0);

        let message = mailer
            .build_message(&delivery, "Weekly report", &content(0, true))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("blog_posts_20240113.json"));
        assert!(raw.contains("X-Priority: 3"));
    }

    #[test]
    fn test_bad_address_rejected() {
        let mailer = Mailer::new(config());
        let delivery = Delivery {
            to: addrs(&["not-an-address"]),
            cc: Vec::new(),
            bcc: Vec::new(),
        };
        assert!(matches!(
            mailer.build_message(&delivery, "x", &content(0, false)),
            Err(MailError::Address(_))
        ));
    }

    #[test]
    fn test_dry_run_records_success_without_connecting() {
        let mailer = Mailer::new(config());
        let plan = plan_deliveries(&addrs(&["a@example.com", "broken"]), &[], &[]);

        let summary = mailer.send_all(&plan, "Weekly report", &content(0, false), true);
        assert_eq!(summary.successful, addrs(&["a@example.com"]));
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "broken");
    }
}
