use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "report_config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}. Run with --setup first.")]
    NotFound(String),

    #[error("Config file already exists: {0}")]
    AlreadyExists(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub airtable: AirtableConfig,
    pub report: ReportConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AirtableConfig {
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    pub due_date_field: String,
    pub page_size: u32,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        AirtableConfig {
            api_url: "https://api.airtable.com/v0".to_string(),
            api_key: String::new(),
            base_id: String::new(),
            table_name: "Blog Posts".to_string(),
            view: None,
            due_date_field: "Due Date".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub window_days: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_link: Option<String>,
    pub daemon_schedule: String, // sec min hour day month weekday, UTC
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            window_days: 7,
            title: "Weekly Blog Post Schedule".to_string(),
            base_link: None,
            daemon_schedule: "0 0 8 * * Mon".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub sender_name: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attach_json: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            sender_name: "Blog Report System".to_string(),
            recipients: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            attach_json: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Falls back to defaults when the file is absent so that a pure
    /// environment-variable setup still works.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.display().to_string()));
        }

        let content = toml::to_string_pretty(&Settings::default())?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AIRTABLE_API_KEY") {
            self.airtable.api_key = v;
        }
        if let Some(v) = get("AIRTABLE_BASE_ID") {
            self.airtable.base_id = v;
        }
        if let Some(v) = get("AIRTABLE_TABLE_NAME") {
            self.airtable.table_name = v;
        }
        if let Some(v) = get("AIRTABLE_DUE_DATE_FIELD") {
            self.airtable.due_date_field = v;
        }
        if let Some(v) = get("AIRTABLE_VIEW") {
            self.airtable.view = Some(v);
        }
        if let Some(v) = get("GMAIL_SENDER_EMAIL") {
            if self.email.username.is_empty() {
                self.email.username = v.clone();
            }
            self.email.from_email = v;
        }
        if let Some(v) = get("GMAIL_APP_PASSWORD") {
            self.email.password = v;
        }
        if let Some(v) = get("GMAIL_SENDER_NAME") {
            self.email.sender_name = v;
        }
        if let Some(v) = get("GMAIL_AUTO_RECIPIENTS") {
            self.email.recipients = split_addresses(&v);
        }
        if let Some(v) = get("GMAIL_ATTACH_JSON") {
            self.email.attach_json = v.trim().eq_ignore_ascii_case("true");
        }
    }

    pub fn validate_for_fetch(&self) -> Result<(), ConfigError> {
        if self.airtable.api_key.is_empty() {
            return Err(ConfigError::Missing("airtable.api_key (or AIRTABLE_API_KEY)"));
        }
        if self.airtable.base_id.is_empty() {
            return Err(ConfigError::Missing("airtable.base_id (or AIRTABLE_BASE_ID)"));
        }
        Ok(())
    }

    pub fn validate_for_email(&self) -> Result<(), ConfigError> {
        if self.email.username.is_empty() {
            return Err(ConfigError::Missing("email.username"));
        }
        if self.email.password.is_empty() {
            return Err(ConfigError::Missing("email.password (or GMAIL_APP_PASSWORD)"));
        }
        if self.email.from_email.is_empty() {
            return Err(ConfigError::Missing("email.from_email (or GMAIL_SENDER_EMAIL)"));
        }
        if self.email.recipients.is_empty() {
            return Err(ConfigError::Missing("email.recipients (or GMAIL_AUTO_RECIPIENTS)"));
        }
        Ok(())
    }
}

pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
