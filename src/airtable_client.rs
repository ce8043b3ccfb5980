use crate::airtable_types::RecordsPage;
use crate::config::AirtableConfig;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AirtableError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Anything that can hand out pages of rows given a continuation token.
pub trait RecordSource {
    fn fetch_page(
        &self,
        offset: Option<&str>,
    ) -> impl Future<Output = Result<RecordsPage, AirtableError>> + Send;
}

pub struct AirtableClient {
    client: Client,
    api_key: String,
    table_url: Url,
    view: Option<String>,
    page_size: u32,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> Result<Self, AirtableError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let table_url = table_url(&config.api_url, &config.base_id, &config.table_name)?;

        Ok(AirtableClient {
            client,
            api_key: config.api_key.clone(),
            table_url,
            view: config.view.clone(),
            page_size: config.page_size.clamp(1, 100),
        })
    }

    pub async fn list_records(&self, offset: Option<&str>) -> Result<RecordsPage, AirtableError> {
        let mut query: Vec<(&str, String)> = vec![("pageSize", self.page_size.to_string())];
        if let Some(view) = &self.view {
            query.push(("view", view.clone()));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        debug!(url = %self.table_url, ?offset, "listing Airtable records");

        let response = self
            .client
            .get(self.table_url.clone())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query(&query)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            let page = serde_json::from_str::<RecordsPage>(&body)?;
            Ok(page)
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);

            Err(AirtableError::RateLimitExceeded { retry_after })
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(AirtableError::AuthError(
                "Invalid API key or missing access to this base".to_string(),
            ))
        } else if status.as_u16() == 404 {
            Err(AirtableError::TableNotFound(self.table_url.to_string()))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(AirtableError::ApiError {
                status: status.as_u16(),
                message: error_text,
            })
        }
    }
}

impl RecordSource for AirtableClient {
    async fn fetch_page(&self, offset: Option<&str>) -> Result<RecordsPage, AirtableError> {
        self.list_records(offset).await
    }
}

/// `{api_url}/{base_id}/{table_name}` with the table name percent-encoded
/// as a single path segment.
fn table_url(api_url: &str, base_id: &str, table_name: &str) -> Result<Url, AirtableError> {
    let mut url = Url::parse(api_url).map_err(|e| AirtableError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| AirtableError::InvalidUrl(api_url.to_string()))?
        .pop_if_empty()
        .push(base_id)
        .push(table_name);
    Ok(url)
}
