use std::env;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::{ServerSettings, SyncConfig};
use crate::error::{Result, SyncError};
use crate::sync::PageWriteRequest;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const ENV_HTTP_TIMEOUT_MS: &str = "BOOKSTACK_HTTP_TIMEOUT_MS";

/// Page record returned by the BookStack pages endpoints. Only `id` is required.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemotePage {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub book_id: Option<i64>,
    #[serde(default)]
    pub chapter_id: Option<i64>,
}

pub trait PageWriteApi {
    /// Send one create or update request. Anything but HTTP 200 is an error.
    fn write_page(&mut self, request: &PageWriteRequest) -> Result<RemotePage>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct BookStackClientConfig {
    pub settings: ServerSettings,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl BookStackClientConfig {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            settings: config.server_settings()?,
            user_agent: config.user_agent(),
            timeout_ms: env::var(ENV_HTTP_TIMEOUT_MS)
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(30_000),
        })
    }
}

pub struct BookStackClient {
    client: Client,
    config: BookStackClientConfig,
    request_count: usize,
}

impl BookStackClient {
    pub fn new(config: BookStackClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(SyncError::Transport)?;
        Self::with_http_client(config, client)
    }

    pub fn with_http_client(config: BookStackClientConfig, client: Client) -> Result<Self> {
        config.settings.validate()?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn endpoint(&self, request: &PageWriteRequest) -> String {
        format!("{}{}", self.config.settings.url, request.operation.path())
    }
}

impl PageWriteApi for BookStackClient {
    fn write_page(&mut self, request: &PageWriteRequest) -> Result<RemotePage> {
        let endpoint = self.endpoint(request);
        let method = request.operation.method();
        debug!(%method, %endpoint, "sending BookStack page request");

        self.request_count += 1;
        let response = self
            .client
            .request(method, &endpoint)
            .header(AUTHORIZATION, self.config.settings.authorization())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(USER_AGENT, self.config.user_agent.clone())
            .json(&request.payload)
            .send()
            .map_err(SyncError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(%status, "BookStack rejected page write");
            return Err(SyncError::RemoteWrite { status });
        }

        let page: RemotePage = response.json().map_err(|error| {
            SyncError::InvalidResponse(format!("failed to decode page response: {error}"))
        })?;
        debug!(
            id = page.id,
            slug = ?page.slug,
            book_id = ?page.book_id,
            chapter_id = ?page.chapter_id,
            "BookStack accepted page write"
        );
        Ok(page)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
