//! Trino engine over the HTTP statement protocol.
//!
//! A statement is submitted with `POST /v1/statement` and its results are
//! drained by following `nextUri` until the coordinator stops returning one.

use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::RwLock;

use super::QueryEngine;
use super::types::{ServerInfo, StatementPage, TrinoColumn, column_info, convert_value};
use crate::config::QuerySettings;
use crate::error::{DriverError, DriverResult};
use crate::services::lifecycle::DriverLifecycle;
use crate::services::traits::{QueryResult, Row};

/// Value sent as `X-Trino-Source`
const SOURCE: &str = "lakehouse-clients";

/// Attempts for a page the coordinator reports as temporarily unavailable
const MAX_PAGE_ATTEMPTS: u32 = 10;
const PAGE_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct TrinoEngine {
    settings: QuerySettings,
    connect_timeout: Duration,
    http: RwLock<Option<reqwest::Client>>,
}

impl std::fmt::Debug for TrinoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrinoEngine")
            .field("base_url", &self.settings.base_url())
            .field("user", &self.settings.user)
            .field("http", &"<reqwest::Client>")
            .finish()
    }
}

impl TrinoEngine {
    pub fn new(settings: QuerySettings, connect_timeout: Duration) -> Self {
        Self {
            settings,
            connect_timeout,
            http: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url(), path)
    }

    fn session_headers(&self) -> DriverResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("X-Trino-User", self.settings.user.as_str()),
            ("X-Trino-Catalog", self.settings.catalog.as_str()),
            ("X-Trino-Schema", self.settings.schema.as_str()),
            ("X-Trino-Source", SOURCE),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| DriverError::connection(anyhow!("invalid {} header: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn client(&self) -> DriverResult<reqwest::Client> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| DriverError::connection(anyhow!("Trino client not connected")))
    }

    async fn server_info(&self, http: &reqwest::Client) -> DriverResult<()> {
        let response = http
            .get(self.url("/v1/info"))
            .send()
            .await
            .map_err(DriverError::connection)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::connection(anyhow!(
                "coordinator answered {} on /v1/info",
                status
            )));
        }

        let info: ServerInfo = response.json().await.map_err(DriverError::connection)?;
        if info.starting {
            return Err(DriverError::connection(anyhow!("coordinator is still starting")));
        }
        Ok(())
    }

    /// Fetch a page, retrying while the coordinator answers 502/503/504.
    async fn fetch_page(&self, request: reqwest::RequestBuilder) -> DriverResult<StatementPage> {
        let mut attempt = 0;
        loop {
            let builder = request.try_clone().ok_or_else(|| {
                DriverError::operation(anyhow!("statement request is not cloneable"))
            })?;
            let response = builder.send().await.map_err(DriverError::connection)?;

            let status = response.status();
            match status {
                s if s.is_success() => {
                    return response.json::<StatementPage>().await.map_err(DriverError::operation);
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(DriverError::connection(anyhow!(
                        "Trino rejected credentials for user `{}` ({})",
                        self.settings.user,
                        status
                    )));
                }
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                    if attempt + 1 < MAX_PAGE_ATTEMPTS =>
                {
                    attempt += 1;
                    tracing::debug!(%status, attempt, "Trino page unavailable, retrying");
                    tokio::time::sleep(PAGE_RETRY_DELAY).await;
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DriverError::operation(anyhow!(
                        "Trino answered {}: {}",
                        status,
                        body.trim()
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl DriverLifecycle for TrinoEngine {
    async fn open(&self) -> DriverResult<()> {
        let http = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.settings.request_timeout)
            .default_headers(self.session_headers()?)
            .build()
            .map_err(DriverError::connection)?;

        self.server_info(&http).await?;
        *self.http.write().await = Some(http);
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        let http = self.client().await?;
        self.server_info(&http).await
    }

    async fn release(&self) -> DriverResult<()> {
        self.http.write().await.take();
        Ok(())
    }
}

#[async_trait]
impl QueryEngine for TrinoEngine {
    async fn execute(&self, sql: &str) -> DriverResult<QueryResult> {
        let started = Instant::now();
        let http = self.client().await?;

        let submit = http.post(self.url("/v1/statement")).body(sql.to_string());
        let mut page = self.fetch_page(submit).await?;

        let mut columns: Option<Vec<TrinoColumn>> = None;
        let mut rows = Vec::new();
        loop {
            if let Some(error) = page.error.take() {
                return Err(DriverError::operation(anyhow!("{}", error)));
            }
            if columns.is_none() {
                columns = page.columns.take();
            }
            if let Some(data) = page.data.take() {
                let types = columns.as_deref().unwrap_or_default();
                rows.extend(data.into_iter().map(|cells| {
                    Row::from_values(
                        cells
                            .iter()
                            .enumerate()
                            .map(|(idx, cell)| {
                                let type_name =
                                    types.get(idx).map_or("unknown", |c| c.type_name.as_str());
                                convert_value(type_name, cell)
                            })
                            .collect(),
                    )
                }));
            }

            match page.next_uri.take() {
                Some(next) => page = self.fetch_page(http.get(next)).await?,
                None => break,
            }
        }

        tracing::debug!(
            query_id = page.id.as_deref().unwrap_or_default(),
            rows = rows.len(),
            "Trino statement finished"
        );
        let columns = column_info(columns.as_deref().unwrap_or_default());
        Ok(QueryResult::new(columns, rows, started.elapsed().as_millis()))
    }
}
