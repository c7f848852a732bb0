//! Admin REST API backend
//!
//! Talks to the admin web service that owns keywords, accounts, settings and
//! daily records. Every endpoint answers with the envelope
//! `{ "success": bool, "data": ..., "message": ... }`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AccountRegistry, DailyProgressStore, KeywordSource, PublishLog, SettingsSource};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{Account, DailyProgressRecord, Keyword, ProgressDelta, PublishResult};
use crate::utils::{truncate_text, Clock};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeywordRow {
    keyword: String,
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    username: String,
    #[serde(default)]
    post_count: u32,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    username: &'a str,
    #[serde(rename = "postCount")]
    post_count: u32,
}

#[derive(Debug, Serialize)]
struct RecordsRequest<'a> {
    records: Vec<RecordUpdate<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WorklistEntry<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    worklist: Vec<WorklistEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct PostInsert<'a> {
    write_date: String,
    username: &'a str,
    link: &'a str,
    title: &'a str,
    used_keyword: &'a str,
}

/// Client for the admin REST API
pub struct AdminApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    clock: Arc<dyn Clock>,
}

impl AdminApiClient {
    pub fn new(config: &ApiConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            clock,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| truncate_text(&body, 200));
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(Error::Api {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_else(|| "request failed".into()),
            });
        }
        Ok(envelope)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(Self::read_envelope(response).await?.data)
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[async_trait]
impl KeywordSource for AdminApiClient {
    async fn fetch_unconsumed(&self) -> Result<Vec<Keyword>> {
        let rows: Vec<KeywordRow> = self.get("/api/keywords/fetch").await?.unwrap_or_default();
        Ok(rows.into_iter().map(|r| Keyword::new(r.keyword)).collect())
    }

    async fn mark_consumed(&self, keyword: &str) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/api/keywords/update"))
            .json(&serde_json::json!({ "keyword": keyword }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(keyword, "Keyword not found for consume");
            return Ok(false);
        }
        Self::read_envelope::<serde_json::Value>(response).await?;
        Ok(true)
    }
}

#[async_trait]
impl AccountRegistry for AdminApiClient {
    async fn fetch_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.get("/api/worklist/fetch").await?.unwrap_or_default())
    }
}

#[async_trait]
impl DailyProgressStore for AdminApiClient {
    async fn fetch_today(&self) -> Result<Vec<DailyProgressRecord>> {
        // The endpoint already filters on the service's current date
        let today = self.clock.today();
        let rows: Vec<RecordRow> = self
            .get("/api/daily-records/fetch")
            .await?
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|r| DailyProgressRecord {
                account: r.username,
                date: today,
                success_count: r.post_count,
            })
            .collect())
    }

    async fn upsert_batch(&self, deltas: &[ProgressDelta], auth_token: Option<&str>) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let body = RecordsRequest {
            records: deltas
                .iter()
                .map(|d| RecordUpdate {
                    username: &d.account,
                    post_count: d.delta,
                })
                .collect(),
            api_key: auth_token,
        };
        self.post("/api/daily-records/update", &body).await
    }

    async fn ensure_today(&self, accounts: &[String]) -> Result<()> {
        let body = InitRequest {
            worklist: accounts
                .iter()
                .map(|username| WorklistEntry { username })
                .collect(),
        };
        self.post("/api/daily-records/init", &body).await
    }
}

#[async_trait]
impl SettingsSource for AdminApiClient {
    async fn fetch_goal(&self) -> Result<Option<u32>> {
        let mut request = self.client.get(self.url("/api/get-time"));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let data: Option<serde_json::Value> = Self::read_envelope(response).await?.data;

        let goal = data.and_then(|d| match d.get("post_count") {
            Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        });
        Ok(goal)
    }
}

#[async_trait]
impl PublishLog for AdminApiClient {
    async fn append(&self, result: &PublishResult) -> Result<()> {
        let body = PostInsert {
            write_date: self.clock.today().to_string(),
            username: &result.account,
            link: &result.published_url,
            title: &result.title,
            used_keyword: &result.keyword,
        };
        self.post("/api/posts/insert", &body).await
    }
}
