//! Gemini REST client
//!
//! Sends one `generateContent` request per keyword. Requests are throttled
//! across all credentials with a governor rate limiter; a 429 answer is
//! surfaced as [`Error::RateLimited`] so the retry policy can back off.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use handlebars::Handlebars;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{content::split_title, ContentGenerator};
use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::models::{Credential, GeneratedContent};
use crate::utils::truncate_text;

const PROMPT_TEMPLATE_NAME: &str = "prompt";

/// Prompt used when no template file is configured
pub const DEFAULT_PROMPT: &str = r#"
1. 이 키워드로 네이버 포털에서 사용자들의 클릭률이 높은 제목을 만들어주는데,
사용자 의도를 반영하고 흥미를 끌 수 있는 제목을 니가 판단하기에 가장 적합한 제목 하나를 제목: ooo 이러한 형식으로 만들어줘.

2. 제목에 맞는 워드프레스 글을 자세하게 작성해주는데, h1/h2등을 나눠서 작성해주고 글 위에 목차를 만들어주고,
최대한 네이버 SEO에 맞는 글을 작성해줘. 이때 작성하는 글은 HTML로 작성해줘.
메타디스크립션 등 SEO에 필요한 요소를 다 포함해서 작성해줘, 내용은 풍부할수록 좋아.

3. h2 태그는 숫자를 제외하고, 소제목 형태로 표현되도록 해줘. 예: 'A. 키워드'처럼 만들어줘.

키워드: {{keyword}}
"#;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct PromptData<'a> {
    keyword: &'a str,
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    templates: Handlebars<'static>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl GeminiClient {
    /// Create a client from generator settings
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        match &config.prompt_template {
            Some(path) => templates
                .register_template_file(PROMPT_TEMPLATE_NAME, path)
                .map_err(|e| Error::config(format!("prompt template {}: {e}", path.display())))?,
            None => templates
                .register_template_string(PROMPT_TEMPLATE_NAME, DEFAULT_PROMPT)
                .map_err(|e| Error::config(format!("default prompt template: {e}")))?,
        }

        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(rate));

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            templates,
            rate_limiter,
        })
    }

    /// Render the prompt for a keyword
    pub fn render_prompt(&self, keyword: &str) -> Result<String> {
        self.templates
            .render(PROMPT_TEMPLATE_NAME, &PromptData { keyword })
            .map_err(|e| Error::with_source("Failed to render prompt", e))
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    #[instrument(skip(self, credential), fields(credential = %credential.id))]
    async fn generate(&self, keyword: &str, credential: &Credential) -> Result<GeneratedContent> {
        let prompt = self.render_prompt(keyword)?;
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: &prompt }],
            }],
        };

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &credential.secret)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited(truncate_text(&text, 200)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: truncate_text(&text, 200),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::ContentGeneration(format!(
                "empty response for keyword '{keyword}'"
            )));
        }

        debug!(chars = text.chars().count(), "Generation response received");
        Ok(split_title(&text))
    }
}
