//! Content generation
//!
//! [`ContentGenerator`] is the request/response boundary to the generative
//! service: one keyword and one credential in, a title and body out. It keeps
//! no local state; retries and credential accounting belong to the caller.

pub mod content;
pub mod gemini;

pub use content::{compose_with_backlinks, filter_content, split_title};
pub use gemini::GeminiClient;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Credential, GeneratedContent};

/// Produces a title and body for a keyword
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate content for `keyword` using `credential`
    ///
    /// A transport-level success may still carry an empty title or body;
    /// callers check [`GeneratedContent::is_complete`].
    async fn generate(&self, keyword: &str, credential: &Credential) -> Result<GeneratedContent>;
}

/// Scripted generator for tests and dry runs
///
/// Produces deterministic content without any network access, optionally
/// rate-limiting the first calls for a keyword, returning an empty title or
/// returning a body that is nothing but a notes section.
#[derive(Default)]
pub struct MockGenerator {
    calls: Mutex<Vec<(String, String)>>,
    rate_limited: Mutex<HashMap<String, u32>>,
    untitled: HashSet<String>,
    notes_only: HashSet<String>,
}

impl MockGenerator {
    /// Generator that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the first `times` calls for `keyword` with a rate limit
    pub fn rate_limit(self, keyword: impl Into<String>, times: u32) -> Self {
        if let Ok(mut map) = self.rate_limited.lock() {
            map.insert(keyword.into(), times);
        }
        self
    }

    /// Return content without a title for `keyword`
    pub fn untitled(mut self, keyword: impl Into<String>) -> Self {
        self.untitled.insert(keyword.into());
        self
    }

    /// Return a body for `keyword` that content filtering strips to nothing
    pub fn notes_only(mut self, keyword: impl Into<String>) -> Self {
        self.notes_only.insert(keyword.into());
        self
    }

    /// `(keyword, credential id)` of every call, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, keyword: &str, credential: &Credential) -> Result<GeneratedContent> {
        self.calls
            .lock()?
            .push((keyword.to_string(), credential.id.clone()));

        {
            let mut limited = self.rate_limited.lock()?;
            if let Some(left) = limited.get_mut(keyword) {
                if *left > 0 {
                    *left -= 1;
                    return Err(Error::RateLimited(format!("mock 429 for {keyword}")));
                }
            }
        }

        let title = if self.untitled.contains(keyword) {
            String::new()
        } else {
            format!("{keyword} 완벽 가이드")
        };

        let content = if self.notes_only.contains(keyword) {
            format!("```html\n**참고:** {keyword} 관련 정보는 변경될 수 있습니다.\n```")
        } else {
            format!("<h1>{keyword}</h1>\n<p>{keyword}에 대한 글</p>")
        };

        Ok(GeneratedContent { title, content })
    }
}
