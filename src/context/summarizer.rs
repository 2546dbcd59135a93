//! Conversation history summarization
//!
//! Produces the history summary the assembler places after retrieved
//! passages. The LLM summarizer is optional; any failure falls back to
//! truncation so a chat turn never fails on its history.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::assembler::cut_at_sentence_boundary;
use super::token_estimator::TokenEstimator;

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize prior turns (oldest first) into at most `max_tokens`
    async fn summarize(&self, turns: &[String], max_tokens: usize) -> Result<String, SummarizerError>;
}

/// Configuration for the LLM summarizer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Chat completion endpoint; unset disables LLM summarization
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 10_000,
            max_retries: 2,
        }
    }
}

/// LLM-based summarizer using an OpenAI-compatible API
pub struct LlmSummarizer {
    client: Client,
    endpoint: String,
    config: SummarizerConfig,
}

/// Doubling delay from 200ms for the given 1-based retry
fn retry_backoff(attempt: usize) -> Duration {
    let multiplier = 2_u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
    Duration::from_millis(100_u64.saturating_mul(multiplier))
}

impl LlmSummarizer {
    pub fn new(endpoint: impl Into<String>, config: SummarizerConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SummarizerError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            config,
        })
    }

    fn build_prompt(&self, turns: &[String], max_tokens: usize) -> String {
        let combined = turns.join("\n\n---\n\n");
        format!(
            "Summarize the following conversation about a book into a short running brief. \
            Keep names, quoted passages and open questions. \
            Stay under {} tokens.\n\n{}",
            max_tokens, combined
        )
    }

    async fn call_once(&self, request: &ChatCompletionRequest) -> Result<String, SummarizerError> {
        let mut req = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req
            .send()
            .await
            .map_err(|e| SummarizerError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let resp: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::ApiError(format!("Failed to parse response: {}", e)))?;

        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SummarizerError::ApiError("No choices in response".to_string()))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, turns: &[String], max_tokens: usize) -> Result<String, SummarizerError> {
        if turns.is_empty() || max_tokens == 0 {
            return Ok(String::new());
        }

        debug!(turns = turns.len(), max_tokens, "Summarizing history");

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You compress reading-assistant conversations into brief notes.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(turns, max_tokens),
                },
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(0.2),
        };

        let mut last_error = SummarizerError::Unknown;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for summarization", attempt);
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            match self.call_once(&request).await {
                Ok(summary) => return Ok(summary),
                Err(e) => last_error = e,
            }
        }

        warn!("Summarization failed after {} attempts", self.config.max_retries + 1);
        Err(last_error)
    }
}

/// Keeps the newest turns that fit, in chronological order
pub struct TruncatingSummarizer {
    estimator: Arc<dyn TokenEstimator>,
}

impl TruncatingSummarizer {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    fn truncate(&self, turns: &[String], max_tokens: usize) -> String {
        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0;

        for turn in turns.iter().rev().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let tokens = self.estimator.estimate(turn);
            if used + tokens > max_tokens {
                // Nothing kept yet: salvage the newest turn's leading sentences
                if kept.is_empty() {
                    return cut_at_sentence_boundary(turn, max_tokens, self.estimator.as_ref())
                        .unwrap_or_default();
                }
                break;
            }
            used += tokens;
            kept.push(turn);
        }

        kept.reverse();
        kept.join("\n")
    }
}

#[async_trait]
impl Summarizer for TruncatingSummarizer {
    async fn summarize(&self, turns: &[String], max_tokens: usize) -> Result<String, SummarizerError> {
        Ok(self.truncate(turns, max_tokens))
    }
}

/// Tries `primary`, absorbing its failure with truncation
pub struct FallbackSummarizer {
    primary: Arc<dyn Summarizer>,
    fallback: TruncatingSummarizer,
}

impl FallbackSummarizer {
    pub fn new(primary: Arc<dyn Summarizer>, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            primary,
            fallback: TruncatingSummarizer::new(estimator),
        }
    }
}

#[async_trait]
impl Summarizer for FallbackSummarizer {
    async fn summarize(&self, turns: &[String], max_tokens: usize) -> Result<String, SummarizerError> {
        match self.primary.summarize(turns, max_tokens).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(error = %e, "History summarization failed, truncating instead");
                self.fallback.summarize(turns, max_tokens).await
            }
        }
    }
}

/// Build the configured summarizer: LLM with fallback, or plain truncation
pub fn build_summarizer(
    config: &SummarizerConfig,
    estimator: Arc<dyn TokenEstimator>,
) -> Result<Arc<dyn Summarizer>, SummarizerError> {
    match &config.endpoint {
        Some(endpoint) => {
            let llm = LlmSummarizer::new(endpoint.clone(), config.clone())?;
            Ok(Arc::new(FallbackSummarizer::new(Arc::new(llm), estimator)))
        }
        None => Ok(Arc::new(TruncatingSummarizer::new(estimator))),
    }
}

/// Summarizer errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unknown error")]
    Unknown,
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::WordBasedEstimator;

    fn estimator() -> Arc<dyn TokenEstimator> {
        Arc::new(WordBasedEstimator::default())
    }

    fn turns() -> Vec<String> {
        vec![
            "Who is the narrator of the first chapter?".to_string(),
            "The narrator is Ishmael.".to_string(),
            "Why does he go to sea?".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_truncating_keeps_everything_when_it_fits() {
        let summarizer = TruncatingSummarizer::new(estimator());
        let summary = summarizer.summarize(&turns(), 100).await.unwrap();
        assert_eq!(
            summary,
            "Who is the narrator of the first chapter?\nThe narrator is Ishmael.\nWhy does he go to sea?"
        );
    }

    #[tokio::test]
    async fn test_truncating_keeps_newest_turns() {
        let summarizer = TruncatingSummarizer::new(estimator());
        // 6 words -> 8 tokens, 4 words -> 6 tokens
        let summary = summarizer.summarize(&turns(), 14).await.unwrap();
        assert_eq!(summary, "The narrator is Ishmael.\nWhy does he go to sea?");
    }

    #[tokio::test]
    async fn test_truncating_cuts_single_turn_at_sentence() {
        let summarizer = TruncatingSummarizer::new(estimator());
        let long = vec!["The whale is white. It haunts Ahab for years and years.".to_string()];
        let summary = summarizer.summarize(&long, 8).await.unwrap();
        assert_eq!(summary, "The whale is white.");
    }

    #[tokio::test]
    async fn test_llm_summarizer_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Reader asked about Ishmael."}}]}"#)
            .create_async()
            .await;

        let summarizer = LlmSummarizer::new(
            format!("{}/v1/chat/completions", server.url()),
            SummarizerConfig::default(),
        )
        .unwrap();
        let summary = summarizer.summarize(&turns(), 50).await.unwrap();

        mock.assert_async().await;
        assert_eq!(summary, "Reader asked about Ishmael.");
    }

    #[tokio::test]
    async fn test_fallback_on_llm_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let config = SummarizerConfig {
            max_retries: 0,
            ..Default::default()
        };
        let llm = LlmSummarizer::new(format!("{}/v1/chat/completions", server.url()), config).unwrap();
        let summarizer = FallbackSummarizer::new(Arc::new(llm), estimator());

        let summary = summarizer.summarize(&turns(), 100).await.unwrap();
        assert!(summary.ends_with("Why does he go to sea?"));
    }

    #[test]
    fn test_retry_backoff_saturates() {
        assert_eq!(retry_backoff(1), Duration::from_millis(200));
        assert_eq!(retry_backoff(3), Duration::from_millis(800));
        assert_eq!(retry_backoff(64), Duration::from_millis(u64::MAX));
        assert_eq!(retry_backoff(usize::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_build_without_endpoint_truncates() {
        let summarizer = build_summarizer(&SummarizerConfig::default(), estimator());
        assert!(summarizer.is_ok());
    }
}
