//! Boundary to the comparison REST service
//!
//! The core only ever talks to the service through [`ComparisonBackend`];
//! [`HttpBackend`] implements it over `reqwest` and normalizes the wire
//! payload into [`Completion`] values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{CompareError, Result};
use crate::types::{Completion, RateLimit, ResponseMetadata};

/// Prefix the service puts on per-provider failures inside a 200 payload
const ERROR_PREFIX: &str = "Error: ";

/// Operations the core needs from the comparison service
#[async_trait]
pub trait ComparisonBackend: Send + Sync {
    /// Default provider set, in the order the service lists them
    async fn available_providers(&self) -> Result<Vec<String>>;

    /// Ask a single provider to answer the prompt
    async fn complete(&self, prompt: &str, provider_id: &str) -> Result<Completion>;

    /// Lightweight reachability probe
    async fn check_health(&self) -> Result<()>;
}

/// `reqwest` client for the `/llm/*` endpoints under a resolved base URL
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpBackend {
    /// Create a client for `base_url` (e.g. `http://localhost:8080/api`).
    ///
    /// No request timeout is set on the client; callers bound each call
    /// themselves so generation and health probes get different budgets.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| CompareError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CompareError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/llm/{}", self.base_url, path)
    }
}

#[async_trait]
impl ComparisonBackend for HttpBackend {
    async fn available_providers(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.endpoint("available")).send().await?;
        let body = read_success_body(response).await?;
        let providers: Vec<String> =
            serde_json::from_str(&body).map_err(|e| CompareError::Decode(e.to_string()))?;
        debug!("Backend lists {} providers", providers.len());
        Ok(providers)
    }

    async fn complete(&self, prompt: &str, provider_id: &str) -> Result<Completion> {
        let request = CompareRequest {
            prompt,
            llms: vec![provider_id],
        };

        debug!("Compare request: provider={}, prompt_len={}", provider_id, prompt.len());

        let response = self
            .client
            .post(self.endpoint("compare"))
            .json(&request)
            .send()
            .await?;
        let body = read_success_body(response).await?;
        let payload: CompareResponse =
            serde_json::from_str(&body).map_err(|e| CompareError::Decode(e.to_string()))?;

        let entry = payload
            .responses
            .into_iter()
            .find(|r| r.llm == provider_id)
            .ok_or_else(|| CompareError::MissingResult(provider_id.to_string()))?;

        normalize(entry)
    }

    async fn check_health(&self) -> Result<()> {
        let response = self.client.get(self.endpoint("health")).send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(CompareError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            })
        }
    }
}

/// Read the body of a successful response, or turn a failed one into
/// [`CompareError::Status`] using the service's error body when it has one.
async fn read_success_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unexpected status").to_string()
            } else {
                body.trim().to_string()
            }
        });

    Err(CompareError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Map one wire entry onto the success/error shape.
///
/// The service reports a provider failure as `"Error: <cause>"` text with no
/// metadata; anything else is a successful answer.
fn normalize(entry: WireResponse) -> Result<Completion> {
    let text = entry.response.unwrap_or_default();

    if entry.metadata.is_none()
        && let Some(cause) = text.strip_prefix(ERROR_PREFIX)
    {
        return Err(CompareError::Provider(cause.trim().to_string()));
    }

    Ok(Completion {
        text,
        metadata: entry.metadata.map(WireMetadata::into_metadata),
    })
}

/// Negative numbers from the service mean "not reported"
fn non_negative(v: Option<i64>) -> Option<u64> {
    v.and_then(|n| u64::try_from(n).ok())
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct CompareRequest<'a> {
    prompt: &'a str,
    llms: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    responses: Vec<WireResponse>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    llm: String,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    prompt_tokens: Option<i64>,
    generation_tokens: Option<i64>,
    total_tokens: Option<i64>,
    response_time: Option<i64>,
    model: Option<String>,
    finish_reason: Option<String>,
    timestamp: Option<String>,
    rate_limit: Option<WireRateLimit>,
}

impl WireMetadata {
    fn into_metadata(self) -> ResponseMetadata {
        let completed_at = self.timestamp.as_deref().and_then(|ts| {
            DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .inspect_err(|e| debug!("Ignoring unparseable timestamp '{}': {}", ts, e))
                .ok()
        });

        ResponseMetadata {
            prompt_tokens: non_negative(self.prompt_tokens),
            completion_tokens: non_negative(self.generation_tokens),
            total_tokens: non_negative(self.total_tokens),
            latency_ms: non_negative(self.response_time),
            model_version: self.model,
            finish_reason: self.finish_reason,
            completed_at,
            rate_limit: self.rate_limit.map(|rl| RateLimit {
                requests_limit: non_negative(rl.requests_limit),
                requests_remaining: non_negative(rl.requests_remaining),
                tokens_limit: non_negative(rl.tokens_limit),
                tokens_remaining: non_negative(rl.tokens_remaining),
                reset_after_seconds: non_negative(rl.reset_after),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRateLimit {
    requests_limit: Option<i64>,
    requests_remaining: Option<i64>,
    tokens_limit: Option<i64>,
    tokens_remaining: Option<i64>,
    reset_after: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: serde_json::Value) -> WireResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_urls() {
        assert!(matches!(
            HttpBackend::new("not a url"),
            Err(CompareError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            HttpBackend::new("ftp://example.com/api"),
            Err(CompareError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = HttpBackend::new("http://localhost:8080/api/").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8080/api");
        assert_eq!(backend.endpoint("health"), "http://localhost:8080/api/llm/health");
    }

    #[test]
    fn test_debug_does_not_dump_client() {
        let backend = HttpBackend::new("http://localhost:8080/api").unwrap();
        let debug = format!("{:?}", backend);
        assert!(debug.contains("localhost:8080"));
        assert!(debug.contains("<reqwest::Client>"));
    }

    #[test]
    fn test_compare_request_shape() {
        let req = CompareRequest {
            prompt: "Explain gravity",
            llms: vec!["openai"],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "Explain gravity", "llms": ["openai"]}));
    }

    #[test]
    fn test_normalize_success_with_metadata() {
        let completion = normalize(entry(serde_json::json!({
            "llm": "openai",
            "response": "Mass attracts mass.",
            "metadata": {
                "promptTokens": 12,
                "generationTokens": 40,
                "totalTokens": 52,
                "responseTime": 2500,
                "model": "gpt-4o-mini",
                "finishReason": "STOP",
                "timestamp": "2025-01-02T03:04:05.123Z",
                "rateLimit": {
                    "requestsLimit": 500,
                    "requestsRemaining": 499,
                    "tokensLimit": 200000,
                    "tokensRemaining": 199948,
                    "resetAfter": 0
                }
            }
        })))
        .unwrap();

        assert_eq!(completion.text, "Mass attracts mass.");
        let meta = completion.metadata.unwrap();
        assert_eq!(meta.prompt_tokens, Some(12));
        assert_eq!(meta.completion_tokens, Some(40));
        assert_eq!(meta.total_tokens, Some(52));
        assert_eq!(meta.latency_ms, Some(2500));
        assert_eq!(meta.model_version.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(meta.finish_reason.as_deref(), Some("STOP"));
        assert!(meta.completed_at.is_some());
        let rl = meta.rate_limit.unwrap();
        assert_eq!(rl.requests_remaining, Some(499));
        assert_eq!(rl.reset_after_seconds, Some(0));
    }

    #[test]
    fn test_normalize_error_entry() {
        let err = normalize(entry(serde_json::json!({
            "llm": "anthropic",
            "response": "Error: 401 invalid x-api-key",
            "metadata": null
        })))
        .unwrap_err();
        assert!(matches!(err, CompareError::Provider(ref m) if m == "401 invalid x-api-key"));
    }

    #[test]
    fn test_normalize_text_mentioning_error_with_metadata_is_success() {
        let completion = normalize(entry(serde_json::json!({
            "llm": "ollama",
            "response": "Error: is a word the model chose to start with",
            "metadata": {"responseTime": 10}
        })))
        .unwrap();
        assert!(completion.text.starts_with("Error: "));
    }

    #[test]
    fn test_normalize_drops_negative_and_bad_values() {
        let completion = normalize(entry(serde_json::json!({
            "llm": "ollama",
            "response": "hi",
            "metadata": {"promptTokens": -1, "timestamp": "yesterday"}
        })))
        .unwrap();
        let meta = completion.metadata.unwrap();
        assert_eq!(meta.prompt_tokens, None);
        assert_eq!(meta.completed_at, None);
    }

    #[test]
    fn test_error_body_prefers_message() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"timestamp":"2025-01-01T00:00:00Z","status":404,"error":"Model Not Found","message":"The following models are not available: foo","details":null}"#,
        )
        .unwrap();
        assert_eq!(body.message.as_deref(), Some("The following models are not available: foo"));
        assert_eq!(body.error.as_deref(), Some("Model Not Found"));
    }
}
