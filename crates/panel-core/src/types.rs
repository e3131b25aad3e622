//! Shared types for panel-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::present::format_model_name;

/// One provider's entry in a comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider_id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub status: ProviderStatus,
}

/// Lifecycle of a provider call. Only `Pending -> Success` and
/// `Pending -> Error` ever happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    Success {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<ResponseMetadata>,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl ProviderResult {
    /// Fresh entry for a provider that has not answered yet
    pub fn pending(provider_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        Self {
            display_name: format_model_name(&provider_id),
            provider_id,
            status: ProviderStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ProviderStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ProviderStatus::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ProviderStatus::Error { .. })
    }

    /// Response text, only for successful calls
    pub fn text(&self) -> Option<&str> {
        match &self.status {
            ProviderStatus::Success { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Failure cause, only for failed calls
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ProviderStatus::Error { error_message } => Some(error_message),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&ResponseMetadata> {
        match &self.status {
            ProviderStatus::Success { metadata, .. } => metadata.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success { .. } => write!(f, "success"),
            Self::Error { .. } => write!(f, "error"),
        }
    }
}

/// Performance and quota details reported alongside a successful response.
/// Every field is optional; providers report different subsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

/// Provider quota snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_after_seconds: Option<u64>,
}

/// A provider's successful answer, as returned by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub metadata: Option<ResponseMetadata>,
}
