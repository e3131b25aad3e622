//! Display formatting for comparison results
//!
//! Pure functions only: the same input always produces the same string.
//! Absent fields are dropped from [`metadata_fields`] rather than rendered as
//! `0`; the explicit "no value" formatters return `N/A`.

use chrono::{DateTime, Local, Utc};

use crate::types::{RateLimit, ResponseMetadata};

/// Placeholder for fields that are expected but missing
pub const NOT_AVAILABLE: &str = "N/A";

/// Milliseconds as `500ms` or `2.50s`
pub fn format_response_time(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

/// Seconds as `45s`, `1m 30s` or `2h 5m` (quota reset countdowns)
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// `claude-3-haiku` -> `Claude 3 Haiku`
pub fn format_model_name(id: &str) -> String {
    if id.is_empty() {
        return "Unknown Model".to_string();
    }
    id.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Local date-time, or `N/A`
pub fn format_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Integer with thousands separators: `1234567` -> `1,234,567`
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Footer for a successful response
pub fn char_count(text: &str) -> String {
    format!("{} chars", format_count(text.chars().count() as u64))
}

/// Group a metadata field is displayed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Usage,
    RateLimits,
    ModelDetails,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage => write!(f, "Usage & Performance"),
            Self::RateLimits => write!(f, "Rate Limits"),
            Self::ModelDetails => write!(f, "Model Details"),
        }
    }
}

/// One labelled, display-ready metadata value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub section: Section,
    pub label: &'static str,
    pub value: String,
}

/// Knobs for [`metadata_fields`]
#[derive(Debug, Clone, Copy)]
pub struct FieldOptions {
    /// Show `0` remaining requests/tokens (quota exhausted) instead of hiding it
    pub show_zero_remaining: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            show_zero_remaining: true,
        }
    }
}

/// Ordered list of the fields to display for a result, absent ones omitted.
///
/// Token counts are shown whenever present; a zero latency renders as `N/A`.
/// Rate-limit totals and the reset countdown treat zero as "no data" since
/// providers that do not report quotas send zeros; remaining counts are
/// governed by [`FieldOptions::show_zero_remaining`].
pub fn metadata_fields(meta: &ResponseMetadata, opts: FieldOptions) -> Vec<MetadataField> {
    let mut fields = Vec::new();
    let mut push = |section, label, value: String| {
        fields.push(MetadataField {
            section,
            label,
            value,
        })
    };

    if let Some(n) = meta.prompt_tokens {
        push(Section::Usage, "Prompt Tokens", format_count(n));
    }
    if let Some(n) = meta.completion_tokens {
        push(Section::Usage, "Generation Tokens", format_count(n));
    }
    if let Some(n) = meta.total_tokens {
        push(Section::Usage, "Total Tokens", format_count(n));
    }
    if let Some(ms) = meta.latency_ms {
        // A zero latency means the backend did not time the call
        let value = match ms {
            0 => NOT_AVAILABLE.to_string(),
            ms => format_response_time(ms),
        };
        push(Section::Usage, "Response Time", value);
    }

    if let Some(rl) = &meta.rate_limit {
        for (label, value) in rate_limit_values(rl, opts) {
            push(Section::RateLimits, label, value);
        }
    }

    if let Some(model) = meta.model_version.as_deref().filter(|m| !m.is_empty()) {
        push(Section::ModelDetails, "Model Version", model.to_string());
    }
    if let Some(reason) = meta.finish_reason.as_deref().filter(|r| !r.is_empty()) {
        push(Section::ModelDetails, "Finish Reason", reason.to_string());
    }
    if let Some(ts) = &meta.completed_at {
        push(Section::ModelDetails, "Timestamp", format_timestamp(Some(ts)));
    }

    fields
}

fn rate_limit_values(rl: &RateLimit, opts: FieldOptions) -> Vec<(&'static str, String)> {
    let nonzero = |v: Option<u64>| v.filter(|n| *n != 0);
    let remaining = |v: Option<u64>| v.filter(|n| *n != 0 || opts.show_zero_remaining);

    let mut out = Vec::new();
    if let Some(n) = nonzero(rl.requests_limit) {
        out.push(("Request Limit", format_count(n)));
    }
    if let Some(n) = remaining(rl.requests_remaining) {
        out.push(("Requests Remaining", format_count(n)));
    }
    if let Some(n) = nonzero(rl.tokens_limit) {
        out.push(("Token Limit", format_count(n)));
    }
    if let Some(n) = remaining(rl.tokens_remaining) {
        out.push(("Tokens Remaining", format_count(n)));
    }
    if let Some(secs) = nonzero(rl.reset_after_seconds) {
        out.push(("Limit Resets In", format_duration(secs)));
    }
    out
}
