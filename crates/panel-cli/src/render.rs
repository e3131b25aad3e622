//! Plain-text rendering of result cards and the health badge

use std::fmt::Write;

use panel_core::present::{self, FieldOptions, Section};
use panel_core::{HealthState, IndicatorView, ProviderResult, ProviderStatus};

#[derive(Debug, Clone, Copy)]
pub struct CardOptions {
    pub show_metadata: bool,
    pub fields: FieldOptions,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            show_metadata: true,
            fields: FieldOptions::default(),
        }
    }
}

/// One provider's card: header, body, metadata sections and footer
pub fn card(result: &ProviderResult, opts: CardOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "── {} ({}) ── {}",
        result.display_name, result.provider_id, result.status
    );

    match &result.status {
        ProviderStatus::Pending => {
            out.push_str("Waiting for response...\n");
        }
        ProviderStatus::Error { error_message } => {
            let _ = writeln!(out, "Error: {}", error_message);
        }
        ProviderStatus::Success { text, metadata } => {
            let _ = writeln!(out, "{}", text.trim_end());

            if opts.show_metadata
                && let Some(meta) = metadata
            {
                let mut current: Option<Section> = None;
                for field in present::metadata_fields(meta, opts.fields) {
                    if current != Some(field.section) {
                        let _ = writeln!(out, "\n{}", field.section);
                        current = Some(field.section);
                    }
                    let _ = writeln!(out, "  {}: {}", field.label, field.value);
                }
            }

            let _ = writeln!(out, "\n{}", present::char_count(text));
        }
    }

    out
}

/// Text for the badge, `None` when it is hidden
pub fn indicator(view: IndicatorView) -> Option<String> {
    match view {
        IndicatorView::Hidden => None,
        IndicatorView::Collapsed => Some("[!]".to_string()),
        IndicatorView::Expanded { message } => Some(format!("[!] {}", message)),
    }
}

/// One status line for `panel watch` / `panel health`
pub fn health_line(state: &HealthState) -> String {
    format!(
        "backend {} (checked {})",
        state.reachability,
        present::format_timestamp(state.last_checked_at.as_ref()),
    )
}
