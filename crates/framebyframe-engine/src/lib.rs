pub mod capture;
pub mod clients;
pub mod session;

use std::env;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

pub use capture::{
    image_fingerprint, load_captured_image, upload_data_url, CaptureSource, FileCapture,
    QueuedCapture,
};
pub use clients::{
    default_client_registry, BackendClient, BatchCaptionRequest, DryrunClient, InferenceClient,
    InferenceClientRegistry, OpenAiClient, SingleCaptionRequest,
};
pub use session::{CaptureMode, CaptureOutcome, CaptureSession, SessionState, SlotView};

pub const DEFAULT_CLIENT: &str = "dryrun";

/// Client name from `FRAMEBYFRAME_CLIENT`, falling back to the offline client.
pub fn default_client_name() -> String {
    first_non_empty_env(&["FRAMEBYFRAME_CLIENT"]).unwrap_or_else(|| DEFAULT_CLIENT.to_string())
}

pub(crate) fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn response_json_or_error(client: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{client} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{client} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{client} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Flattens an error chain into one line for warnings and event payloads.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(crate) fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::{error_chain_text, truncate_text};

    #[test]
    fn error_chain_text_joins_distinct_causes() {
        let err = anyhow!("connection refused").context("backend request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "backend request failed | caused by: connection refused"
        );
    }

    #[test]
    fn truncate_text_marks_cut_values() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
