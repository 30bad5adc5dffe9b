use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};

use super::backend::request_timeout;
use super::{BatchCaptionRequest, InferenceClient, SingleCaptionRequest};
use crate::capture::upload_data_url;
use crate::{first_non_empty_env, response_json_or_error};

const DEFAULT_MODEL: &str = "gpt-5-mini";
const VISION_MAX_DIM: u32 = 1024;
const CAPTION_PROMPT: &str = "Describe what is shown in this drawing in a clear, simple sentence. Use present tense. If you cannot tell, reply with 'unclear'.";

/// Talks to the OpenAI Responses API directly: one call per frame, then one
/// story call over the captions.
pub struct OpenAiClient {
    api_base: String,
    api_key: Option<String>,
    caption_model: String,
    story_model: String,
    timeout: Duration,
    http: HttpClient,
}

impl OpenAiClient {
    pub fn from_env() -> Self {
        Self {
            api_base: openai_api_base(),
            api_key: first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]),
            caption_model: first_non_empty_env(&["FRAMEBYFRAME_CAPTION_MODEL"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            story_model: first_non_empty_env(&["FRAMEBYFRAME_STORY_MODEL"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: request_timeout(),
            http: HttpClient::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn respond(&self, model: &str, content: Vec<Value>) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY is not set");
        };
        let endpoint = format!("{}/responses", self.api_base);
        let payload = json!({
            "model": model,
            "input": [{
                "role": "user",
                "content": content,
            }],
        });
        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .with_context(|| format!("openai request to {endpoint} failed"))?;
        let parsed = response_json_or_error("openai", response)?;
        Ok(extract_openai_output_text(&parsed))
    }

    fn describe(&self, data_url: String) -> Result<Option<String>> {
        let text = self.respond(
            &self.caption_model,
            vec![
                json!({ "type": "input_text", "text": CAPTION_PROMPT }),
                json!({ "type": "input_image", "image_url": data_url }),
            ],
        )?;
        Ok((!text.is_empty()).then_some(text))
    }
}

impl InferenceClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn caption_single(&self, request: &SingleCaptionRequest) -> Result<Value> {
        let caption = self.describe(upload_data_url(&request.image, VISION_MAX_DIM))?;
        Ok(json!({ "response": caption }))
    }

    fn caption_batch(&self, request: &BatchCaptionRequest) -> Result<Value> {
        let mut captions: Vec<Option<String>> = Vec::with_capacity(request.images.len());
        let (mut attempted, mut failed, mut last_error) = (0usize, 0usize, None);
        for image in &request.images {
            let Some(image) = image else {
                captions.push(None);
                continue;
            };
            attempted += 1;
            match self.describe(upload_data_url(image, VISION_MAX_DIM)) {
                Ok(caption) => captions.push(caption),
                Err(err) => {
                    captions.push(None);
                    failed += 1;
                    last_error = Some(err);
                }
            }
        }
        // One failed frame leaves a gap; only a batch where every frame failed fails.
        if let Some(err) = last_error {
            if failed == attempted {
                return Err(err.context(format!("all {attempted} caption calls failed")));
            }
        }

        let mut payload = Map::new();
        payload.insert("captions".to_string(), json!(captions));

        let known = captions
            .iter()
            .zip(&request.captions)
            .map(|(fresh, earlier)| fresh.as_ref().or(earlier.as_ref()).cloned())
            .collect::<Option<Vec<String>>>();
        if let Some(known) = known {
            // A failed story call leaves `story` out; the session falls back locally.
            if let Ok(story) = self.respond(
                &self.story_model,
                vec![json!({ "type": "input_text", "text": story_prompt(&known) })],
            ) {
                if !story.is_empty() {
                    payload.insert("story".to_string(), Value::String(story));
                }
            }
        }
        Ok(Value::Object(payload))
    }
}

fn story_prompt(captions: &[String]) -> String {
    format!(
        "{}. Using these captions, write a sub 50 word cohesive story or communication interpreted from the frames.",
        captions.join(", ")
    )
}

fn openai_api_base() -> String {
    let raw = first_non_empty_env(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    normalize_api_base(&raw)
}

fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}

fn extract_openai_output_text(response: &Value) -> String {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }

    let mut parts: Vec<String> = Vec::new();
    let rows = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            if matches!(kind, "output_text" | "text") {
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    push_text(&mut parts, text);
                }
                continue;
            }
            if kind != "message" {
                continue;
            }
        }
        let content = obj
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for chunk in content {
            let kind = chunk.get("type").and_then(Value::as_str).unwrap_or_default();
            if !matches!(kind, "output_text" | "text") {
                continue;
            }
            if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                push_text(&mut parts, text);
            }
        }
    }

    parts.join("\n").trim().to_string()
}

fn push_text(parts: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
}
