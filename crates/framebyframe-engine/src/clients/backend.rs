use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{BatchCaptionRequest, InferenceClient, SingleCaptionRequest};
use crate::capture::upload_data_url;
use crate::{first_non_empty_env, response_json_or_error};

const DEFAULT_API_BASE: &str = "http://localhost:3001";
const DEFAULT_TIMEOUT_S: u64 = 60;
const UPLOAD_MAX_DIM: u32 = 1024;

/// Client for the captioning backend (`/handle_img`, `/handle_batch`).
pub struct BackendClient {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl BackendClient {
    pub fn new(api_base: &str, timeout: Duration) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        let api_base = first_non_empty_env(&["FRAMEBYFRAME_API_BASE"])
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::new(&api_base, request_timeout())
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn post(&self, route: &str, body: &Value) -> Result<Value> {
        let endpoint = format!("{}/{route}", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .with_context(|| format!("backend request to {endpoint} failed"))?;
        response_json_or_error("backend", response)
    }
}

impl InferenceClient for BackendClient {
    fn name(&self) -> &str {
        "backend"
    }

    fn caption_single(&self, request: &SingleCaptionRequest) -> Result<Value> {
        self.post("handle_img", &single_body(request))
    }

    fn caption_batch(&self, request: &BatchCaptionRequest) -> Result<Value> {
        self.post("handle_batch", &batch_body(request)?)
    }
}

/// Request timeout from `FRAMEBYFRAME_TIMEOUT_S`, in whole seconds.
pub(crate) fn request_timeout() -> Duration {
    let seconds = first_non_empty_env(&["FRAMEBYFRAME_TIMEOUT_S"])
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TIMEOUT_S);
    Duration::from_secs(seconds)
}

fn single_body(request: &SingleCaptionRequest) -> Value {
    json!({
        "frame": request.position,
        "file": upload_data_url(&request.image, UPLOAD_MAX_DIM),
    })
}

fn batch_body(request: &BatchCaptionRequest) -> Result<Value> {
    let mut files = Vec::with_capacity(request.images.len());
    for (index, image) in request.images.iter().enumerate() {
        let Some(image) = image else {
            bail!("backend batch needs every frame; frame {} is missing", index + 1);
        };
        files.push(upload_data_url(image, UPLOAD_MAX_DIM));
    }
    Ok(json!({
        "files": files,
        "captions": request.captions,
        "story": request.narrative_so_far,
        "complete": true,
    }))
}
