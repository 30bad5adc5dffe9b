use anyhow::Result;
use framebyframe_contracts::slots::CapturedImage;
use serde_json::{json, Value};

use super::{BatchCaptionRequest, InferenceClient, SingleCaptionRequest};
use crate::capture::image_fingerprint;

const SUBJECTS: &[&str] = &[
    "a cat", "a small house", "a tall tree", "a smiling sun", "a boat", "a bird",
    "a rocket", "a flower",
];
const ACTIONS: &[&str] = &[
    "sits quietly", "waits in the rain", "glows at dusk", "drifts along", "stands alone",
    "looks up",
];

/// Offline client. Captions are derived from the image bytes, so the same
/// drawing always gets the same caption. Never supplies a story.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunClient;

impl InferenceClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn caption_single(&self, request: &SingleCaptionRequest) -> Result<Value> {
        Ok(json!({
            "caption": dryrun_caption(&request.image),
            "frame": request.position,
        }))
    }

    fn caption_batch(&self, request: &BatchCaptionRequest) -> Result<Value> {
        let captions = request
            .images
            .iter()
            .map(|image| image.as_ref().map(dryrun_caption))
            .collect::<Vec<_>>();
        Ok(json!({ "captions": captions }))
    }
}

fn dryrun_caption(image: &CapturedImage) -> String {
    let fingerprint = image_fingerprint(image);
    let bytes = fingerprint.as_bytes();
    let subject = SUBJECTS[usize::from(bytes[0]) % SUBJECTS.len()];
    let action = ACTIONS[usize::from(bytes[1]) % ACTIONS.len()];
    format!("{subject} {action} ({})", &fingerprint[..6])
}
