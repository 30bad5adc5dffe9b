use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use framebyframe_contracts::slots::{CapturedImage, SlotSequence};
use serde_json::Value;

mod backend;
mod dryrun;
mod openai;
#[cfg(test)]
mod test_server;

pub use backend::BackendClient;
pub use dryrun::DryrunClient;
pub use openai::OpenAiClient;

/// Context for captioning one freshly captured frame.
#[derive(Debug, Clone)]
pub struct SingleCaptionRequest {
    pub position: usize,
    pub image: CapturedImage,
    pub context: SlotSequence,
}

/// The finalization request: every frame plus whatever is known so far.
/// Image entries may be `None` when a caller batches an incomplete sequence.
#[derive(Debug, Clone, Default)]
pub struct BatchCaptionRequest {
    pub images: Vec<Option<CapturedImage>>,
    pub captions: Vec<Option<String>>,
    pub narrative_so_far: Option<String>,
}

impl BatchCaptionRequest {
    pub fn from_sequence(sequence: &SlotSequence, narrative_so_far: Option<String>) -> Self {
        Self {
            images: sequence.images(),
            captions: sequence.captions(),
            narrative_so_far,
        }
    }

    pub fn captured_count(&self) -> usize {
        self.images.iter().filter(|image| image.is_some()).count()
    }
}

/// A hosted image-understanding service.
///
/// Payloads are returned untouched; shape normalization happens in the
/// reconciler. Any `Err` is treated as "no data" by the session.
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;
    fn caption_single(&self, request: &SingleCaptionRequest) -> Result<Value>;
    fn caption_batch(&self, request: &BatchCaptionRequest) -> Result<Value>;
}

#[derive(Default, Clone)]
pub struct InferenceClientRegistry {
    clients: BTreeMap<String, Arc<dyn InferenceClient>>,
}

impl InferenceClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: InferenceClient + 'static>(&mut self, client: C) {
        self.clients
            .insert(client.name().to_string(), Arc::new(client));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InferenceClient>> {
        self.clients.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

pub fn default_client_registry() -> InferenceClientRegistry {
    let mut clients = InferenceClientRegistry::new();
    clients.register(DryrunClient);
    clients.register(BackendClient::from_env());
    clients.register(OpenAiClient::from_env());
    clients
}

#[cfg(test)]
mod tests {
    use super::{default_client_registry, BatchCaptionRequest};
    use framebyframe_contracts::slots::{CapturedImage, SlotSequence};

    #[test]
    fn default_registry_lists_clients_sorted() {
        let registry = default_client_registry();
        assert_eq!(registry.names(), vec!["backend", "dryrun", "openai"]);
        assert_eq!(
            registry.get(" dryrun ").map(|client| client.name().to_string()),
            Some("dryrun".to_string())
        );
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn batch_request_mirrors_the_sequence() -> anyhow::Result<()> {
        let mut sequence = SlotSequence::standard();
        sequence.set_image(1, CapturedImage::new(vec![1], "image/png"))?;
        sequence.set_caption(1, "one")?;
        let request = BatchCaptionRequest::from_sequence(&sequence, Some("draft".to_string()));
        assert_eq!(request.images.len(), 4);
        assert_eq!(request.captured_count(), 1);
        assert_eq!(request.captions[0].as_deref(), Some("one"));
        assert_eq!(request.narrative_so_far.as_deref(), Some("draft"));
        Ok(())
    }
}
