//! The capture session: owns the four slots, the cursor, the story and the
//! one-shot finalization guard, and drives the inference client.

use std::sync::Arc;

use framebyframe_contracts::errors::{CaptureError, SessionWarning};
use framebyframe_contracts::events::EventWriter;
use framebyframe_contracts::narrative::{NarrativeSource, SessionNarrative};
use framebyframe_contracts::reconcile::reconcile;
use framebyframe_contracts::runs::summary::{SessionSummary, SlotSummary};
use framebyframe_contracts::slots::{CapturedImage, SlotSequence};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::capture::{image_fingerprint, CaptureSource};
use crate::clients::{BatchCaptionRequest, InferenceClient, SingleCaptionRequest};
use crate::{error_chain_text, map_object, now_utc_iso};

const WARNING_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Captions arrive only from the single finalization call.
    #[default]
    Batch,
    /// Each stored capture is also captioned on its own.
    Incremental,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Capturing { cursor: usize },
    AwaitingFinalization,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The source produced nothing.
    Ignored,
    /// The sequence is already complete.
    Refused,
    Stored { position: usize },
    /// Stored the last frame and ran finalization.
    Finalized { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub has_image: bool,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capturing,
    AwaitingFinalization,
    Finalized,
}

pub struct CaptureSession {
    client: Arc<dyn InferenceClient>,
    mode: CaptureMode,
    events: Option<EventWriter>,
    session_id: String,
    started_at: String,
    slots: SlotSequence,
    cursor: usize,
    phase: Phase,
    narrative: SessionNarrative,
    draft_narrative: Option<String>,
    finalization_dispatched: bool,
    warnings: Vec<SessionWarning>,
}

impl CaptureSession {
    pub fn new(client: Arc<dyn InferenceClient>, mode: CaptureMode) -> Self {
        Self {
            client,
            mode,
            events: None,
            session_id: Uuid::new_v4().to_string(),
            started_at: now_utc_iso(),
            slots: SlotSequence::standard(),
            cursor: 1,
            phase: Phase::Capturing,
            narrative: SessionNarrative::default(),
            draft_narrative: None,
            finalization_dispatched: false,
            warnings: Vec::new(),
        }
    }

    /// Routes session events to `events`, rebound to this session's id.
    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events.for_session(self.session_id.clone()));
        self.emit(
            "session_started",
            json!({
                "client": self.client.name(),
                "mode": self.mode.as_str(),
                "slots": self.slots.len(),
            }),
        );
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Swaps the inference client. Takes effect on the next call.
    pub fn set_client(&mut self, client: Arc<dyn InferenceClient>) {
        self.client = client;
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Capturing => SessionState::Capturing {
                cursor: self.cursor,
            },
            Phase::AwaitingFinalization => SessionState::AwaitingFinalization,
            Phase::Finalized => SessionState::Finalized,
        }
    }

    pub fn current_cursor(&self) -> usize {
        self.cursor
    }

    pub fn slots(&self) -> &SlotSequence {
        &self.slots
    }

    pub fn slot_view(&self, position: usize) -> Option<SlotView> {
        self.slots.get(position).map(|slot| SlotView {
            has_image: slot.has_image(),
            caption: slot.caption().map(str::to_string),
        })
    }

    pub fn narrative(&self) -> Option<&str> {
        self.narrative.text()
    }

    pub fn narrative_source(&self) -> Option<NarrativeSource> {
        self.narrative.source()
    }

    pub fn draft_narrative(&self) -> Option<&str> {
        self.draft_narrative.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == Phase::Finalized
    }

    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    /// Pulls one snapshot from `source` and stores it. A complete sequence
    /// refuses without touching the source.
    pub fn on_capture_requested(
        &mut self,
        source: &mut dyn CaptureSource,
    ) -> Result<CaptureOutcome, CaptureError> {
        if self.phase != Phase::Capturing {
            self.emit_refused();
            return Ok(CaptureOutcome::Refused);
        }
        let Some(image) = source.take_snapshot() else {
            self.emit("capture_ignored", json!({ "cursor": self.cursor }));
            return Ok(CaptureOutcome::Ignored);
        };
        self.on_capture(image)
    }

    pub fn on_capture(&mut self, image: CapturedImage) -> Result<CaptureOutcome, CaptureError> {
        if self.phase != Phase::Capturing {
            self.emit_refused();
            return Ok(CaptureOutcome::Refused);
        }
        let len = self.slots.len();
        if self.cursor > len {
            return Err(CaptureError::NoActiveSlot {
                cursor: self.cursor,
                len,
            });
        }

        let position = self.cursor;
        let fingerprint = image_fingerprint(&image);
        let (bytes, mime_type) = (image.len(), image.mime_type().to_string());
        self.slots.set_image(position, image)?;
        self.emit(
            "capture_stored",
            json!({
                "position": position,
                "image_sha256": fingerprint,
                "bytes": bytes,
                "mime_type": mime_type,
            }),
        );

        if self.mode == CaptureMode::Incremental {
            self.caption_stored(position);
        }

        if self.slots.is_complete() {
            self.phase = Phase::AwaitingFinalization;
            self.finalize(position);
            return Ok(CaptureOutcome::Finalized { position });
        }
        self.cursor = (self.cursor + 1).min(len);
        Ok(CaptureOutcome::Stored { position })
    }

    /// Starts over with a new id, empty slots, cursor 1, no story and the
    /// guard cleared.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.session_id, Uuid::new_v4().to_string());
        self.events = self
            .events
            .as_ref()
            .map(|events| events.for_session(self.session_id.clone()));
        self.started_at = now_utc_iso();
        self.slots = SlotSequence::standard();
        self.cursor = 1;
        self.phase = Phase::Capturing;
        self.narrative = SessionNarrative::default();
        self.draft_narrative = None;
        self.finalization_dispatched = false;
        self.warnings.clear();
        self.emit("session_reset", json!({ "previous_session_id": previous }));
    }

    /// Dispatches the batch call at most once per session. The guard is set
    /// before the call and only `reset` clears it. A scalar caption in the
    /// reply lands on `just_captured`.
    pub(crate) fn finalize(&mut self, just_captured: usize) {
        if self.finalization_dispatched {
            return;
        }
        self.finalization_dispatched = true;

        let request = BatchCaptionRequest::from_sequence(&self.slots, self.draft_narrative.clone());
        self.emit(
            "finalization_dispatched",
            json!({
                "client": self.client.name(),
                "captured": request.captured_count(),
                "has_draft_narrative": request.narrative_so_far.is_some(),
            }),
        );

        match self.client.caption_batch(&request) {
            Ok(payload) => {
                let service_story = self.apply_payload(&payload, Some(just_captured));
                match service_story {
                    Some(story) => self.adopt_service_story(&story),
                    None => self.offer_synthesized(),
                }
            }
            Err(err) => {
                let reason = error_chain_text(&err, WARNING_MAX_CHARS);
                self.emit("finalization_failed", json!({ "error": reason }));
                self.record_warning(SessionWarning::InferenceFailure(reason));
                // Captions already known from incremental calls still tell a story.
                self.offer_synthesized();
            }
        }

        self.phase = Phase::Finalized;
        self.emit(
            "session_finalized",
            json!({
                "narrative": self.narrative.text(),
                "narrative_source": self.narrative.source().map(NarrativeSource::as_str),
                "warnings": self.warnings.len(),
            }),
        );
    }

    pub fn summary(&self) -> SessionSummary {
        let slots = self
            .slots
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotSummary {
                position: index + 1,
                captured: slot.has_image(),
                image_sha256: slot.image().map(image_fingerprint),
                caption: slot.caption().map(str::to_string),
            })
            .collect();
        SessionSummary {
            session_id: self.session_id.clone(),
            client: self.client.name().to_string(),
            mode: self.mode.as_str().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            finalized: self.is_finalized(),
            slots,
            narrative: self.narrative.text().map(str::to_string),
            narrative_source: self.narrative.source(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }

    fn caption_stored(&mut self, position: usize) {
        let Some(image) = self.slots.get(position).and_then(|slot| slot.image()).cloned() else {
            return;
        };
        let request = SingleCaptionRequest {
            position,
            image,
            context: self.slots.snapshot(),
        };
        match self.client.caption_single(&request) {
            Ok(payload) => {
                // Before finalization a service story is only a draft.
                if let Some(story) = self.apply_payload(&payload, Some(position)) {
                    self.draft_narrative = Some(story);
                }
            }
            Err(err) => {
                let reason = error_chain_text(&err, WARNING_MAX_CHARS);
                self.emit(
                    "caption_failed",
                    json!({ "position": position, "error": reason }),
                );
                self.record_warning(SessionWarning::InferenceFailure(reason));
            }
        }
    }

    /// Folds `payload` into the slots and returns the service story, if any.
    /// Partial stories become the draft sent with the batch call.
    fn apply_payload(&mut self, payload: &Value, just_captured: Option<usize>) -> Option<String> {
        let reconciliation = match reconcile(payload, &self.slots, just_captured) {
            Ok(reconciliation) => reconciliation,
            Err(unrecognized) => {
                self.emit(
                    "response_unrecognized",
                    json!({ "found": unrecognized.found }),
                );
                self.record_warning(unrecognized.into());
                return None;
            }
        };

        for assignment in &reconciliation.applied {
            self.emit(
                "caption_updated",
                json!({
                    "position": assignment.position,
                    "caption": assignment.caption,
                    "shape": assignment.shape.as_str(),
                }),
            );
        }
        self.slots = reconciliation.sequence;
        if let Some(partial) = reconciliation.partial_narrative {
            self.draft_narrative = Some(partial);
        }
        reconciliation.narrative
    }

    fn adopt_service_story(&mut self, story: &str) {
        if self.narrative.adopt_service(story) {
            self.emit_narrative_adopted();
        }
    }

    fn offer_synthesized(&mut self) {
        if self.narrative.offer_synthesized(&self.slots) {
            self.emit_narrative_adopted();
        }
    }

    fn emit_narrative_adopted(&self) {
        self.emit(
            "narrative_adopted",
            json!({
                "source": self.narrative.source().map(NarrativeSource::as_str),
                "narrative": self.narrative.text(),
            }),
        );
    }

    fn emit_refused(&self) {
        self.emit(
            "capture_refused",
            json!({ "cursor": self.cursor, "finalized": self.is_finalized() }),
        );
    }

    fn record_warning(&mut self, warning: SessionWarning) {
        self.emit(
            "session_warning",
            json!({ "kind": warning.kind(), "message": warning.to_string() }),
        );
        self.warnings.push(warning);
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.events.as_ref() {
            // A broken event log never stops a session.
            let _ = events.emit(event_type, map_object(payload));
        }
    }
}
