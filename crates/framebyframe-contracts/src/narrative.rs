use serde::{Deserialize, Serialize};

use crate::slots::SlotSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Service,
    Synthesized,
}

impl NarrativeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Synthesized => "synthesized",
        }
    }
}

/// Builds the local fallback story: `"1. a 2. b 3. c 4. d"`.
///
/// Returns `None` unless every slot is captured and captioned.
pub fn synthesize(sequence: &SlotSequence) -> Option<String> {
    if !sequence.is_complete() || !sequence.all_captioned() {
        return None;
    }
    let text = sequence
        .slots()
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| {
            slot.caption()
                .map(|caption| format!("{}. {}", index + 1, caption.trim()))
        })
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The session's story and where it came from.
///
/// A service narrative replaces anything; a synthesized one only fills an
/// empty slot and is never recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionNarrative {
    current: Option<(String, NarrativeSource)>,
}

impl SessionNarrative {
    pub fn text(&self) -> Option<&str> {
        self.current.as_ref().map(|(text, _)| text.as_str())
    }

    pub fn source(&self) -> Option<NarrativeSource> {
        self.current.as_ref().map(|(_, source)| *source)
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    pub fn adopt_service(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if let Some((existing, NarrativeSource::Service)) = &self.current {
            if existing == text {
                return false;
            }
        }
        self.current = Some((text.to_string(), NarrativeSource::Service));
        true
    }

    pub fn offer_synthesized(&mut self, sequence: &SlotSequence) -> bool {
        if self.current.is_some() {
            return false;
        }
        match synthesize(sequence) {
            Some(text) => {
                self.current = Some((text, NarrativeSource::Synthesized));
                true
            }
            None => false,
        }
    }
}
