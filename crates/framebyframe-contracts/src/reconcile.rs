//! Folds loosely shaped inference payloads into per-slot captions.
//!
//! The hosted model has returned captions in several layouts over time. Each
//! layout maps to [`CaptionAssignment`] records; the records are then merged in
//! precedence order, and a later layout only fills positions that no earlier
//! layout claimed in the same pass.

use serde_json::{Map, Value};

use crate::errors::UnrecognizedResponseShape;
use crate::slots::SlotSequence;

const CAPTIONS_KEY: &str = "captions";
const PAIR_KEYS: &[&str] = &["frames", "slots"];
const PAIR_POSITION_KEYS: &[&str] = &["position", "frame"];
const SCALAR_KEYS: &[&str] = &["caption", "response"];
const NARRATIVE_KEYS: &[&str] = &["story", "narrative"];
const PARTIAL_NARRATIVE_KEYS: &[&str] = &["partial_story", "story_so_far"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseShape {
    /// `captions: [..]`, aligned to slot order.
    Positional,
    /// `frames: [{position, caption}]`.
    ExplicitPairs,
    /// `captions: {"1": ..}`.
    Keyed,
    /// `caption` / `response` for the slot that was just captured.
    Scalar,
}

impl ResponseShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::ExplicitPairs => "explicit_pairs",
            Self::Keyed => "keyed",
            Self::Scalar => "scalar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionAssignment {
    pub position: usize,
    pub caption: String,
    pub shape: ResponseShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub sequence: SlotSequence,
    /// Assignments that changed a caption.
    pub applied: Vec<CaptionAssignment>,
    pub shapes: Vec<ResponseShape>,
    pub narrative: Option<String>,
    pub partial_narrative: Option<String>,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Merges `payload` into a copy of `snapshot`.
///
/// `just_captured` is the only position a scalar caption may land on. Blank or
/// non-text values never clear a caption, and positions without an image are
/// skipped.
pub fn reconcile(
    payload: &Value,
    snapshot: &SlotSequence,
    just_captured: Option<usize>,
) -> Result<Reconciliation, UnrecognizedResponseShape> {
    let Some(object) = payload.as_object() else {
        return Err(UnrecognizedResponseShape::new(value_kind(payload)));
    };
    let len = snapshot.len();

    let mut shapes = Vec::new();
    let mut proposals = Vec::new();

    if let Some(list) = object.get(CAPTIONS_KEY).and_then(Value::as_array) {
        shapes.push(ResponseShape::Positional);
        proposals.extend(positional_assignments(list, len));
    }
    if let Some(list) = PAIR_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
    {
        shapes.push(ResponseShape::ExplicitPairs);
        proposals.extend(pair_assignments(list, len));
    }
    if let Some(map) = object.get(CAPTIONS_KEY).and_then(Value::as_object) {
        shapes.push(ResponseShape::Keyed);
        proposals.extend(keyed_assignments(map, len));
    }
    if let Some(raw) = SCALAR_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
    {
        shapes.push(ResponseShape::Scalar);
        if let (Some(position), Some(caption)) = (just_captured, clean_text(raw)) {
            if (1..=len).contains(&position) {
                proposals.push(CaptionAssignment {
                    position,
                    caption,
                    shape: ResponseShape::Scalar,
                });
            }
        }
    }

    let narrative_field = text_field(object, NARRATIVE_KEYS);
    let partial_field = text_field(object, PARTIAL_NARRATIVE_KEYS);
    if shapes.is_empty() && narrative_field.is_none() && partial_field.is_none() {
        return Err(UnrecognizedResponseShape::new(
            "object without caption or story fields",
        ));
    }

    let mut sequence = snapshot.snapshot();
    let mut claimed = vec![false; len + 1];
    let mut applied = Vec::new();
    for proposal in proposals {
        if claimed[proposal.position] {
            continue;
        }
        claimed[proposal.position] = true;
        let Some(slot) = sequence.get(proposal.position) else {
            continue;
        };
        if !slot.has_image() || slot.caption() == Some(proposal.caption.as_str()) {
            continue;
        }
        if sequence
            .set_caption(proposal.position, &proposal.caption)
            .is_ok()
        {
            applied.push(proposal);
        }
    }

    Ok(Reconciliation {
        sequence,
        applied,
        shapes,
        narrative: narrative_field.and_then(clean_text),
        partial_narrative: partial_field.and_then(clean_text),
    })
}

fn positional_assignments(list: &[Value], len: usize) -> Vec<CaptionAssignment> {
    list.iter()
        .take(len)
        .enumerate()
        .filter_map(|(index, value)| {
            caption_text(value).map(|caption| CaptionAssignment {
                position: index + 1,
                caption,
                shape: ResponseShape::Positional,
            })
        })
        .collect()
}

fn pair_assignments(list: &[Value], len: usize) -> Vec<CaptionAssignment> {
    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let position = PAIR_POSITION_KEYS
                .iter()
                .find_map(|key| entry.get(*key).and_then(position_value))?;
            if !(1..=len).contains(&position) {
                return None;
            }
            let caption = entry.get("caption").and_then(caption_text)?;
            Some(CaptionAssignment {
                position,
                caption,
                shape: ResponseShape::ExplicitPairs,
            })
        })
        .collect()
}

fn keyed_assignments(map: &Map<String, Value>, len: usize) -> Vec<CaptionAssignment> {
    let mut assignments = map
        .iter()
        .filter_map(|(key, value)| {
            let position = key.trim().parse::<usize>().ok()?;
            if !(1..=len).contains(&position) {
                return None;
            }
            let caption = caption_text(value)?;
            Some(CaptionAssignment {
                position,
                caption,
                shape: ResponseShape::Keyed,
            })
        })
        .collect::<Vec<_>>();
    // "01" and "1" both parse to 1; keep the order independent of map iteration.
    assignments.sort_by_key(|assignment| assignment.position);
    assignments
}

fn caption_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => clean_text(text),
        Value::Object(object) => object
            .get("text")
            .and_then(Value::as_str)
            .and_then(clean_text),
        _ => None,
    }
}

fn position_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|raw| usize::try_from(raw).ok()),
        Value::String(text) => text.trim().parse::<usize>().ok(),
        _ => None,
    }
}

fn text_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}

fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
