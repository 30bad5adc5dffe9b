use std::fmt;
use std::sync::Arc;

use crate::errors::SlotError;

/// Number of frames in one capture sequence.
pub const SEQUENCE_LEN: usize = 4;

/// Encoded image bytes as delivered by a capture source. Clones share the
/// buffer, so snapshots stay cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl CapturedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    image: Option<CapturedImage>,
    caption: Option<String>,
}

impl Slot {
    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Fixed-length run of slots addressed by 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSequence {
    slots: Vec<Slot>,
}

impl SlotSequence {
    pub fn new(len: usize) -> Result<Self, SlotError> {
        if len == 0 {
            return Err(SlotError::InvalidLength(len));
        }
        Ok(Self {
            slots: vec![Slot::default(); len],
        })
    }

    /// The sequence the capture pipeline runs on.
    pub fn standard() -> Self {
        Self {
            slots: vec![Slot::default(); SEQUENCE_LEN],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_untouched(&self) -> bool {
        self.slots.iter().all(|slot| slot.image.is_none() && slot.caption.is_none())
    }

    pub fn get(&self, position: usize) -> Option<&Slot> {
        position
            .checked_sub(1)
            .and_then(|index| self.slots.get(index))
    }

    pub fn slot(&self, position: usize) -> Result<&Slot, SlotError> {
        let index = self.index_of(position)?;
        Ok(&self.slots[index])
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn set_image(&mut self, position: usize, image: CapturedImage) -> Result<(), SlotError> {
        let index = self.index_of(position)?;
        let slot = &mut self.slots[index];
        if slot.image.is_some() {
            return Err(SlotError::SlotAlreadyCaptured { position });
        }
        slot.image = Some(image);
        Ok(())
    }

    pub fn set_caption(&mut self, position: usize, caption: &str) -> Result<(), SlotError> {
        let index = self.index_of(position)?;
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(SlotError::EmptyCaption { position });
        }
        let slot = &mut self.slots[index];
        if slot.image.is_none() {
            return Err(SlotError::SlotNotCaptured { position });
        }
        slot.caption = Some(caption.to_string());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Slot::has_image)
    }

    pub fn captured_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.has_image()).count()
    }

    pub fn all_captioned(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.caption().is_some_and(|text| !text.trim().is_empty()))
    }

    pub fn snapshot(&self) -> SlotSequence {
        self.clone()
    }

    pub fn images(&self) -> Vec<Option<CapturedImage>> {
        self.slots.iter().map(|slot| slot.image.clone()).collect()
    }

    pub fn captions(&self) -> Vec<Option<String>> {
        self.slots.iter().map(|slot| slot.caption.clone()).collect()
    }

    fn index_of(&self, position: usize) -> Result<usize, SlotError> {
        if position == 0 || position > self.slots.len() {
            return Err(SlotError::IndexOutOfRange {
                position,
                len: self.slots.len(),
            });
        }
        Ok(position - 1)
    }
}

impl Default for SlotSequence {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::{CapturedImage, SlotSequence, SEQUENCE_LEN};
    use crate::errors::SlotError;

    fn png(tag: u8) -> CapturedImage {
        CapturedImage::new(vec![0x89, b'P', b'N', b'G', tag], "image/png")
    }

    #[test]
    fn fresh_sequences_are_empty_and_incomplete() -> anyhow::Result<()> {
        for len in 1..=8 {
            let sequence = SlotSequence::new(len)?;
            assert_eq!(sequence.len(), len);
            assert!(!sequence.is_complete());
            assert!(sequence.is_untouched());
            assert!(sequence
                .slots()
                .iter()
                .all(|slot| slot.image().is_none() && slot.caption().is_none()));
        }
        assert_eq!(SlotSequence::standard().len(), SEQUENCE_LEN);
        Ok(())
    }

    #[test]
    fn zero_length_is_rejected() {
        assert_eq!(SlotSequence::new(0), Err(SlotError::InvalidLength(0)));
    }

    #[test]
    fn set_image_is_write_once() -> anyhow::Result<()> {
        let mut sequence = SlotSequence::standard();
        sequence.set_image(2, png(1))?;
        let before = sequence.snapshot();

        let err = sequence.set_image(2, png(2)).unwrap_err();
        assert_eq!(err, SlotError::SlotAlreadyCaptured { position: 2 });
        assert_eq!(sequence, before);
        assert_eq!(sequence.slot(2)?.image(), Some(&png(1)));
        Ok(())
    }

    #[test]
    fn positions_outside_the_sequence_are_rejected() {
        let mut sequence = SlotSequence::standard();
        assert_eq!(
            sequence.set_image(0, png(1)),
            Err(SlotError::IndexOutOfRange {
                position: 0,
                len: SEQUENCE_LEN
            })
        );
        assert_eq!(
            sequence.set_caption(5, "late"),
            Err(SlotError::IndexOutOfRange {
                position: 5,
                len: SEQUENCE_LEN
            })
        );
        assert!(sequence.get(0).is_none());
        assert!(sequence.get(5).is_none());
        assert_eq!(sequence, SlotSequence::standard());
    }

    #[test]
    fn captions_require_a_capture_and_may_be_refined() -> anyhow::Result<()> {
        let mut sequence = SlotSequence::standard();
        assert_eq!(
            sequence.set_caption(1, "a cat"),
            Err(SlotError::SlotNotCaptured { position: 1 })
        );

        sequence.set_image(1, png(1))?;
        sequence.set_caption(1, "  a cat  ")?;
        assert_eq!(sequence.slot(1)?.caption(), Some("a cat"));

        sequence.set_caption(1, "a cat on a mat")?;
        assert_eq!(sequence.slot(1)?.caption(), Some("a cat on a mat"));

        assert_eq!(
            sequence.set_caption(1, "   "),
            Err(SlotError::EmptyCaption { position: 1 })
        );
        assert_eq!(sequence.slot(1)?.caption(), Some("a cat on a mat"));
        Ok(())
    }

    #[test]
    fn completes_once_every_slot_has_an_image() -> anyhow::Result<()> {
        let mut sequence = SlotSequence::standard();
        for position in 1..=SEQUENCE_LEN {
            assert!(!sequence.is_complete());
            sequence.set_image(position, png(position as u8))?;
        }
        assert!(sequence.is_complete());
        assert_eq!(sequence.captured_count(), SEQUENCE_LEN);
        assert!(!sequence.all_captioned());
        Ok(())
    }

    #[test]
    fn snapshots_do_not_follow_later_writes() -> anyhow::Result<()> {
        let mut sequence = SlotSequence::standard();
        sequence.set_image(1, png(1))?;
        let snapshot = sequence.snapshot();
        sequence.set_image(2, png(2))?;
        sequence.set_caption(1, "first")?;

        assert_eq!(snapshot.captured_count(), 1);
        assert_eq!(snapshot.slot(1)?.caption(), None);
        assert_eq!(snapshot.slot(1)?.image(), sequence.slot(1)?.image());
        Ok(())
    }
}
