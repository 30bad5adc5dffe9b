pub mod chat;
pub mod errors;
pub mod events;
pub mod narrative;
pub mod reconcile;
pub mod runs;
pub mod slots;

pub use errors::{CaptureError, SessionWarning, SlotError, UnrecognizedResponseShape};
pub use narrative::{synthesize, NarrativeSource, SessionNarrative};
pub use reconcile::{reconcile, CaptionAssignment, Reconciliation, ResponseShape};
pub use slots::{CapturedImage, Slot, SlotSequence, SEQUENCE_LEN};
