//! Playback synchronization
//!
//! The reconciler merges local user actions and remote broadcasts into a
//! single authoritative decision about what the media element should be
//! doing, and is the only component allowed to drive the [`MediaSink`].

mod reconciler;
mod sink;

pub use reconciler::{PlaybackPhase, PlaybackReconciler};
pub use sink::{MediaSink, RecordingSink, SinkOp};
