//! Playback chain
//!
//! Inbound chunks go through the [`PlaybackScheduler`], which places them on
//! the [`Mixer`]'s timeline. An [`OutputDevice`] renders the mixer to the
//! speakers and drives the output clock.

mod mixer;
mod output;
mod scheduler;
mod source;

pub use mixer::Mixer;
pub use output::OutputDevice;
pub use scheduler::{DEFAULT_MAX_ACTIVE_SOURCES, PlaybackScheduler, ScheduledSource};
pub use source::{CompletionFn, PlaybackSource, SourceId, SourceSink};
