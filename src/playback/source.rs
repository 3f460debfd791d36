//! Scheduled playback sources and the sink that renders them

use crate::audio::AudioChunk;

/// Identifier of a scheduled source, unique per scheduler
pub type SourceId = u64;

/// Callback fired once when a source finishes playing on its own
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// One decoded chunk bound to a start time on the output clock
pub struct PlaybackSource {
    id: SourceId,
    chunk: AudioChunk,
    start_time: f64,
    on_ended: Option<CompletionFn>,
}

impl PlaybackSource {
    #[must_use]
    pub fn new(id: SourceId, chunk: AudioChunk, start_time: f64, on_ended: CompletionFn) -> Self {
        Self {
            id,
            chunk,
            start_time,
            on_ended: Some(on_ended),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SourceId {
        self.id
    }

    #[must_use]
    pub const fn chunk(&self) -> &AudioChunk {
        &self.chunk
    }

    /// Start time in seconds on the output clock
    #[must_use]
    pub const fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Take the completion callback, leaving `None` behind
    pub fn take_on_ended(&mut self) -> Option<CompletionFn> {
        self.on_ended.take()
    }
}

impl std::fmt::Debug for PlaybackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSource")
            .field("id", &self.id)
            .field("frames", &self.chunk.frames())
            .field("start_time", &self.start_time)
            .field("pending_completion", &self.on_ended.is_some())
            .finish()
    }
}

/// Destination for scheduled sources
///
/// Implementations must never invoke a completion callback from inside
/// [`schedule`](SourceSink::schedule) or [`stop`](SourceSink::stop): the
/// scheduler holds its lock across both calls.
pub trait SourceSink: Send + Sync {
    /// Queue a source to start at its start time
    fn schedule(&self, source: PlaybackSource);

    /// Stop a source immediately without firing its completion callback
    fn stop(&self, id: SourceId);
}
