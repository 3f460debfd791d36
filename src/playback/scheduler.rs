//! Gap-free playback scheduling with barge-in
//!
//! The scheduler keeps a cursor on the output clock. Every received chunk is
//! placed exactly at the cursor, which then advances by the chunk's duration,
//! so consecutive chunks play back-to-back. An interrupt flushes everything
//! queued or playing and lets the next chunk anchor a fresh timeline.
//!
//! The cursor and the active set share one mutex. Chunk arrival, interrupt,
//! reset and natural completion all go through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::audio::{AudioChunk, AudioClock};
use crate::{Error, Result};

use super::source::{PlaybackSource, SourceId, SourceSink};

/// Default cap on sources queued or playing at once
pub const DEFAULT_MAX_ACTIVE_SOURCES: usize = 512;

/// Where and for how long a source was placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,

    /// Start time in seconds on the output clock
    pub start_time: f64,

    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledSource {
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    cursor: f64,
    next_id: SourceId,
    active: HashMap<SourceId, ScheduledSource>,
}

/// Schedules inbound chunks onto a [`SourceSink`]
pub struct PlaybackScheduler {
    state: Arc<Mutex<SchedulerState>>,
    clock: Arc<dyn AudioClock>,
    sink: Arc<dyn SourceSink>,
    max_active: usize,
}

impl PlaybackScheduler {
    /// Create a scheduler whose cursor starts at the clock's current time
    #[must_use]
    pub fn new(clock: Arc<dyn AudioClock>, sink: Arc<dyn SourceSink>, max_active: usize) -> Self {
        let state = SchedulerState {
            cursor: clock.now(),
            ..SchedulerState::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
            sink,
            max_active: max_active.max(1),
        }
    }

    /// Schedule a decoded chunk right after everything already queued
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the active set is at capacity; the chunk is
    /// dropped and the cursor is left as it was
    pub fn on_chunk_received(&self, chunk: AudioChunk) -> Result<ScheduledSource> {
        let mut state = self.lock();

        if state.active.len() >= self.max_active {
            return Err(Error::QueueFull(format!(
                "{} playback sources already active",
                state.active.len()
            )));
        }

        state.cursor = state.cursor.max(self.clock.now());

        let id = state.next_id;
        state.next_id += 1;

        let scheduled = ScheduledSource {
            id,
            start_time: state.cursor,
            duration: chunk.duration(),
        };

        let on_ended = completion_handler(Arc::downgrade(&self.state), id);
        self.sink
            .schedule(PlaybackSource::new(id, chunk, scheduled.start_time, on_ended));

        state.active.insert(id, scheduled);
        state.cursor += scheduled.duration;

        tracing::trace!(
            id,
            start = scheduled.start_time,
            duration = scheduled.duration,
            "playback source scheduled"
        );

        Ok(scheduled)
    }

    /// Flush all queued and playing audio after a barge-in
    ///
    /// The cursor drops to zero so the next chunk is clamped to the clock.
    pub fn on_interrupt(&self) {
        let mut state = self.lock();
        let stopped = self.stop_all(&mut state);
        state.cursor = 0.0;
        tracing::debug!(stopped, "playback interrupted");
    }

    /// Stop everything and re-anchor the cursor at the current clock time
    pub fn reset(&self) {
        let mut state = self.lock();
        let stopped = self.stop_all(&mut state);
        state.cursor = self.clock.now();
        tracing::debug!(stopped, cursor = state.cursor, "playback reset");
    }

    /// Time at which the next chunk would start, before clamping
    #[must_use]
    pub fn cursor(&self) -> f64 {
        self.lock().cursor
    }

    /// Number of sources queued or playing
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().active.is_empty()
    }

    /// Active sources ordered by start time
    #[must_use]
    pub fn active_sources(&self) -> Vec<ScheduledSource> {
        let mut sources: Vec<_> = self.lock().active.values().copied().collect();
        sources.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        sources
    }

    fn stop_all(&self, state: &mut SchedulerState) -> usize {
        let stopped = state.active.len();
        for id in state.active.drain().map(|(id, _)| id) {
            self.sink.stop(id);
        }
        stopped
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completion handler that removes `id` from the active set if still present
fn completion_handler(state: Weak<Mutex<SchedulerState>>, id: SourceId) -> Box<dyn FnOnce() + Send> {
    Box::new(move || {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active.remove(&id).is_some() {
            tracing::trace!(id, "playback source ended");
        }
    })
}
