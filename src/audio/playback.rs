//! Gapless playback scheduling with immediate interruption.

use std::collections::BTreeMap;
use std::time::Duration;

use super::types::AudioChunk;
use crate::error::Result;

/// Identifier the output device assigns to a started source.
pub type SourceId = u64;

/// An output device with its own playback clock.
///
/// The session owns exactly one output; it is passed in at construction
/// rather than looked up globally.
pub trait AudioOutput: Send {
    /// Current position of the device's playback clock.
    fn current_time(&self) -> Duration;

    /// Begin playing `chunk` at clock time `at` (or immediately if `at` has
    /// already passed).
    fn start(&mut self, chunk: &AudioChunk, at: Duration) -> Result<SourceId>;

    /// Silence a source immediately. Unknown ids are ignored.
    fn stop(&mut self, source: SourceId);

    /// Sources that finished on their own since the last call.
    fn drain_finished(&mut self) -> Vec<SourceId> {
        Vec::new()
    }
}

/// One scheduled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    id: u64,
    source: SourceId,
    start: Duration,
    end: Duration,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Effective start on the output clock.
    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Queues chunks back to back on an output clock and owns every live source.
pub struct PlaybackScheduler<O> {
    output: O,
    next_start: Duration,
    live: BTreeMap<u64, PlaybackHandle>,
    next_handle_id: u64,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            next_start: Duration::ZERO,
            live: BTreeMap::new(),
            next_handle_id: 1,
        }
    }

    /// Schedule a chunk right after everything already queued.
    ///
    /// The chunk starts at `max(next_start_time, now)` so a backlog plays
    /// without gaps and a late chunk never starts in the past.
    pub fn schedule(&mut self, chunk: &AudioChunk) -> Result<PlaybackHandle> {
        self.reap();

        let now = self.output.current_time();
        let start = self.next_start.max(now);
        let end = start + chunk.duration();
        let source = self.output.start(chunk, start)?;

        let handle = PlaybackHandle {
            id: self.next_handle_id,
            source,
            start,
            end,
        };
        self.next_handle_id += 1;
        self.next_start = end;
        self.live.insert(handle.id, handle);

        tracing::trace!(
            handle = handle.id,
            start_ms = start.as_millis() as u64,
            end_ms = end.as_millis() as u64,
            live = self.live.len(),
            "scheduled chunk"
        );
        Ok(handle)
    }

    /// Forget the handle of a source that finished on its own.
    pub fn complete(&mut self, source: SourceId) -> bool {
        let before = self.live.len();
        self.live.retain(|_, handle| handle.source != source);
        before != self.live.len()
    }

    /// Drop handles the output reported finished or whose end the clock passed.
    pub fn reap(&mut self) -> usize {
        let finished = self.output.drain_finished();
        let now = self.output.current_time();
        let before = self.live.len();
        self.live
            .retain(|_, handle| handle.end > now && !finished.contains(&handle.source));
        before - self.live.len()
    }

    /// Stop every live source immediately and forget it.
    ///
    /// The cursor is pulled back to the clock so the next chunk starts now
    /// rather than after audio that was just cut off: after three queued
    /// 0.5 s chunks are interrupted at 0.7 s, the next chunk starts at 0.7 s.
    /// A cursor already behind the clock is left alone. Returns how many
    /// sources were stopped.
    pub fn interrupt(&mut self) -> usize {
        let handles = std::mem::take(&mut self.live);
        for handle in handles.values() {
            self.output.stop(handle.source);
        }
        let now = self.output.current_time();
        self.next_start = self.next_start.min(now);
        tracing::debug!(stopped = handles.len(), "playback interrupted");
        handles.len()
    }

    /// Where the next chunk would be queued, before clamping to the clock.
    pub fn next_start_time(&self) -> Duration {
        self.next_start
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_handles(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.live.values()
    }

    pub fn is_idle(&self) -> bool {
        self.live.is_empty()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
