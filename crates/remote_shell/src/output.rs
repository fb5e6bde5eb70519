//! Output batching for the display.
//!
//! Shell output arrives in many small chunks. They are queued in an
//! [`OutputBuffer`] and written to the display as one update per flush tick,
//! with terminal control sequences removed.

use crate::sink::DisplaySink;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::borrow::Cow;
use std::time::{Duration, Instant};

/// Sequences a plain text view cannot render.
///
/// CSI (cursor, colour, bracketed paste modes), OSC titles terminated by BEL
/// or ST, charset designations, keypad mode switches, bare BEL, and CR.
static CONTROL_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][0-9]*;[^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1b[=>]|\x07|\r",
    )
    .expect("control sequence pattern is valid")
});

/// A control sequence cut off at the end of the text.
static INCOMPLETE_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-9;?]*|\][0-9]*(?:;[^\x07\x1b]*\x1b?)?|[()])?\z")
        .expect("incomplete tail pattern is valid")
});

/// Longest tail held back waiting for the rest of its sequence.
const MAX_HELD_TAIL: usize = 256;

/// Text a batch must reduce to for it to be treated as a screen clear.
pub const CLEAR_COMMAND: &str = "clear";

/// Remove terminal control sequences from `text`.
pub fn strip_control_sequences(text: &str) -> Cow<'_, str> {
    CONTROL_SEQUENCE.replace_all(text, "")
}

/// Split `text` before a trailing control sequence that is not finished yet.
pub fn split_incomplete_tail(text: &str) -> (&str, &str) {
    match INCOMPLETE_TAIL.find(text) {
        Some(tail) if tail.len() <= MAX_HELD_TAIL => text.split_at(tail.start()),
        _ => (text, ""),
    }
}

/// What a flushed batch does to the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    Clear,
    Append(String),
}

/// Turn a raw batch into a display update, or nothing if it is all control codes.
pub fn render_batch(raw: &str) -> Option<DisplayUpdate> {
    let clean = strip_control_sequences(raw);
    let visible = clean.trim();
    if visible == CLEAR_COMMAND || (visible.is_empty() && raw.contains(CLEAR_COMMAND)) {
        return Some(DisplayUpdate::Clear);
    }
    if clean.is_empty() {
        return None;
    }
    Some(DisplayUpdate::Append(clean.into_owned()))
}

/// Chunks waiting for the next flush.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    chunks: Vec<String>,
    /// Unfinished control sequence from the previous batch.
    held: String,
    suppressed_until: Option<Instant>,
}

impl OutputBuffer {
    /// Queue a chunk. Returns `false` if it was dropped by an active suppression window.
    pub fn push(&mut self, chunk: String) -> bool {
        if let Some(until) = self.suppressed_until {
            if Instant::now() < until {
                return false;
            }
            self.suppressed_until = None;
        }
        self.chunks.push(chunk);
        true
    }

    /// Discard pending chunks and ignore new ones for `window`.
    pub fn suppress_for(&mut self, window: Duration) {
        self.chunks.clear();
        self.held.clear();
        self.suppressed_until = Some(Instant::now() + window);
    }

    /// Drain every pending chunk as one string, in arrival order.
    ///
    /// A control sequence still open at the end is held back and prefixed to
    /// the next batch, so it is stripped as a whole.
    pub fn take_batch(&mut self) -> Option<String> {
        if self.chunks.is_empty() {
            return None;
        }
        let mut batch = std::mem::take(&mut self.held);
        for chunk in self.chunks.drain(..) {
            batch.push_str(&chunk);
        }
        let held = split_incomplete_tail(&batch).1.len();
        self.held = batch.split_off(batch.len() - held);
        if batch.is_empty() {
            return None;
        }
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Output buffer shared between the pump, the flush timer, and the submitter.
///
/// Flushes are serialized so two flushers can never deliver batches out of
/// order; the buffer itself is only locked long enough to push or drain.
#[derive(Debug, Default)]
pub struct SharedOutput {
    buffer: Mutex<OutputBuffer>,
    flush_gate: Mutex<()>,
}

impl SharedOutput {
    pub fn push(&self, chunk: String) -> bool {
        self.buffer.lock().push(chunk)
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Write pending output to `sink`. Returns `false`, without touching
    /// the sink, when nothing was ready to show.
    pub fn flush(&self, sink: &dyn DisplaySink) -> bool {
        let _gate = self.flush_gate.lock();
        let batch = self.buffer.lock().take_batch();
        let Some(batch) = batch else {
            return false;
        };
        match render_batch(&batch) {
            Some(DisplayUpdate::Clear) => sink.clear(),
            Some(DisplayUpdate::Append(text)) => sink.append(&text),
            None => {}
        }
        true
    }

    /// Clear the display now and drop what would have repainted it.
    pub fn clear_display(&self, sink: &dyn DisplaySink, suppress: Duration) {
        let _gate = self.flush_gate.lock();
        self.buffer.lock().suppress_for(suppress);
        sink.clear();
    }
}
