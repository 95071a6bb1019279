//! Terminal line buffer
//!
//! An append-only, height-bounded list of display lines. Writes may end
//! mid-line; the next write then continues the same line. Embedded SGR color
//! sequences are decoded into colored segments as text arrives.
//!
//! Each `write` is one mutation: however many lines it touches, consumers
//! see a single `BufferChanged` notification carrying the new revision.

mod ansi;

pub use ansi::{AnsiState, Color, Segment};

use crate::kernel::events::{Notifier, TerminalEvent};
use crate::kernel::lock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Where a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Written by the terminal itself
    System,
    /// A process's standard output
    Stdout,
    /// A process's standard error
    Stderr,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::System => "system",
            SourceTag::Stdout => "stdout",
            SourceTag::Stderr => "stderr",
        }
    }
}

/// One display line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalLine {
    pub segments: Vec<Segment>,
    pub source: SourceTag,
}

impl TerminalLine {
    fn new(source: SourceTag) -> Self {
        Self {
            segments: Vec::new(),
            source,
        }
    }

    /// The line's text without colors
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Append segments, merging with the last one when the color matches
    fn extend(&mut self, segments: Vec<Segment>) {
        for seg in segments {
            match self.segments.last_mut() {
                Some(last) if last.color == seg.color => last.text.push_str(&seg.text),
                _ => self.segments.push(seg),
            }
        }
    }
}

/// A read-only copy of the buffer for rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub lines: Vec<TerminalLine>,
    pub is_last_line_complete: bool,
    pub revision: u64,
}

struct BufferState {
    lines: VecDeque<TerminalLine>,
    last_complete: bool,
    ansi: AnsiState,
    max_height: usize,
    revision: u64,
}

impl BufferState {
    fn trim(&mut self) {
        while self.lines.len() > self.max_height {
            self.lines.pop_front();
        }
    }

    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// The ANSI-aware line buffer
pub struct LineBuffer {
    state: Mutex<BufferState>,
    events: Arc<Notifier<TerminalEvent>>,
}

impl LineBuffer {
    pub fn new(max_height: usize, events: Arc<Notifier<TerminalEvent>>) -> Self {
        Self {
            state: Mutex::new(BufferState {
                lines: VecDeque::new(),
                last_complete: true,
                ansi: AnsiState::new(),
                max_height: max_height.max(1),
                revision: 0,
            }),
            events,
        }
    }

    /// Append text, continuing the last line if it was left incomplete.
    ///
    /// `default` colors any text not covered by an SGR sequence.
    pub fn write(&self, text: &str, default: Color, source: SourceTag) {
        if text.is_empty() {
            return;
        }

        let revision = {
            let mut state = lock(&self.state);
            let ends_complete = text.ends_with('\n');
            let mut parts: Vec<&str> = text.split('\n').collect();
            if ends_complete {
                parts.pop();
            }
            let count = parts.len();

            for (i, part) in parts.into_iter().enumerate() {
                let part = part.strip_suffix('\r').unwrap_or(part);
                let completes = i + 1 < count || ends_complete;
                let segments = state.ansi.decode(part, default, !completes);

                let continues = !state.last_complete && !state.lines.is_empty();
                if !continues {
                    state.lines.push_back(TerminalLine::new(source));
                }
                if let Some(line) = state.lines.back_mut() {
                    line.extend(segments);
                }

                state.last_complete = completes;
                if completes {
                    // Color does not carry over into the next line
                    state.ansi.reset();
                }
            }

            state.trim();
            state.bump()
        };

        self.events.notify(TerminalEvent::BufferChanged(revision));
    }

    /// Write a whole line on a fresh line, bypassing any partial line
    pub fn write_line(&self, text: &str, color: Color, source: SourceTag) {
        let revision = {
            let mut state = lock(&self.state);
            state.ansi.reset();
            let mut line = TerminalLine::new(source);
            let segments = state.ansi.decode(text, color, false);
            line.extend(segments);
            state.ansi.reset();
            state.lines.push_back(line);
            state.last_complete = true;
            state.trim();
            state.bump()
        };

        self.events.notify(TerminalEvent::BufferChanged(revision));
    }

    /// Remove every line and reset color state
    pub fn clear(&self) {
        let revision = {
            let mut state = lock(&self.state);
            state.lines.clear();
            state.last_complete = true;
            state.ansi.reset();
            state.bump()
        };

        self.events.notify(TerminalEvent::BufferChanged(revision));
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let state = lock(&self.state);
        BufferSnapshot {
            lines: state.lines.iter().cloned().collect(),
            is_last_line_complete: state.last_complete,
            revision: state.revision,
        }
    }

    /// Plain text of every line
    pub fn lines_text(&self) -> Vec<String> {
        lock(&self.state).lines.iter().map(TerminalLine::text).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_last_line_complete(&self) -> bool {
        lock(&self.state).last_complete
    }

    pub fn revision(&self) -> u64 {
        lock(&self.state).revision
    }

    pub fn max_height(&self) -> usize {
        lock(&self.state).max_height
    }

    /// Take every completed line out of the buffer.
    ///
    /// Used by streaming renderers that print lines once and forget them.
    /// A trailing partial line stays in place.
    pub fn drain_complete(&self) -> Vec<TerminalLine> {
        let mut state = lock(&self.state);
        let keep = usize::from(!state.last_complete && !state.lines.is_empty());
        let take = state.lines.len() - keep;
        state.lines.drain(..take).collect()
    }

    /// Take every line, partial or not; the next write starts a new line
    pub fn drain_all(&self) -> Vec<TerminalLine> {
        let mut state = lock(&self.state);
        state.last_complete = true;
        state.ansi.reset();
        state.lines.drain(..).collect()
    }
}
