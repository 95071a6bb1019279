//! Terminal input queue
//!
//! Keystrokes sent to the terminal while a pipeline runs are queued here and
//! read by the first stage of that pipeline. Each pipeline gets a fresh
//! reader: handing one out discards anything left over from the previous
//! pipeline and detaches older readers, which from then on read end-of-file.

use futures::io::AsyncRead;
use futures::task::AtomicWaker;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use super::lock;

#[derive(Debug, Default)]
struct InputState {
    data: VecDeque<u8>,
    eof: bool,
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<InputState>,
    waker: AtomicWaker,
}

/// The terminal's persistent input
#[derive(Debug, Clone, Default)]
pub struct TerminalInput {
    shared: Arc<Shared>,
}

impl TerminalInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the current reader
    pub fn push(&self, data: &[u8]) {
        {
            let mut state = lock(&self.shared.state);
            state.data.extend(data);
        }
        self.shared.waker.wake();
    }

    /// Signal end of input to the current reader
    pub fn close(&self) {
        lock(&self.shared.state).eof = true;
        self.shared.waker.wake();
    }

    /// Bytes waiting to be read
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).data.len()
    }

    /// Hand out a reader for a new pipeline
    pub fn reader(&self) -> InputReader {
        let generation = {
            let mut state = lock(&self.shared.state);
            state.data.clear();
            state.eof = false;
            state.generation += 1;
            state.generation
        };
        // A reader parked on the previous generation must see its EOF
        self.shared.waker.wake();
        InputReader {
            shared: self.shared.clone(),
            generation,
        }
    }
}

/// Read end of the terminal input, bound to one pipeline
#[derive(Debug)]
pub struct InputReader {
    shared: Arc<Shared>,
    generation: u64,
}

impl AsyncRead for InputReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = lock(&self.shared.state);
        if state.generation != self.generation {
            return Poll::Ready(Ok(0));
        }
        if !state.data.is_empty() {
            let n = buf.len().min(state.data.len());
            for (slot, byte) in buf.iter_mut().zip(state.data.drain(..n)) {
                *slot = byte;
            }
            return Poll::Ready(Ok(n));
        }
        if state.eof {
            return Poll::Ready(Ok(0));
        }
        self.shared.waker.register(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::io::AsyncReadExt;

    #[test]
    fn test_read_pushed_data() {
        let input = TerminalInput::new();
        let mut reader = input.reader();
        input.push(b"hello");
        input.close();

        let mut out = String::new();
        block_on(reader.read_to_string(&mut out)).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_new_reader_discards_stale_input() {
        let input = TerminalInput::new();
        input.push(b"stale");
        let mut reader = input.reader();
        assert_eq!(input.pending(), 0);

        input.push(b"fresh");
        input.close();
        let mut out = String::new();
        block_on(reader.read_to_string(&mut out)).unwrap();
        assert_eq!(out, "fresh");
    }

    #[test]
    fn test_old_reader_sees_eof() {
        let input = TerminalInput::new();
        let mut old = input.reader();
        let _new = input.reader();
        input.push(b"for the new one");

        let mut buf = [0u8; 8];
        assert_eq!(block_on(old.read(&mut buf)).unwrap(), 0);
        assert_eq!(input.pending(), 15);
    }

    #[test]
    fn test_reader_wakes_on_push() {
        let input = TerminalInput::new();
        let mut reader = input.reader();
        let writer = input.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            writer.push(b"late");
            writer.close();
        });

        let mut out = String::new();
        block_on(reader.read_to_string(&mut out)).unwrap();
        handle.join().unwrap();
        assert_eq!(out, "late");
    }

    #[test]
    fn test_new_reader_flushes_stale_input() {
        let input = TerminalInput::new();
        input.push(b"abc");
        let _reader = input.reader();
        assert_eq!(input.pending(), 0);
    }
}
