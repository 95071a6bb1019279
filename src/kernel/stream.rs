//! Process standard streams
//!
//! A process sees one `InputStream` and two `OutputStream`s. What sits
//! behind them is decided when the pipeline is wired: the terminal input, a
//! bounded pipe to a neighbouring stage, a file in storage, or the line
//! buffer.

use crate::buffer::{Color, LineBuffer, SourceTag};
use crate::kernel::input::InputReader;
use crate::vfs::Storage;
use futures::io::{AsyncRead, AsyncWrite};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Where a process reads from
pub enum InputStream {
    /// Keystrokes sent to the terminal
    Terminal(InputReader),
    /// Read end of a pipe from the previous stage
    Pipe(piper::Reader),
    /// Immediate end-of-file
    Empty,
}

/// Where a process writes to
pub enum OutputStream {
    /// Write end of a pipe to the next stage
    Pipe(piper::Writer),
    /// A file in storage
    File(FileWriter),
    /// The terminal line buffer
    Buffer(BufferWriter),
}

/// The three standard streams of one process
pub struct StdStreams {
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputStream::Terminal(_) => f.write_str("Terminal"),
            InputStream::Pipe(_) => f.write_str("Pipe"),
            InputStream::Empty => f.write_str("Empty"),
        }
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Pipe(_) => f.write_str("Pipe"),
            OutputStream::File(w) => write!(f, "File({})", w.path),
            OutputStream::Buffer(w) => write!(f, "Buffer({})", w.source.as_str()),
        }
    }
}

impl AsyncRead for InputStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            InputStream::Terminal(r) => Pin::new(r).poll_read(cx, buf),
            InputStream::Pipe(r) => Pin::new(r).poll_read(cx, buf),
            InputStream::Empty => Poll::Ready(Ok(0)),
        }
    }
}

impl AsyncWrite for OutputStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            OutputStream::Pipe(w) => Pin::new(w).poll_write(cx, buf),
            OutputStream::File(w) => Pin::new(w).poll_write(cx, buf),
            OutputStream::Buffer(w) => Pin::new(w).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutputStream::Pipe(w) => Pin::new(w).poll_flush(cx),
            OutputStream::File(w) => Pin::new(w).poll_flush(cx),
            OutputStream::Buffer(w) => Pin::new(w).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutputStream::Pipe(w) => Pin::new(w).poll_close(cx),
            OutputStream::File(w) => Pin::new(w).poll_close(cx),
            OutputStream::Buffer(w) => Pin::new(w).poll_close(cx),
        }
    }
}

/// Writes process output into the line buffer.
///
/// Bytes are decoded as UTF-8; a multi-byte character split across two
/// writes is held back until the rest arrives. Invalid bytes become U+FFFD.
pub struct BufferWriter {
    buffer: Arc<LineBuffer>,
    color: Color,
    source: SourceTag,
    pending: Vec<u8>,
}

impl BufferWriter {
    pub fn new(buffer: Arc<LineBuffer>, color: Color, source: SourceTag) -> Self {
        Self {
            buffer,
            color,
            source,
            pending: Vec::new(),
        }
    }

    /// Append bytes and return the text that is complete so far
    fn decode(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    text.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to guarantees this prefix is UTF-8
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.buffer.write(&text, self.color, self.source);
        }
    }
}

impl AsyncWrite for BufferWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let text = this.decode(buf);
        this.buffer.write(&text, this.color, this.source);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().flush_pending();
        Poll::Ready(Ok(()))
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        self.flush_pending();
    }
}

/// Writes process output to a file in storage.
///
/// The file is created (or truncated) when the writer is opened; every
/// write after that appends. The first storage failure is reported as a
/// stderr line and later output is discarded, so the producing process
/// never sees an error.
pub struct FileWriter {
    storage: Arc<dyn Storage>,
    path: String,
    buffer: Arc<LineBuffer>,
    error_color: Color,
    failed: bool,
}

impl FileWriter {
    pub fn open(
        storage: Arc<dyn Storage>,
        path: String,
        append: bool,
        buffer: Arc<LineBuffer>,
        error_color: Color,
    ) -> Self {
        let mut writer = Self {
            storage,
            path,
            buffer,
            error_color,
            failed: false,
        };
        if let Err(e) = writer.storage.write(&writer.path, &[], append) {
            writer.fail(e);
        }
        writer
    }

    fn fail(&mut self, err: io::Error) {
        log::warn!("redirect to {} failed: {}", self.path, err);
        self.failed = true;
        self.buffer.write_line(
            &format!("{}: {}", self.path, err),
            self.error_color,
            SourceTag::Stderr,
        );
    }
}

impl AsyncWrite for FileWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.failed {
            if let Err(e) = this.storage.write(&this.path, buf, true) {
                this.fail(e);
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
