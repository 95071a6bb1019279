//! Stream wiring for one pipeline
//!
//! Stage 0 reads the terminal input. Each stage writes either into a pipe
//! feeding the next stage, into a file when it carries a redirection, or
//! into the line buffer when it is last. A stage after a redirected one
//! reads nothing. Standard error always goes to the line buffer.

use super::parser::CommandCall;
use crate::buffer::{Color, LineBuffer, SourceTag};
use crate::config::TerminalConfig;
use crate::kernel::input::TerminalInput;
use crate::kernel::stream::{BufferWriter, FileWriter, InputStream, OutputStream, StdStreams};
use crate::vfs::{Storage, join_path};
use std::sync::Arc;

pub struct StreamWiring {
    input: TerminalInput,
    buffer: Arc<LineBuffer>,
    storage: Arc<dyn Storage>,
    pipe_capacity: usize,
    working_dir: String,
    default_color: Color,
    error_color: Color,
}

impl StreamWiring {
    pub fn new(
        input: TerminalInput,
        buffer: Arc<LineBuffer>,
        storage: Arc<dyn Storage>,
        config: &TerminalConfig,
    ) -> Self {
        Self {
            input,
            buffer,
            storage,
            pipe_capacity: config.pipe_capacity.max(1),
            working_dir: config.working_dir.clone(),
            default_color: config.default_color,
            error_color: config.error_color,
        }
    }

    /// Build one set of streams per stage, in stage order
    pub fn wire(&self, calls: &[CommandCall]) -> Vec<StdStreams> {
        let mut next_input = InputStream::Terminal(self.input.reader());
        let mut wired = Vec::with_capacity(calls.len());

        for (i, call) in calls.iter().enumerate() {
            let stdin = std::mem::replace(&mut next_input, InputStream::Empty);
            let is_last = i + 1 == calls.len();

            let stdout = match &call.redirection_path {
                Some(path) => OutputStream::File(FileWriter::open(
                    self.storage.clone(),
                    join_path(&self.working_dir, path),
                    call.append_redirection,
                    self.buffer.clone(),
                    self.error_color,
                )),
                None if !is_last => {
                    let (reader, writer) = piper::pipe(self.pipe_capacity);
                    next_input = InputStream::Pipe(reader);
                    OutputStream::Pipe(writer)
                }
                None => OutputStream::Buffer(BufferWriter::new(
                    self.buffer.clone(),
                    self.default_color,
                    SourceTag::Stdout,
                )),
            };

            let stderr = OutputStream::Buffer(BufferWriter::new(
                self.buffer.clone(),
                self.error_color,
                SourceTag::Stderr,
            ));

            wired.push(StdStreams {
                stdin,
                stdout,
                stderr,
            });
        }
        wired
    }
}
