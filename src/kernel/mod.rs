//! The kernel - processes, streams, signals and notifications
//!
//! Everything the terminal needs from below it:
//! - a process contract (`ProcessHost`) and an in-memory host
//! - the stream types a process reads and writes
//! - signal names and their default actions
//! - the terminal input queue and the event fan-out

pub mod events;
pub mod host;
pub mod input;
pub mod signal;
pub mod stream;

pub use events::{Notifier, TerminalEvent};
pub use host::{
    AppId, EXIT_KILLED, EXIT_PANICKED, ExitSender, LocalHost, Pid, ProcessExit, ProcessHost,
    ProcessIo, Program, StartRequest,
};
pub use input::{InputReader, TerminalInput};
pub use signal::{Signal, SignalAction};
pub use stream::{BufferWriter, FileWriter, InputStream, OutputStream, StdStreams};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
