//! pipeterm - a virtual terminal with a small shell and pipeline engine
//!
//! A line typed into the terminal is split into jobs joined by `&&`, `||`
//! and `;`, each job into `|`-connected stages, and every stage is resolved
//! to an application and started on a process host with its standard
//! streams wired to pipes, files or the terminal's line buffer.
//!
//! Design principles:
//! - One pipeline at a time; later submissions queue
//! - Nothing blocks the caller; processes report back asynchronously
//! - Collaborators (process host, storage) are injected, never global
//!
//! ```no_run
//! use futures::executor::ThreadPool;
//! use pipeterm::{LocalHost, MemoryFs, Terminal, TerminalConfig};
//! use std::sync::{Arc, Mutex};
//!
//! let config = TerminalConfig::default();
//! let pool = ThreadPool::new().unwrap();
//! let fs = Arc::new(Mutex::new(MemoryFs::new()));
//! let host = LocalHost::with_stock_programs(pool.clone(), fs.clone(), &config);
//! let terminal = Terminal::new(config, Arc::new(host), fs, pool);
//! terminal.execute_command("echo hello | wc -c > count.txt");
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod kernel;
pub mod programs;
pub mod shell;
pub mod vfs;

pub use buffer::{BufferSnapshot, Color, LineBuffer, SourceTag, TerminalLine};
pub use config::TerminalConfig;
pub use error::{ConfigError, SnapshotError, StartError};
pub use kernel::{LocalHost, Pid, ProcessHost, Signal, TerminalEvent};
pub use shell::Terminal;
pub use vfs::{MemoryFs, Storage};
