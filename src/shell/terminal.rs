//! Terminal - the consumer-facing surface
//!
//! Wires parser, scheduler, signal router and line buffer together around
//! an injected process host and storage. Nothing here returns an error:
//! failures surface as exit codes and buffer lines.

use super::executor::PipelineExecutor;
use super::parser::parse_line;
use super::resolver::CommandResolver;
use super::scheduler::JobScheduler;
use super::signal::SignalRouter;
use super::wiring::StreamWiring;
use crate::buffer::{BufferSnapshot, Color, LineBuffer, SourceTag};
use crate::config::TerminalConfig;
use crate::kernel::events::{Notifier, TerminalEvent};
use crate::kernel::host::{Pid, ProcessHost};
use crate::kernel::input::TerminalInput;
use crate::vfs::Storage;
use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::ThreadPool;
use std::sync::Arc;

struct TerminalInner {
    config: TerminalConfig,
    buffer: Arc<LineBuffer>,
    input: TerminalInput,
    scheduler: JobScheduler,
    signals: SignalRouter,
    events: Arc<Notifier<TerminalEvent>>,
}

/// A virtual terminal. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Terminal {
    inner: Arc<TerminalInner>,
}

impl Terminal {
    /// Build a terminal over `host` and `storage`.
    ///
    /// `spawner` runs the tasks that watch for process exits.
    pub fn new(
        config: TerminalConfig,
        host: Arc<dyn ProcessHost>,
        storage: Arc<dyn Storage>,
        spawner: ThreadPool,
    ) -> Self {
        let events = Arc::new(Notifier::new());
        let buffer = Arc::new(LineBuffer::new(config.max_height, events.clone()));
        let input = TerminalInput::new();

        let wiring = StreamWiring::new(input.clone(), buffer.clone(), storage, &config);
        let resolver = CommandResolver::new(host.clone(), &config);
        let executor = PipelineExecutor::new(
            host,
            resolver,
            wiring,
            buffer.clone(),
            config.error_color,
            config.working_dir.clone(),
        );
        let scheduler = JobScheduler::new(executor, spawner, events.clone());
        let signals = SignalRouter::new(scheduler.clone(), buffer.clone(), config.system_color);

        Self {
            inner: Arc::new(TerminalInner {
                config,
                buffer,
                input,
                scheduler,
                signals,
                events,
            }),
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.inner.config
    }

    /// Parse `line` and queue its jobs.
    ///
    /// Returns immediately; output arrives through the buffer and an
    /// `Idle` event follows once everything queued has finished.
    pub fn execute_command(&self, line: &str) {
        let jobs = parse_line(line);
        log::debug!("{:?} -> {} job(s)", line, jobs.len());
        self.inner.scheduler.submit(jobs);
    }

    /// Feed keystrokes to the active pipeline's first stage
    pub fn send_input(&self, text: &str) {
        if !self.is_busy() {
            log::debug!("input with no active pipeline discarded");
            return;
        }
        self.inner.input.push(text.as_bytes());
    }

    /// End of input for the active pipeline's first stage
    pub fn close_input(&self) {
        if self.is_busy() {
            self.inner.input.close();
        }
    }

    /// Force every process of the active pipeline to end
    pub fn terminate_active_process(&self) {
        self.inner.signals.terminate_all();
    }

    /// Deliver signal `name` to the active pipeline. Returns how many processes got it.
    pub fn send_signal(&self, name: &str) -> usize {
        self.inner.signals.send(name)
    }

    pub fn clear(&self) {
        self.inner.buffer.clear();
    }

    /// Write raw text, ANSI sequences included, as system output
    pub fn write(&self, text: &str) {
        self.inner
            .buffer
            .write(text, self.inner.config.default_color, SourceTag::System);
    }

    /// Write one complete system line, in `color` or the system color
    pub fn write_line(&self, text: &str, color: Option<Color>) {
        let color = color.unwrap_or(self.inner.config.system_color);
        self.inner.buffer.write_line(text, color, SourceTag::System);
    }

    /// Subscribe to buffer and idle notifications
    pub fn events(&self) -> UnboundedReceiver<TerminalEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.inner.buffer.snapshot()
    }

    /// Plain text of every line, colors dropped
    pub fn lines(&self) -> Vec<String> {
        self.inner.buffer.lines_text()
    }

    pub fn buffer(&self) -> &Arc<LineBuffer> {
        &self.inner.buffer
    }

    pub fn is_busy(&self) -> bool {
        self.inner.scheduler.is_busy()
    }

    pub fn active_pids(&self) -> Vec<Pid> {
        self.inner.scheduler.active_pids()
    }

    pub fn last_exit_code(&self) -> i32 {
        self.inner.scheduler.last_exit_code()
    }

    pub fn queued_jobs(&self) -> usize {
        self.inner.scheduler.queued_jobs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::host::LocalHost;
    use crate::vfs::MemoryFs;
    use futures::StreamExt;
    use futures::executor::block_on;
    use std::sync::Mutex;

    fn terminal() -> Terminal {
        let config = TerminalConfig::default();
        let pool = ThreadPool::builder().pool_size(2).create().unwrap();
        let storage = Arc::new(Mutex::new(MemoryFs::new()));
        let host = LocalHost::with_stock_programs(pool.clone(), storage.clone(), &config);
        Terminal::new(config, Arc::new(host), storage, pool)
    }

    fn run(term: &Terminal, line: &str) {
        let mut events = term.events();
        term.execute_command(line);
        block_on(async {
            while let Some(event) = events.next().await {
                if event == TerminalEvent::Idle {
                    break;
                }
            }
        });
    }

    #[test]
    fn test_echo() {
        let term = terminal();
        run(&term, "echo hello world");
        assert_eq!(term.lines(), vec!["hello world"]);
        assert_eq!(term.last_exit_code(), 0);
        assert!(!term.is_busy());
    }

    #[test]
    fn test_write_line_uses_system_color() {
        let term = terminal();
        term.write_line("notice", None);
        term.write_line("alert", Some(Color::Yellow));
        let snap = term.snapshot();
        assert_eq!(snap.lines[0].segments[0].color, Color::BrightBlack);
        assert_eq!(snap.lines[1].segments[0].color, Color::Yellow);
        assert!(snap.is_last_line_complete);
    }

    #[test]
    fn test_write_decodes_ansi() {
        let term = terminal();
        term.write("\x1b[32mok\x1b[0m done\n");
        let snap = term.snapshot();
        assert_eq!(snap.lines[0].text(), "ok done");
        assert_eq!(snap.lines[0].segments[0].color, Color::Green);
    }

    #[test]
    fn test_clear() {
        let term = terminal();
        term.write_line("x", None);
        term.clear();
        assert!(term.lines().is_empty());
    }

    #[test]
    fn test_input_discarded_while_idle() {
        let term = terminal();
        term.send_input("ignored\n");
        term.close_input();
        assert_eq!(term.inner.input.pending(), 0);
    }

    #[test]
    fn test_input_reaches_cat() {
        let term = terminal();
        let mut events = term.events();
        term.execute_command("cat");
        term.send_input("typed\n");
        term.close_input();
        block_on(async {
            while let Some(event) = events.next().await {
                if event == TerminalEvent::Idle {
                    break;
                }
            }
        });
        assert_eq!(term.lines(), vec!["typed"]);
    }

    #[test]
    fn test_signal_without_pipeline() {
        let term = terminal();
        assert_eq!(term.send_signal("SIGINT"), 0);
        term.terminate_active_process();
        assert!(term.lines().is_empty());
    }
}
