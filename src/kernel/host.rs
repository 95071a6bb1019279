//! Process host
//!
//! The terminal never runs application code itself. It asks a
//! `ProcessHost` to start a process with rebound standard streams and is
//! told about the exit code on a completion channel.
//!
//! `LocalHost` is the in-memory host: programs are async functions, each
//! process is an abortable future on a thread pool.

use super::signal::{Signal, SignalAction};
use super::stream::{InputStream, OutputStream, StdStreams};
use crate::config::TerminalConfig;
use crate::error::StartError;
use crate::vfs::Storage;
use futures::channel::mpsc::UnboundedSender;
use futures::executor::ThreadPool;
use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, BoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Exit code of a process ended by `terminate`
pub const EXIT_KILLED: i32 = 137;

/// Exit code of a process whose program panicked
pub const EXIT_PANICKED: i32 = 101;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

/// Identifier of a runnable application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        AppId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reported once when a process ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub pid: Pid,
    pub code: i32,
}

/// Where a host reports process exits
pub type ExitSender = UnboundedSender<ProcessExit>;

/// Everything needed to start one process
pub struct StartRequest {
    pub app: AppId,
    /// Arguments, without the command itself
    pub args: Vec<String>,
    /// Base for relative paths the process uses
    pub working_dir: String,
    pub streams: StdStreams,
    pub exit: ExitSender,
}

/// The contract between the terminal and whatever runs processes
pub trait ProcessHost: Send + Sync {
    /// Whether `id` names a registered application
    fn is_application(&self, id: &str) -> bool;

    /// The application installed at directory `dir`, if any
    fn application_at(&self, dir: &str) -> Option<AppId>;

    /// Whether `name` is a process kind the host runs natively
    fn is_known_process(&self, name: &str) -> bool;

    /// Start a process. Its exit code is sent on `request.exit`.
    fn start(&self, request: StartRequest) -> Result<Pid, StartError>;

    /// Force a process to end
    fn terminate(&self, pid: Pid);

    /// Deliver a named signal. Unknown names are accepted and may do nothing.
    fn signal(&self, pid: Pid, name: &str);
}

/// What a running program gets to work with
pub struct ProcessIo {
    pub args: Vec<String>,
    pub working_dir: String,
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub fs: Arc<dyn Storage>,
}

/// A program: turns its I/O into a future resolving to the exit code
pub type Program = Arc<dyn Fn(ProcessIo) -> BoxFuture<'static, i32> + Send + Sync>;

#[derive(Default)]
struct Catalog {
    /// Application id -> program
    apps: HashMap<String, Program>,
    /// Installation directory -> application id
    installs: HashMap<String, String>,
    /// Native process kinds, started by name
    kinds: HashMap<String, Program>,
}

struct Running {
    app: String,
    abort: AbortHandle,
    /// Exit code reported if the process is aborted
    kill_code: Arc<AtomicI32>,
}

#[derive(Default)]
struct ProcessTable {
    next_pid: u32,
    running: HashMap<Pid, Running>,
}

struct HostInner {
    pool: ThreadPool,
    fs: Arc<dyn Storage>,
    catalog: RwLock<Catalog>,
    table: Mutex<ProcessTable>,
    shut_down: AtomicBool,
}

/// In-memory process host
#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<HostInner>,
}

impl LocalHost {
    pub fn new(pool: ThreadPool, fs: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                pool,
                fs,
                catalog: RwLock::new(Catalog::default()),
                table: Mutex::new(ProcessTable {
                    next_pid: 1,
                    running: HashMap::new(),
                }),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// A host with the stock programs installed
    pub fn with_stock_programs(
        pool: ThreadPool,
        fs: Arc<dyn Storage>,
        config: &TerminalConfig,
    ) -> Self {
        let host = Self::new(pool, fs);
        host.install_stock_programs(config);
        host
    }

    /// Register an application under `id`
    pub fn register_app<F>(&self, id: &str, program: F)
    where
        F: Fn(ProcessIo) -> BoxFuture<'static, i32> + Send + Sync + 'static,
    {
        self.register_program(id, Arc::new(program));
    }

    pub fn register_program(&self, id: &str, program: Program) {
        let mut catalog = self.inner.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.apps.insert(id.to_string(), program);
    }

    /// Record that application `id` is installed at directory `dir`.
    ///
    /// The directory is created in storage so it shows up to programs too.
    pub fn install_at(&self, dir: &str, id: &str) {
        let dir = normalize_dir(dir);
        if let Err(e) = self.inner.fs.create_dir_all(&dir) {
            log::warn!("cannot create install directory {}: {}", dir, e);
        }
        let mut catalog = self.inner.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.installs.insert(dir, id.to_string());
    }

    /// Register a native process kind, started by its bare name
    pub fn register_process<F>(&self, name: &str, program: F)
    where
        F: Fn(ProcessIo) -> BoxFuture<'static, i32> + Send + Sync + 'static,
    {
        let mut catalog = self.inner.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.kinds.insert(name.to_string(), Arc::new(program));
    }

    /// Register every stock program as `terminal.<name>` and install it at
    /// `<terminal_apps_dir>/<name><package_suffix>`
    pub fn install_stock_programs(&self, config: &TerminalConfig) {
        for (name, program) in crate::programs::stock() {
            let id = format!("terminal.{}", name);
            self.register_program(&id, program);
            let dir = format!(
                "{}/{}{}",
                config.terminal_apps_dir.trim_end_matches('/'),
                name,
                config.package_suffix
            );
            self.install_at(&dir, &id);
        }
    }

    /// Pids of every process still running, in start order
    pub fn running(&self) -> Vec<Pid> {
        let table = super::lock(&self.inner.table);
        let mut pids: Vec<Pid> = table.running.keys().copied().collect();
        pids.sort();
        pids
    }

    /// Stop accepting new processes and end every running one
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let table = super::lock(&self.inner.table);
        for running in table.running.values() {
            running.kill_code.store(EXIT_KILLED, Ordering::SeqCst);
            running.abort.abort();
        }
    }

    fn lookup(&self, id: &str) -> Option<Program> {
        let catalog = self.inner.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog
            .apps
            .get(id)
            .or_else(|| catalog.kinds.get(id))
            .cloned()
    }

    /// Abort `pid`, reporting `code` as its exit code
    fn kill(&self, pid: Pid, code: i32) -> bool {
        let table = super::lock(&self.inner.table);
        match table.running.get(&pid) {
            Some(running) => {
                running.kill_code.store(code, Ordering::SeqCst);
                running.abort.abort();
                true
            }
            None => false,
        }
    }
}

impl ProcessHost for LocalHost {
    fn is_application(&self, id: &str) -> bool {
        let catalog = self.inner.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.apps.contains_key(id)
    }

    fn application_at(&self, dir: &str) -> Option<AppId> {
        let catalog = self.inner.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.installs.get(&normalize_dir(dir)).cloned().map(AppId)
    }

    fn is_known_process(&self, name: &str) -> bool {
        let catalog = self.inner.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.kinds.contains_key(name)
    }

    fn start(&self, request: StartRequest) -> Result<Pid, StartError> {
        let StartRequest {
            app,
            args,
            working_dir,
            streams,
            exit,
        } = request;

        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(StartError::Rejected {
                app: app.0,
                reason: "host is shut down".into(),
            });
        }
        let program = self
            .lookup(app.as_str())
            .ok_or_else(|| StartError::UnknownApplication(app.0.clone()))?;

        let (abort, registration) = AbortHandle::new_pair();
        let kill_code = Arc::new(AtomicI32::new(EXIT_KILLED));

        let pid = {
            let mut table = super::lock(&self.inner.table);
            let pid = Pid(table.next_pid);
            table.next_pid += 1;
            table.running.insert(
                pid,
                Running {
                    app: app.0.clone(),
                    abort,
                    kill_code: kill_code.clone(),
                },
            );
            pid
        };

        let io = ProcessIo {
            args,
            working_dir,
            stdin: streams.stdin,
            stdout: streams.stdout,
            stderr: streams.stderr,
            fs: self.inner.fs.clone(),
        };
        let process = Abortable::new(AssertUnwindSafe(program(io)).catch_unwind(), registration);
        let inner = self.inner.clone();

        log::debug!("{} started as {}", app, pid);
        self.inner.pool.spawn_ok(async move {
            let code = match process.await {
                Ok(Ok(code)) => code,
                Ok(Err(_panic)) => {
                    log::warn!("{} panicked", pid);
                    EXIT_PANICKED
                }
                Err(_aborted) => kill_code.load(Ordering::SeqCst),
            };
            super::lock(&inner.table).running.remove(&pid);
            log::debug!("{} exited with {}", pid, code);
            // The terminal may already be gone
            let _ = exit.unbounded_send(ProcessExit { pid, code });
        });

        Ok(pid)
    }

    fn terminate(&self, pid: Pid) {
        if !self.kill(pid, EXIT_KILLED) {
            log::debug!("terminate: {} is not running", pid);
        }
    }

    fn signal(&self, pid: Pid, name: &str) {
        let Some(signal) = Signal::from_name(name) else {
            log::debug!("signal {:?} to {} has no effect", name, pid);
            return;
        };
        match signal.default_action() {
            SignalAction::Terminate | SignalAction::Kill => {
                if !self.kill(pid, signal.exit_code()) {
                    log::debug!("{}: {} is not running", signal, pid);
                }
            }
            SignalAction::Ignore => log::debug!("{} ignored by {}", signal, pid),
            SignalAction::Stop | SignalAction::Continue => {
                log::warn!("{} is not supported for {}", signal, pid)
            }
        }
    }
}

/// Absolute path without a trailing slash
fn normalize_dir(dir: &str) -> String {
    let parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Color, LineBuffer, SourceTag};
    use crate::kernel::events::Notifier;
    use crate::kernel::stream::BufferWriter;
    use crate::vfs::MemoryFs;
    use futures::StreamExt;
    use futures::channel::mpsc;
    use futures::executor::block_on;
    use futures::io::AsyncWriteExt;

    fn host() -> LocalHost {
        let pool = ThreadPool::builder().pool_size(2).create().unwrap();
        LocalHost::new(pool, Arc::new(Mutex::new(MemoryFs::new())))
    }

    fn streams(buffer: &Arc<LineBuffer>) -> StdStreams {
        StdStreams {
            stdin: InputStream::Empty,
            stdout: OutputStream::Buffer(BufferWriter::new(
                buffer.clone(),
                Color::White,
                SourceTag::Stdout,
            )),
            stderr: OutputStream::Buffer(BufferWriter::new(
                buffer.clone(),
                Color::Red,
                SourceTag::Stderr,
            )),
        }
    }

    #[test]
    fn test_start_reports_exit() {
        let host = host();
        host.register_app("test.hello", |mut io: ProcessIo| {
            Box::pin(async move {
                let _ = io.stdout.write_all(b"hello\n").await;
                3
            })
        });

        let buffer = Arc::new(LineBuffer::new(10, Arc::new(Notifier::new())));
        let (tx, mut rx) = mpsc::unbounded();
        let pid = host
            .start(StartRequest {
                app: AppId::new("test.hello"),
                args: vec![],
                working_dir: "/".into(),
                streams: streams(&buffer),
                exit: tx,
            })
            .unwrap();

        let exit = block_on(rx.next()).unwrap();
        assert_eq!(exit, ProcessExit { pid, code: 3 });
        assert_eq!(buffer.lines_text(), vec!["hello"]);
        assert!(host.running().is_empty());
    }

    #[test]
    fn test_unknown_application() {
        let host = host();
        let buffer = Arc::new(LineBuffer::new(10, Arc::new(Notifier::new())));
        let (tx, _rx) = mpsc::unbounded();
        let err = host
            .start(StartRequest {
                app: AppId::new("nope"),
                args: vec![],
                working_dir: "/".into(),
                streams: streams(&buffer),
                exit: tx,
            })
            .unwrap_err();
        assert_eq!(err, StartError::UnknownApplication("nope".into()));
    }

    fn start_forever(host: &LocalHost) -> (Pid, mpsc::UnboundedReceiver<ProcessExit>) {
        host.register_app("test.forever", |_io: ProcessIo| {
            Box::pin(futures::future::pending::<i32>())
        });
        let buffer = Arc::new(LineBuffer::new(10, Arc::new(Notifier::new())));
        let (tx, rx) = mpsc::unbounded();
        let pid = host
            .start(StartRequest {
                app: AppId::new("test.forever"),
                args: vec![],
                working_dir: "/".into(),
                streams: streams(&buffer),
                exit: tx,
            })
            .unwrap();
        (pid, rx)
    }

    #[test]
    fn test_panicking_program_still_exits() {
        let host = host();
        async fn boom(_io: ProcessIo) -> i32 {
            panic!("boom")
        }
        host.register_app("test.boom", |io| Box::pin(boom(io)));
        let buffer = Arc::new(LineBuffer::new(10, Arc::new(Notifier::new())));
        let (tx, mut rx) = mpsc::unbounded();
        let pid = host
            .start(StartRequest {
                app: AppId::new("test.boom"),
                args: vec![],
                working_dir: "/".into(),
                streams: streams(&buffer),
                exit: tx,
            })
            .unwrap();

        let exit = block_on(rx.next()).unwrap();
        assert_eq!(exit, ProcessExit { pid, code: EXIT_PANICKED });
        assert!(host.running().is_empty());
    }

    #[test]
    fn test_terminate() {
        let host = host();
        let (pid, mut rx) = start_forever(&host);
        assert_eq!(host.running(), vec![pid]);

        host.terminate(pid);
        let exit = block_on(rx.next()).unwrap();
        assert_eq!(exit.code, EXIT_KILLED);
    }

    #[test]
    fn test_interrupt_exit_code() {
        let host = host();
        let (pid, mut rx) = start_forever(&host);
        host.signal(pid, "CTRL+C");
        assert_eq!(block_on(rx.next()).unwrap().code, 130);
    }

    #[test]
    fn test_ignored_and_unknown_signals() {
        let host = host();
        let (pid, _rx) = start_forever(&host);
        host.signal(pid, "SIGCHLD");
        host.signal(pid, "SIGWHATEVER");
        host.signal(pid, "SIGSTOP");
        assert_eq!(host.running(), vec![pid]);
        host.terminate(pid);
    }

    #[test]
    fn test_shutdown_rejects_new_processes() {
        let host = host();
        let (_pid, mut rx) = start_forever(&host);
        host.shutdown();
        assert_eq!(block_on(rx.next()).unwrap().code, EXIT_KILLED);

        let buffer = Arc::new(LineBuffer::new(10, Arc::new(Notifier::new())));
        let (tx, _rx) = mpsc::unbounded();
        let err = host
            .start(StartRequest {
                app: AppId::new("test.forever"),
                args: vec![],
                working_dir: "/".into(),
                streams: streams(&buffer),
                exit: tx,
            })
            .unwrap_err();
        assert!(matches!(err, StartError::Rejected { .. }));
    }

    #[test]
    fn test_install_and_lookup() {
        let host = host();
        host.register_app("acme.tool", |_io: ProcessIo| Box::pin(async { 0 }));
        host.install_at("/Apps/Tool.app/", "acme.tool");
        host.register_process("daemon", |_io: ProcessIo| Box::pin(async { 0 }));

        assert!(host.is_application("acme.tool"));
        assert!(!host.is_application("daemon"));
        assert_eq!(host.application_at("/Apps/Tool.app"), Some(AppId::new("acme.tool")));
        assert_eq!(host.application_at("/Apps/Other.app"), None);
        assert!(host.is_known_process("daemon"));
        assert!(host.inner.fs.is_dir("/Apps/Tool.app"));
    }

    #[test]
    fn test_stock_programs_installed() {
        let host = host();
        host.install_stock_programs(&TerminalConfig::default());
        assert!(host.is_application("terminal.echo"));
        assert_eq!(
            host.application_at("/System/Terminal/wc.app"),
            Some(AppId::new("terminal.wc"))
        );
    }
}
