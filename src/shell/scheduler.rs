//! Job scheduler
//!
//! Owns the job queue, the active pipeline and the last exit code, all
//! under one lock. At most one pipeline runs at a time. Submitting while a
//! pipeline runs only queues; the queue advances when the last process of
//! the active pipeline exits.
//!
//! ```text
//!   Idle --submit--> Draining --launch--> Running
//!    ^                  |  ^                 |
//!    +---queue empty----+  +---last exit-----+
//! ```
//!
//! Each launched pipeline gets a watcher task that feeds its process exits
//! back into the scheduler.

use super::executor::PipelineExecutor;
use super::parser::{LogicalOp, PipelineJob};
use crate::kernel::events::{Notifier, TerminalEvent};
use crate::kernel::host::{EXIT_KILLED, Pid, ProcessExit};
use crate::kernel::lock;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::ThreadPool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing queued, nothing running
    Idle,
    /// Picking the next job to run
    Draining,
    /// A pipeline is active
    Running,
}

struct SchedulerState {
    queue: VecDeque<PipelineJob>,
    active: Vec<Pid>,
    last_exit_code: i32,
    phase: Phase,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    executor: PipelineExecutor,
    spawner: ThreadPool,
    events: Arc<Notifier<TerminalEvent>>,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(
        executor: PipelineExecutor,
        spawner: ThreadPool,
        events: Arc<Notifier<TerminalEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    queue: VecDeque::new(),
                    active: Vec::new(),
                    last_exit_code: 0,
                    phase: Phase::Idle,
                }),
                executor,
                spawner,
                events,
            }),
        }
    }

    /// Queue jobs; start draining if nothing is running.
    ///
    /// Submitting nothing while idle still completes one Idle transition,
    /// so the consumer can prompt again.
    pub fn submit(&self, jobs: Vec<PipelineJob>) {
        let idle = {
            let mut state = lock(&self.inner.state);
            state.queue.extend(jobs);
            if state.phase == Phase::Idle {
                self.drain(&mut state)
            } else {
                log::debug!("queued behind active pipeline ({} waiting)", state.queue.len());
                false
            }
        };
        if idle {
            self.inner.events.notify(TerminalEvent::Idle);
        }
    }

    /// Record a process exit; advance the queue when the pipeline is done
    pub fn on_process_exit(&self, exit: ProcessExit) {
        let idle = {
            let mut state = lock(&self.inner.state);
            let Some(pos) = state.active.iter().position(|p| *p == exit.pid) else {
                log::debug!("exit of untracked {} ignored", exit.pid);
                return;
            };
            state.active.remove(pos);
            state.last_exit_code = exit.code;
            log::debug!("{} exited with {}", exit.pid, exit.code);

            if state.active.is_empty() {
                log::info!("pipeline finished with exit code {}", exit.code);
                self.drain(&mut state)
            } else {
                false
            }
        };
        if idle {
            self.inner.events.notify(TerminalEvent::Idle);
        }
    }

    /// Run queued jobs until one is running or the queue is empty.
    ///
    /// Returns true when the scheduler went idle.
    fn drain(&self, state: &mut SchedulerState) -> bool {
        state.phase = Phase::Draining;

        while let Some(job) = state.queue.pop_front() {
            if !job.operator.should_run(state.last_exit_code) {
                log::debug!(
                    "skipping {:?} job after exit code {}",
                    job.operator.as_str(),
                    state.last_exit_code
                );
                if job.operator == LogicalOp::And {
                    // A failed && takes the rest of its chain with it
                    while state
                        .queue
                        .front()
                        .is_some_and(|next| next.operator.is_conditional())
                    {
                        state.queue.pop_front();
                    }
                }
                continue;
            }

            let launch = self.inner.executor.launch(&job);
            if let Some(code) = launch.failure_code {
                state.last_exit_code = code;
            }
            if launch.pids.is_empty() {
                continue;
            }

            state.active = launch.pids.clone();
            state.phase = Phase::Running;
            self.watch(launch.pids, launch.exits);
            return false;
        }

        state.phase = Phase::Idle;
        true
    }

    fn watch(&self, pids: Vec<Pid>, mut exits: UnboundedReceiver<ProcessExit>) {
        let scheduler = self.clone();
        self.inner.spawner.spawn_ok(async move {
            while let Some(exit) = exits.next().await {
                scheduler.on_process_exit(exit);
            }
            scheduler.on_pipeline_closed(&pids);
        });
    }

    /// Every exit sender of a pipeline is gone.
    ///
    /// Any of its processes still marked active ended without reporting;
    /// they count as killed so the queue can move on.
    fn on_pipeline_closed(&self, pids: &[Pid]) {
        let idle = {
            let mut state = lock(&self.inner.state);
            let before = state.active.len();
            state.active.retain(|pid| !pids.contains(pid));
            let lost = before - state.active.len();
            if lost == 0 {
                return;
            }
            log::warn!("{} process(es) ended without reporting an exit", lost);
            state.last_exit_code = EXIT_KILLED;
            if state.active.is_empty() {
                self.drain(&mut state)
            } else {
                false
            }
        };
        if idle {
            self.inner.events.notify(TerminalEvent::Idle);
        }
    }

    /// Run `f` on the active pids while holding the scheduler lock
    pub fn with_active<R>(&self, f: impl FnOnce(&[Pid]) -> R) -> R {
        let state = lock(&self.inner.state);
        f(&state.active)
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.inner.executor
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner.state).phase
    }

    /// Whether anything is running or queued
    pub fn is_busy(&self) -> bool {
        let state = lock(&self.inner.state);
        state.phase != Phase::Idle || !state.queue.is_empty()
    }

    pub fn active_pids(&self) -> Vec<Pid> {
        lock(&self.inner.state).active.clone()
    }

    pub fn last_exit_code(&self) -> i32 {
        lock(&self.inner.state).last_exit_code
    }

    pub fn queued_jobs(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::LineBuffer;
    use crate::config::TerminalConfig;
    use crate::error::StartError;
    use crate::kernel::host::{AppId, ProcessHost, StartRequest};
    use crate::kernel::input::TerminalInput;
    use crate::shell::parser::parse_line;
    use crate::shell::resolver::CommandResolver;
    use crate::shell::wiring::StreamWiring;
    use crate::vfs::MemoryFs;

    /// A host whose processes only end when the test says so
    #[derive(Default)]
    struct ManualHost {
        started: Mutex<Vec<(Pid, String)>>,
        exits: Mutex<Vec<crate::kernel::host::ExitSender>>,
    }

    impl ManualHost {
        fn started(&self) -> Vec<String> {
            lock(&self.started).iter().map(|(_, a)| a.clone()).collect()
        }

        /// Forget every process without reporting its exit
        fn lose_all(&self) {
            lock(&self.exits).clear();
        }
    }

    impl ProcessHost for ManualHost {
        fn is_application(&self, id: &str) -> bool {
            id != "missing"
        }

        fn application_at(&self, _dir: &str) -> Option<AppId> {
            None
        }

        fn is_known_process(&self, _name: &str) -> bool {
            false
        }

        fn start(&self, request: StartRequest) -> Result<Pid, StartError> {
            let mut started = lock(&self.started);
            let pid = Pid(started.len() as u32 + 1);
            started.push((pid, request.app.0));
            lock(&self.exits).push(request.exit);
            Ok(pid)
        }

        fn terminate(&self, _pid: Pid) {}

        fn signal(&self, _pid: Pid, _name: &str) {}
    }

    fn scheduler(host: Arc<ManualHost>) -> (JobScheduler, UnboundedReceiver<TerminalEvent>) {
        let config = TerminalConfig::default();
        let events = Arc::new(Notifier::new());
        let rx = events.subscribe();
        let buffer = Arc::new(LineBuffer::new(100, events.clone()));
        let storage = Arc::new(Mutex::new(MemoryFs::new()));
        let wiring = StreamWiring::new(TerminalInput::new(), buffer.clone(), storage, &config);
        let resolver = CommandResolver::new(host.clone(), &config);
        let executor = PipelineExecutor::new(
            host,
            resolver,
            wiring,
            buffer,
            config.error_color,
            config.working_dir.clone(),
        );
        let pool = ThreadPool::builder().pool_size(1).create().unwrap();
        (JobScheduler::new(executor, pool, events), rx)
    }

    fn exit(pid: u32, code: i32) -> ProcessExit {
        ProcessExit {
            pid: Pid(pid),
            code,
        }
    }

    fn idles(rx: &mut UnboundedReceiver<TerminalEvent>) -> usize {
        let mut n = 0;
        while let Ok(Some(event)) = rx.try_next() {
            if event == TerminalEvent::Idle {
                n += 1;
            }
        }
        n
    }

    #[test]
    fn test_one_pipeline_at_a_time() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("first ; second"));
        assert_eq!(host.started(), vec!["first"]);
        assert_eq!(s.phase(), Phase::Running);
        assert_eq!(s.queued_jobs(), 1);

        // Submitting while running only queues
        s.submit(parse_line("third"));
        assert_eq!(host.started(), vec!["first"]);

        s.on_process_exit(exit(1, 0));
        assert_eq!(host.started(), vec!["first", "second"]);
        s.on_process_exit(exit(2, 0));
        assert_eq!(host.started(), vec!["first", "second", "third"]);
        s.on_process_exit(exit(3, 0));
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.is_busy());
    }

    #[test]
    fn test_and_skips_after_failure() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("false && echo A"));
        s.on_process_exit(exit(1, 1));
        assert_eq!(host.started(), vec!["false"]);
        assert_eq!(s.last_exit_code(), 1);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_and_skip_propagates_through_conditionals() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("false && a || b && c ; d"));
        s.on_process_exit(exit(1, 1));
        assert_eq!(host.started(), vec!["false", "d"]);
    }

    #[test]
    fn test_or_runs_after_failure() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("false || echo A"));
        s.on_process_exit(exit(1, 1));
        assert_eq!(host.started(), vec!["false", "echo"]);
    }

    #[test]
    fn test_or_skipped_after_success() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("true || echo A ; after"));
        s.on_process_exit(exit(1, 0));
        assert_eq!(host.started(), vec!["true", "after"]);
    }

    #[test]
    fn test_last_terminating_stage_sets_exit_code() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("a | b"));
        assert_eq!(s.active_pids(), vec![Pid(1), Pid(2)]);
        s.on_process_exit(exit(2, 0));
        assert_eq!(s.phase(), Phase::Running);
        s.on_process_exit(exit(1, 5));
        assert_eq!(s.last_exit_code(), 5);
        assert!(s.active_pids().is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_exits_ignored() {
        let host = Arc::new(ManualHost::default());
        let (s, mut rx) = scheduler(host.clone());

        s.submit(parse_line("a"));
        s.on_process_exit(exit(99, 7));
        assert_eq!(s.phase(), Phase::Running);

        s.on_process_exit(exit(1, 0));
        s.on_process_exit(exit(1, 3));
        assert_eq!(s.last_exit_code(), 0);
        assert_eq!(idles(&mut rx), 1);
    }

    #[test]
    fn test_unresolved_job_does_not_stall_queue() {
        let host = Arc::new(ManualHost::default());
        let (s, mut rx) = scheduler(host.clone());

        s.submit(parse_line("missing ; next"));
        assert_eq!(host.started(), vec!["next"]);
        assert_eq!(s.last_exit_code(), 1);

        s.on_process_exit(exit(1, 0));
        assert_eq!(idles(&mut rx), 1);
    }

    #[test]
    fn test_unresolved_then_and_is_skipped() {
        let host = Arc::new(ManualHost::default());
        let (s, mut rx) = scheduler(host.clone());

        s.submit(parse_line("missing && next"));
        assert!(host.started().is_empty());
        assert_eq!(s.last_exit_code(), 1);
        assert_eq!(idles(&mut rx), 1);
    }

    #[test]
    fn test_empty_submission_while_idle() {
        let host = Arc::new(ManualHost::default());
        let (s, mut rx) = scheduler(host);
        s.submit(Vec::new());
        assert_eq!(idles(&mut rx), 1);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_lost_processes_release_scheduler() {
        let host = Arc::new(ManualHost::default());
        let (s, mut rx) = scheduler(host.clone());

        s.submit(parse_line("a | b"));
        host.lose_all();
        futures::executor::block_on(async {
            while let Some(event) = rx.next().await {
                if event == TerminalEvent::Idle {
                    break;
                }
            }
        });
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.active_pids().is_empty());
        assert_eq!(s.last_exit_code(), EXIT_KILLED);

        s.submit(parse_line("next"));
        assert_eq!(host.started(), vec!["a", "b", "next"]);
    }

    #[test]
    fn test_closed_pipeline_leaves_successor_alone() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host.clone());

        s.submit(parse_line("a ; b"));
        s.on_process_exit(exit(1, 0));
        assert_eq!(s.active_pids(), vec![Pid(2)]);

        // The first pipeline's channel closing must not touch the second
        s.on_pipeline_closed(&[Pid(1)]);
        assert_eq!(s.active_pids(), vec![Pid(2)]);
        assert_eq!(s.phase(), Phase::Running);
    }

    #[test]
    fn test_with_active_sees_pipeline() {
        let host = Arc::new(ManualHost::default());
        let (s, _rx) = scheduler(host);
        s.submit(parse_line("a | b | c"));
        assert_eq!(s.with_active(|pids| pids.len()), 3);
    }
}
