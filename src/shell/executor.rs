//! Pipeline executor
//!
//! Resolves and starts every stage of one job with its wired streams.
//! A stage that cannot be resolved or started gets one red system line and
//! counts as a failure with exit code 1; the remaining stages still start.
//! Exits of the started processes arrive on the returned channel.

use super::parser::PipelineJob;
use super::resolver::CommandResolver;
use super::wiring::StreamWiring;
use crate::buffer::{Color, LineBuffer, SourceTag};
use crate::kernel::host::{Pid, ProcessExit, ProcessHost, StartRequest};
use futures::channel::mpsc::{self, UnboundedReceiver};
use std::sync::Arc;

/// Exit code recorded for a stage that never started
pub const EXIT_FAILED_TO_LAUNCH: i32 = 1;

/// Result of launching one job
pub struct Launch {
    /// Processes that started, in stage order
    pub pids: Vec<Pid>,
    /// Where their exits are reported
    pub exits: UnboundedReceiver<ProcessExit>,
    /// Set when some stage could not be resolved or started
    pub failure_code: Option<i32>,
}

pub struct PipelineExecutor {
    host: Arc<dyn ProcessHost>,
    resolver: CommandResolver,
    wiring: StreamWiring,
    buffer: Arc<LineBuffer>,
    error_color: Color,
    working_dir: String,
}

impl PipelineExecutor {
    pub fn new(
        host: Arc<dyn ProcessHost>,
        resolver: CommandResolver,
        wiring: StreamWiring,
        buffer: Arc<LineBuffer>,
        error_color: Color,
        working_dir: String,
    ) -> Self {
        Self {
            host,
            resolver,
            wiring,
            buffer,
            error_color,
            working_dir,
        }
    }

    pub fn host(&self) -> &Arc<dyn ProcessHost> {
        &self.host
    }

    /// Start every stage of `job`
    pub fn launch(&self, job: &PipelineJob) -> Launch {
        let (exit_tx, exits) = mpsc::unbounded();
        let streams = self.wiring.wire(&job.commands);
        let mut pids = Vec::new();
        let mut failure_code = None;

        for (call, streams) in job.commands.iter().zip(streams) {
            let mut argv = call.argv().into_iter();
            let Some(command) = argv.next() else {
                continue;
            };
            let args: Vec<String> = argv.collect();

            let Some(app) = self.resolver.resolve(&command) else {
                log::warn!("command not found: {}", command);
                self.report(&format!(
                    "{} is not recognized as a command or application",
                    command
                ));
                failure_code = Some(EXIT_FAILED_TO_LAUNCH);
                continue;
            };

            let request = StartRequest {
                app: app.clone(),
                args,
                working_dir: self.working_dir.clone(),
                streams,
                exit: exit_tx.clone(),
            };
            match self.host.start(request) {
                Ok(pid) => {
                    log::debug!("{} -> {} as {}", command, app, pid);
                    pids.push(pid);
                }
                Err(e) => {
                    log::warn!("{} failed to start: {}", command, e);
                    self.report(&format!("{} failed to start", command));
                    failure_code = Some(EXIT_FAILED_TO_LAUNCH);
                }
            }
        }

        if !pids.is_empty() {
            log::info!(
                "pipeline started: {} stage(s), pids {:?}",
                job.commands.len(),
                pids
            );
        }
        Launch {
            pids,
            exits,
            failure_code,
        }
    }

    fn report(&self, message: &str) {
        self.buffer
            .write_line(message, self.error_color, SourceTag::System);
    }
}
