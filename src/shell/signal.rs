//! Signal routing to the active pipeline

use super::scheduler::JobScheduler;
use crate::buffer::{Color, LineBuffer, SourceTag};
use crate::kernel::signal::Signal;
use std::sync::Arc;

pub struct SignalRouter {
    scheduler: JobScheduler,
    buffer: Arc<LineBuffer>,
    system_color: Color,
}

impl SignalRouter {
    pub fn new(scheduler: JobScheduler, buffer: Arc<LineBuffer>, system_color: Color) -> Self {
        Self {
            scheduler,
            buffer,
            system_color,
        }
    }

    /// Forward signal `name` to every process of the active pipeline.
    ///
    /// An interrupt is echoed as `^C` first. Names the terminal does not
    /// know are still forwarded; the host decides what they mean. Returns
    /// the number of processes signalled.
    pub fn send(&self, name: &str) -> usize {
        let host = self.scheduler.executor().host().clone();
        let parsed = Signal::from_name(name);

        self.scheduler.with_active(|pids| {
            if pids.is_empty() {
                log::debug!("signal {} with no active pipeline", name);
                return 0;
            }
            if parsed.is_some_and(|s| s.is_interrupt()) {
                self.buffer
                    .write_line("^C", self.system_color, SourceTag::System);
            }
            let forwarded = parsed.map_or(name, |s| s.name());
            for pid in pids {
                log::debug!("{} -> {}", forwarded, pid);
                host.signal(*pid, forwarded);
            }
            pids.len()
        })
    }

    /// Force every process of the active pipeline to end. Queued jobs stay queued.
    pub fn terminate_all(&self) -> usize {
        let host = self.scheduler.executor().host().clone();
        self.scheduler.with_active(|pids| {
            for pid in pids {
                log::info!("terminating {}", pid);
                host.terminate(*pid);
            }
            pids.len()
        })
    }
}
