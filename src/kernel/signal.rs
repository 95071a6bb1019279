//! Signals
//!
//! Signals arrive as names typed or sent by the consumer (`"SIGINT"`,
//! `"CTRL+C"`, `"term"`). Numbering follows POSIX so that the exit code of a
//! process ended by a signal is `128 + number`, as a Unix shell reports it.

use std::fmt;

/// Signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Signal {
    /// Hangup
    SIGHUP = 1,
    /// Interrupt (Ctrl+C)
    SIGINT = 2,
    /// Quit
    SIGQUIT = 3,
    /// Kill process (cannot be caught)
    SIGKILL = 9,
    /// User-defined signal 1
    SIGUSR1 = 10,
    /// User-defined signal 2
    SIGUSR2 = 12,
    /// Broken pipe
    SIGPIPE = 13,
    /// Alarm timer expired
    SIGALRM = 14,
    /// Terminate process
    SIGTERM = 15,
    /// Child process terminated
    SIGCHLD = 17,
    /// Continue stopped process
    SIGCONT = 18,
    /// Stop process
    SIGSTOP = 19,
}

const ALL: [Signal; 12] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGKILL,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGSTOP,
];

/// What happens to a process that receives a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// End the process
    Terminate,
    /// End the process, no chance to clean up
    Kill,
    /// Nothing happens
    Ignore,
    /// Suspend the process
    Stop,
    /// Resume a stopped process
    Continue,
}

impl Signal {
    /// Get signal from number
    pub fn from_num(n: u8) -> Option<Signal> {
        ALL.iter().copied().find(|s| s.num() == n)
    }

    /// Parse a signal name.
    ///
    /// Case-insensitive, with or without the `SIG` prefix. `CTRL+C` and `^C`
    /// are accepted as aliases of `SIGINT`, and a bare number is accepted too.
    pub fn from_name(name: &str) -> Option<Signal> {
        let upper = name.trim().to_ascii_uppercase();
        if upper == "CTRL+C" || upper == "^C" {
            return Some(Signal::SIGINT);
        }
        if let Ok(n) = upper.parse::<u8>() {
            return Signal::from_num(n);
        }
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        ALL.iter().copied().find(|s| &s.name()[3..] == bare)
    }

    /// Get signal number
    pub fn num(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "SIGHUP",
            Signal::SIGINT => "SIGINT",
            Signal::SIGQUIT => "SIGQUIT",
            Signal::SIGKILL => "SIGKILL",
            Signal::SIGUSR1 => "SIGUSR1",
            Signal::SIGUSR2 => "SIGUSR2",
            Signal::SIGPIPE => "SIGPIPE",
            Signal::SIGALRM => "SIGALRM",
            Signal::SIGTERM => "SIGTERM",
            Signal::SIGCHLD => "SIGCHLD",
            Signal::SIGCONT => "SIGCONT",
            Signal::SIGSTOP => "SIGSTOP",
        }
    }

    /// The keyboard interrupt, echoed as `^C`
    pub fn is_interrupt(&self) -> bool {
        *self == Signal::SIGINT
    }

    /// Get default action for this signal
    pub fn default_action(&self) -> SignalAction {
        match self {
            Signal::SIGTERM
            | Signal::SIGINT
            | Signal::SIGQUIT
            | Signal::SIGHUP
            | Signal::SIGPIPE
            | Signal::SIGALRM
            | Signal::SIGUSR1
            | Signal::SIGUSR2 => SignalAction::Terminate,
            Signal::SIGKILL => SignalAction::Kill,
            Signal::SIGSTOP => SignalAction::Stop,
            Signal::SIGCONT => SignalAction::Continue,
            Signal::SIGCHLD => SignalAction::Ignore,
        }
    }

    /// Exit code reported for a process ended by this signal
    pub fn exit_code(&self) -> i32 {
        128 + i32::from(self.num())
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
