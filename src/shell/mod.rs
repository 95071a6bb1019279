//! Shell - command interpreter and pipeline engine
//!
//! A submitted line flows through:
//! - the parser, which splits it into jobs, stages and redirections
//! - the resolver, which maps each stage's command to an application
//! - the wiring, which builds every stage's standard streams
//! - the executor, which starts the stages on the process host
//! - the scheduler, which runs one job at a time and honours `&&`/`||`
//!
//! The [`Terminal`] facade ties them to the line buffer.

pub mod executor;
pub mod parser;
pub mod resolver;
pub mod scheduler;
pub mod signal;
pub mod terminal;
pub mod wiring;

pub use executor::{EXIT_FAILED_TO_LAUNCH, Launch, PipelineExecutor};
pub use parser::{CommandCall, LogicalOp, PipelineJob, parse_line, split_pipeline, tokenize};
pub use resolver::CommandResolver;
pub use scheduler::{JobScheduler, Phase};
pub use signal::SignalRouter;
pub use terminal::Terminal;
pub use wiring::StreamWiring;
