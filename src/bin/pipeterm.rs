//! pipeterm CLI - line-oriented REPL over a virtual terminal
//!
//! Run with: cargo run --bin pipeterm -- [--config FILE] [--fs FILE] [--log-level LEVEL]
//!
//! While a pipeline runs, typed lines become its input; `^C` interrupts it
//! and `^D` ends its input.

use futures::StreamExt;
use futures::channel::mpsc;
use futures::executor::{ThreadPool, block_on};
use pipeterm::vfs::FsSnapshot;
use pipeterm::{LocalHost, MemoryFs, Terminal, TerminalConfig, TerminalEvent, TerminalLine};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

const USAGE: &str = "usage: pipeterm [--config FILE] [--fs FILE] [--log-level LEVEL]";

struct Args {
    config: Option<PathBuf>,
    fs: Option<PathBuf>,
    log_level: LevelFilter,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut args = Args {
        config: None,
        fs: None,
        log_level: LevelFilter::Warn,
    };
    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Long("config") => args.config = Some(parser.value()?.into()),
            Long("fs") => args.fs = Some(parser.value()?.into()),
            Long("log-level") => args.log_level = parser.value()?.parse()?,
            Short('h') | Long("help") => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }
    Ok(args)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("pipeterm: {}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    let _ = TermLogger::init(
        args.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let config = match &args.config {
        Some(path) => match TerminalConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("pipeterm: {}", e);
                std::process::exit(2);
            }
        },
        None => TerminalConfig::default(),
    };

    let fs = match &args.fs {
        Some(path) if path.exists() => match FsSnapshot::load(path) {
            Ok(snapshot) => MemoryFs::restore(&snapshot),
            Err(e) => {
                eprintln!("pipeterm: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        _ => MemoryFs::new(),
    };
    let fs = Arc::new(Mutex::new(fs));

    let pool = match ThreadPool::new() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("pipeterm: cannot start thread pool: {}", e);
            std::process::exit(1);
        }
    };
    let host = LocalHost::with_stock_programs(pool.clone(), fs.clone(), &config);
    let terminal = Terminal::new(config, Arc::new(host.clone()), fs.clone(), pool);

    println!("pipeterm v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' to leave.\n");

    block_on(repl(&terminal));
    host.shutdown();

    if let Some(path) = &args.fs {
        let snapshot = fs.lock().unwrap_or_else(PoisonError::into_inner).snapshot();
        if let Err(e) = snapshot.save(path) {
            eprintln!("pipeterm: {}: {}", path.display(), e);
        }
    }
}

/// Read stdin on its own thread; lines arrive on the returned channel
fn spawn_stdin() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.unbounded_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn repl(terminal: &Terminal) {
    let mut events = terminal.events();
    let mut lines = spawn_stdin();
    let mut stdin_open = true;
    prompt();

    loop {
        futures::select! {
            event = events.next() => match event {
                Some(TerminalEvent::BufferChanged(_)) => {
                    render(&terminal.buffer().drain_complete());
                }
                Some(TerminalEvent::Idle) => {
                    render(&terminal.buffer().drain_all());
                    if !stdin_open {
                        break;
                    }
                    prompt();
                }
                None => break,
            },
            line = lines.next() => match line {
                Some(line) => {
                    if !handle_line(terminal, &line) {
                        break;
                    }
                }
                None => {
                    stdin_open = false;
                    if !terminal.is_busy() {
                        println!();
                        break;
                    }
                    terminal.close_input();
                }
            },
        }
    }
}

/// Returns false when the user asked to leave
fn handle_line(terminal: &Terminal, line: &str) -> bool {
    if terminal.is_busy() {
        match line.trim() {
            "^C" => {
                terminal.send_signal("SIGINT");
            }
            "^D" => terminal.close_input(),
            _ => terminal.send_input(&format!("{}\n", line)),
        }
        return true;
    }

    match line.trim() {
        "exit" | "quit" => {
            println!("Goodbye!");
            false
        }
        "clear" => {
            terminal.clear();
            prompt();
            true
        }
        _ => {
            terminal.execute_command(line);
            true
        }
    }
}

fn prompt() {
    print!("$ ");
    let _ = io::stdout().flush();
}

/// Print lines with their colors as real SGR sequences
fn render(lines: &[TerminalLine]) {
    let mut out = io::stdout().lock();
    for line in lines {
        for segment in &line.segments {
            let _ = write!(out, "\x1b[{}m{}", segment.color.sgr(), segment.text);
        }
        let _ = writeln!(out, "\x1b[0m");
    }
    let _ = out.flush();
}
