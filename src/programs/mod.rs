//! Stock terminal programs
//!
//! Small streaming tools installed with the local host: echo, cat, wc,
//! head, grep, true, false, yes and color. Each reads its stdin lazily and
//! writes as it goes, so they compose through pipes with backpressure.

use crate::buffer::Color;
use crate::kernel::host::{ProcessIo, Program};
use crate::kernel::stream::{InputStream, OutputStream};
use crate::vfs::join_path;
use futures::future::BoxFuture;
use futures::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Every stock program with the name it is installed under
pub fn stock() -> Vec<(&'static str, Program)> {
    fn program(f: fn(ProcessIo) -> BoxFuture<'static, i32>) -> Program {
        Arc::new(f)
    }

    vec![
        ("echo", program(|io| Box::pin(echo(io)))),
        ("cat", program(|io| Box::pin(cat(io)))),
        ("wc", program(|io| Box::pin(wc(io)))),
        ("head", program(|io| Box::pin(head(io)))),
        ("grep", program(|io| Box::pin(grep(io)))),
        ("true", program(|_| Box::pin(async { 0 }))),
        ("false", program(|_| Box::pin(async { 1 }))),
        ("yes", program(|io| Box::pin(yes(io)))),
        ("color", program(|io| Box::pin(color(io)))),
    ]
}

/// Write a whole string; false once the reader has gone away
async fn emit(out: &mut OutputStream, text: &str) -> bool {
    out.write_all(text.as_bytes()).await.is_ok()
}

/// Report a usage or runtime error on stderr
async fn complain(io: &mut ProcessIo, program: &str, message: &str) {
    let _ = io
        .stderr
        .write_all(format!("{}: {}\n", program, message).as_bytes())
        .await;
}

/// Read a file named on the command line
fn read_arg(io: &ProcessIo, path: &str) -> std::io::Result<Vec<u8>> {
    io.fs.read(&join_path(&io.working_dir, path))
}

/// Yields once to the executor so a busy writer can be aborted
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// echo - print arguments
async fn echo(mut io: ProcessIo) -> i32 {
    let mut args = io.args.as_slice();
    let newline = match args.first() {
        Some(flag) if flag == "-n" => {
            args = &args[1..];
            false
        }
        _ => true,
    };
    let mut text = args.join(" ");
    if newline {
        text.push('\n');
    }
    if emit(&mut io.stdout, &text).await { 0 } else { 1 }
}

/// cat - copy files (or stdin) to stdout
async fn cat(mut io: ProcessIo) -> i32 {
    if io.args.is_empty() {
        let mut buf = [0u8; 4096];
        loop {
            match io.stdin.read(&mut buf).await {
                Ok(0) => return 0,
                Ok(n) => {
                    if io.stdout.write_all(&buf[..n]).await.is_err() {
                        return 0;
                    }
                }
                Err(e) => {
                    complain(&mut io, "cat", &e.to_string()).await;
                    return 1;
                }
            }
        }
    }

    let mut code = 0;
    for path in io.args.clone() {
        match read_arg(&io, &path) {
            Ok(data) => {
                if io.stdout.write_all(&data).await.is_err() {
                    return 0;
                }
            }
            Err(e) => {
                complain(&mut io, "cat", &format!("{}: {}", path, e)).await;
                code = 1;
            }
        }
    }
    code
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

impl Counts {
    fn of(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        Counts {
            lines: data.iter().filter(|b| **b == b'\n').count(),
            words: text.split_whitespace().count(),
            bytes: data.len(),
        }
    }
}

/// wc - count lines, words and bytes
async fn wc(mut io: ProcessIo) -> i32 {
    let (mut lines, mut words, mut bytes) = (false, false, false);
    let mut files = Vec::new();
    for arg in &io.args {
        match arg.as_str() {
            "-l" => lines = true,
            "-w" => words = true,
            "-c" => bytes = true,
            _ => files.push(arg.clone()),
        }
    }
    if !(lines || words || bytes) {
        (lines, words, bytes) = (true, true, true);
    }

    let data = if files.is_empty() {
        let mut data = Vec::new();
        if let Err(e) = io.stdin.read_to_end(&mut data).await {
            complain(&mut io, "wc", &e.to_string()).await;
            return 1;
        }
        data
    } else {
        let mut data = Vec::new();
        for path in &files {
            match read_arg(&io, path) {
                Ok(content) => data.extend(content),
                Err(e) => {
                    complain(&mut io, "wc", &format!("{}: {}", path, e)).await;
                    return 1;
                }
            }
        }
        data
    };

    let counts = Counts::of(&data);
    let mut fields = Vec::new();
    if lines {
        fields.push(counts.lines.to_string());
    }
    if words {
        fields.push(counts.words.to_string());
    }
    if bytes {
        fields.push(counts.bytes.to_string());
    }
    emit(&mut io.stdout, &format!("{}\n", fields.join(" "))).await;
    0
}

/// head - output the first lines (default 10)
async fn head(mut io: ProcessIo) -> i32 {
    let mut n = 10usize;
    let mut file = None;
    let mut args = io.args.clone().into_iter();
    while let Some(arg) = args.next() {
        if arg == "-n" {
            match args.next().and_then(|v| v.parse().ok()) {
                Some(v) => n = v,
                None => {
                    complain(&mut io, "head", "-n needs a number").await;
                    return 2;
                }
            }
        } else if let Some(v) = arg.strip_prefix("-n") {
            match v.parse() {
                Ok(v) => n = v,
                Err(_) => {
                    complain(&mut io, "head", &format!("invalid count: {}", v)).await;
                    return 2;
                }
            }
        } else {
            file = Some(arg);
        }
    }

    if let Some(path) = file {
        return match read_arg(&io, &path) {
            Ok(data) => {
                let text = String::from_utf8_lossy(&data);
                for line in text.split_inclusive('\n').take(n) {
                    if !emit(&mut io.stdout, line).await {
                        break;
                    }
                }
                0
            }
            Err(e) => {
                complain(&mut io, "head", &format!("{}: {}", path, e)).await;
                1
            }
        };
    }

    let stdin = std::mem::replace(&mut io.stdin, InputStream::Empty);
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();
    for _ in 0..n {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if !emit(&mut io.stdout, &line).await {
                    break;
                }
            }
            Err(e) => {
                complain(&mut io, "head", &e.to_string()).await;
                return 1;
            }
        }
    }
    0
}

/// grep - print lines containing a pattern
///
/// Exit code 0 when something matched, 1 when nothing did, 2 on misuse.
async fn grep(mut io: ProcessIo) -> i32 {
    let mut invert = false;
    let mut ignore_case = false;
    let mut pattern = None;
    for arg in &io.args {
        match arg.as_str() {
            "-v" => invert = true,
            "-i" => ignore_case = true,
            _ if pattern.is_none() => pattern = Some(arg.clone()),
            _ => {}
        }
    }
    let Some(pattern) = pattern else {
        complain(&mut io, "grep", "usage: grep [-v] [-i] PATTERN").await;
        return 2;
    };
    let needle = if ignore_case {
        pattern.to_lowercase()
    } else {
        pattern
    };

    let stdin = std::mem::replace(&mut io.stdin, InputStream::Empty);
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();
    let mut matched = false;
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let hit = if ignore_case {
                    line.to_lowercase().contains(&needle)
                } else {
                    line.contains(&needle)
                };
                if hit != invert {
                    matched = true;
                    if !line.ends_with('\n') {
                        line.push('\n');
                    }
                    if !emit(&mut io.stdout, &line).await {
                        break;
                    }
                }
            }
            Err(e) => {
                complain(&mut io, "grep", &e.to_string()).await;
                return 2;
            }
        }
    }
    if matched { 0 } else { 1 }
}

/// yes - repeat a line until the reader goes away
async fn yes(mut io: ProcessIo) -> i32 {
    let line = if io.args.is_empty() {
        "y\n".to_string()
    } else {
        format!("{}\n", io.args.join(" "))
    };
    while emit(&mut io.stdout, &line).await {
        YieldNow(false).await;
    }
    0
}

/// color - print text in a named color
async fn color(mut io: ProcessIo) -> i32 {
    let Some((name, words)) = io.args.split_first() else {
        complain(&mut io, "color", "usage: color NAME TEXT...").await;
        return 2;
    };
    let Some(color) = Color::from_name(name) else {
        let message = format!("unknown color: {}", name);
        complain(&mut io, "color", &message).await;
        return 2;
    };
    let text = format!("\x1b[{}m{}\x1b[0m\n", color.sgr(), words.join(" "));
    if emit(&mut io.stdout, &text).await { 0 } else { 1 }
}
