//! Command line parser
//!
//! Turns one submitted line into an ordered list of jobs:
//! 1. Split on the logical operators `&&`, `||`, `;` (and newlines)
//! 2. Split each job into pipe stages on `|`
//! 3. Peel a trailing `>`/`>>` redirection off each stage
//! 4. Tokenize a stage into its command and arguments
//!
//! Only double quotes group text. Operators inside quotes are literal.
//! Nothing here fails: malformed input degrades (empty jobs and stages are
//! dropped, an unmatched quote runs to the end of the line).

use std::iter::Peekable;
use std::str::CharIndices;

/// Condition under which a job runs, checked against the previous exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// First job of a line: always runs
    Always,
    /// `&&`: runs if the previous job succeeded
    And,
    /// `||`: runs if the previous job failed
    Or,
    /// `;`: runs regardless
    Sequence,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::Always => "",
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Sequence => ";",
        }
    }

    /// Whether a job guarded by this operator runs after `last_exit_code`
    pub fn should_run(&self, last_exit_code: i32) -> bool {
        match self {
            LogicalOp::And => last_exit_code == 0,
            LogicalOp::Or => last_exit_code != 0,
            LogicalOp::Always | LogicalOp::Sequence => true,
        }
    }

    /// `&&` and `||` depend on the previous job
    pub fn is_conditional(&self) -> bool {
        matches!(self, LogicalOp::And | LogicalOp::Or)
    }
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipe stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCall {
    /// The stage text without its redirection
    pub command_line: String,
    /// Target of `>` or `>>`, if any
    pub redirection_path: Option<String>,
    /// `>>` rather than `>`
    pub append_redirection: bool,
}

impl CommandCall {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            redirection_path: None,
            append_redirection: false,
        }
    }

    pub fn redirect(mut self, path: impl Into<String>, append: bool) -> Self {
        self.redirection_path = Some(path.into());
        self.append_redirection = append;
        self
    }

    /// Command followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        tokenize(&self.command_line)
    }
}

/// A pipeline plus the operator gating it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineJob {
    pub commands: Vec<CommandCall>,
    pub operator: LogicalOp,
}

/// Character scanner that knows whether it is inside double quotes
struct Scanner<'a> {
    chars: Peekable<CharIndices<'a>>,
    in_quote: bool,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            in_quote: false,
        }
    }

    /// Next character, with a flag telling whether it is outside quotes
    fn next(&mut self) -> Option<(usize, char, bool)> {
        let (i, c) = self.chars.next()?;
        if c == '"' {
            self.in_quote = !self.in_quote;
            return Some((i, c, false));
        }
        Some((i, c, !self.in_quote))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }
}

/// Parse a submitted line into jobs
pub fn parse_line(line: &str) -> Vec<PipelineJob> {
    let mut jobs = Vec::new();
    let mut scanner = Scanner::new(line);
    let mut start = 0;
    let mut operator = LogicalOp::Always;

    let push = |text: &str, op: LogicalOp, jobs: &mut Vec<PipelineJob>| {
        let commands = split_pipeline(text);
        if !commands.is_empty() {
            jobs.push(PipelineJob {
                commands,
                operator: op,
            });
        }
    };

    while let Some((i, c, bare)) = scanner.next() {
        if !bare {
            continue;
        }
        let (next_op, width) = match c {
            '&' if scanner.peek() == Some('&') => (LogicalOp::And, 2),
            '|' if scanner.peek() == Some('|') => (LogicalOp::Or, 2),
            ';' | '\n' => (LogicalOp::Sequence, 1),
            _ => continue,
        };
        if width == 2 {
            scanner.next();
        }
        push(&line[start..i], operator, &mut jobs);
        operator = next_op;
        start = i + width;
    }
    push(&line[start..], operator, &mut jobs);

    // Operators never reach back into an earlier submission
    if let Some(first) = jobs.first_mut() {
        first.operator = LogicalOp::Always;
    }

    log::debug!("parsed {:?} into {} job(s)", line, jobs.len());
    jobs
}

/// Split one job into pipe stages
pub fn split_pipeline(text: &str) -> Vec<CommandCall> {
    let mut stages = Vec::new();
    let mut scanner = Scanner::new(text);
    let mut start = 0;
    let mut prev = None;

    while let Some((i, c, bare)) = scanner.next() {
        let adjacent_redirect =
            matches!(prev, Some('<' | '>')) || matches!(scanner.peek(), Some('<' | '>'));
        if bare && c == '|' && !adjacent_redirect {
            stages.extend(split_redirection(&text[start..i]));
            start = i + 1;
        }
        prev = Some(c);
    }
    stages.extend(split_redirection(&text[start..]));
    stages
}

/// Separate a stage's command from a `>`/`>>` target.
///
/// Returns `None` when no command is left. An empty target drops the
/// redirection.
fn split_redirection(stage: &str) -> Option<CommandCall> {
    let mut scanner = Scanner::new(stage);
    let mut found = None;
    while let Some((i, c, bare)) = scanner.next() {
        if bare && c == '>' {
            let append = scanner.peek() == Some('>');
            found = Some((i, append));
            break;
        }
    }

    let (command, redirect) = match found {
        Some((i, append)) => {
            let rest = &stage[i + if append { 2 } else { 1 }..];
            let target = tokenize(rest).into_iter().next().filter(|t| !t.is_empty());
            (&stage[..i], target.map(|t| (t, append)))
        }
        None => (stage, None),
    };

    let command = command.trim();
    if tokenize(command).is_empty() {
        return None;
    }
    let call = CommandCall::new(command);
    Some(match redirect {
        Some((path, append)) => call.redirect(path, append),
        None => call,
    })
}

/// Split a command line into words.
///
/// Double-quoted text is one word with the quotes removed, and may join
/// with unquoted text around it (`a"b c"d` is `ab cd`). `""` is an empty
/// word.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut in_quote = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                in_word = true;
            }
            c if c.is_whitespace() && !in_quote => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(job: &PipelineJob) -> Vec<&str> {
        job.commands.iter().map(|c| c.command_line.as_str()).collect()
    }

    // ============ Tokenizing ============

    #[test]
    fn test_simple_words() {
        assert_eq!(tokenize("echo hello world"), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_extra_whitespace() {
        assert_eq!(tokenize("  ls   -la\t/ "), vec!["ls", "-la", "/"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_double_quoted_string() {
        assert_eq!(tokenize(r#"echo "hello world""#), vec!["echo", "hello world"]);
    }

    #[test]
    fn test_concatenated_quotes() {
        assert_eq!(tokenize(r#"a"b c"d"#), vec!["ab cd"]);
    }

    #[test]
    fn test_empty_quotes_are_a_word() {
        assert_eq!(tokenize(r#"echo "" x"#), vec!["echo", "", "x"]);
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(tokenize(r#"echo "hello world"#), vec!["echo", "hello world"]);
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(tokenize("echo 'a b'"), vec!["echo", "'a", "b'"]);
    }

    // ============ Logical operators ============

    #[test]
    fn test_single_job() {
        let jobs = parse_line("echo hi");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].operator, LogicalOp::Always);
        assert_eq!(commands(&jobs[0]), vec!["echo hi"]);
    }

    #[test]
    fn test_operators_attach_to_following_job() {
        let jobs = parse_line("a && b || c ; d");
        let ops: Vec<LogicalOp> = jobs.iter().map(|j| j.operator).collect();
        assert_eq!(
            ops,
            vec![
                LogicalOp::Always,
                LogicalOp::And,
                LogicalOp::Or,
                LogicalOp::Sequence
            ]
        );
        assert_eq!(commands(&jobs[3]), vec!["d"]);
    }

    #[test]
    fn test_operators_without_spaces() {
        let jobs = parse_line("false&&echo A");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].operator, LogicalOp::And);
        assert_eq!(jobs[1].commands[0].argv(), vec!["echo", "A"]);
    }

    #[test]
    fn test_newline_separates_jobs() {
        let jobs = parse_line("a\nb");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].operator, LogicalOp::Sequence);
    }

    #[test]
    fn test_empty_jobs_dropped() {
        let jobs = parse_line(" ; a ;; b ; ");
        assert_eq!(jobs.len(), 2);
        assert_eq!(commands(&jobs[0]), vec!["a"]);
        assert_eq!(commands(&jobs[1]), vec!["b"]);
    }

    #[test]
    fn test_leading_operator_is_unconditional() {
        let jobs = parse_line("&& echo hi");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].operator, LogicalOp::Always);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
    }

    #[test]
    fn test_quoted_operators_are_literal() {
        let jobs = parse_line(r#"echo "a && b; c || d""#);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].commands[0].argv(), vec!["echo", "a && b; c || d"]);
    }

    #[test]
    fn test_should_run() {
        assert!(LogicalOp::And.should_run(0));
        assert!(!LogicalOp::And.should_run(1));
        assert!(LogicalOp::Or.should_run(2));
        assert!(!LogicalOp::Or.should_run(0));
        assert!(LogicalOp::Sequence.should_run(1));
        assert!(LogicalOp::Always.should_run(1));
        assert!(!LogicalOp::Sequence.is_conditional());
        assert_eq!(LogicalOp::Or.to_string(), "||");
    }

    // ============ Pipes ============

    #[test]
    fn test_simple_pipe() {
        let stages = split_pipeline("gen | wc -l");
        assert_eq!(stages, vec![CommandCall::new("gen"), CommandCall::new("wc -l")]);
    }

    #[test]
    fn test_pipe_no_spaces() {
        assert_eq!(split_pipeline("a|b|c").len(), 3);
    }

    #[test]
    fn test_empty_stages_dropped() {
        let stages = split_pipeline("| a || | b |");
        let lines: Vec<&str> = stages.iter().map(|s| s.command_line.as_str()).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_pipe_next_to_redirect_not_split() {
        let stages = split_pipeline("a >| b");
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].command_line, "a");

        assert_eq!(split_pipeline("a |< b").len(), 1);
    }

    #[test]
    fn test_quoted_pipe_is_literal() {
        let stages = split_pipeline(r#"echo "a|b""#);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].argv(), vec!["echo", "a|b"]);
    }

    // ============ Redirections ============

    #[test]
    fn test_output_redirect() {
        let stages = split_pipeline("echo hi > out.txt");
        assert_eq!(stages, vec![CommandCall::new("echo hi").redirect("out.txt", false)]);
    }

    #[test]
    fn test_output_append() {
        let stages = split_pipeline("echo hi >> log.txt");
        assert_eq!(stages[0].redirection_path.as_deref(), Some("log.txt"));
        assert!(stages[0].append_redirection);
    }

    #[test]
    fn test_redirect_no_space() {
        let stages = split_pipeline("echo hi>out");
        assert_eq!(stages[0].command_line, "echo hi");
        assert_eq!(stages[0].redirection_path.as_deref(), Some("out"));
    }

    #[test]
    fn test_quoted_redirect_target() {
        let stages = split_pipeline(r#"echo hi > "my file.txt""#);
        assert_eq!(stages[0].redirection_path.as_deref(), Some("my file.txt"));
    }

    #[test]
    fn test_quoted_gt_is_literal() {
        let stages = split_pipeline(r#"echo "a > b""#);
        assert_eq!(stages[0].redirection_path, None);
        assert_eq!(stages[0].argv(), vec!["echo", "a > b"]);
    }

    #[test]
    fn test_missing_redirect_target_dropped() {
        let stages = split_pipeline("echo hi >");
        assert_eq!(stages, vec![CommandCall::new("echo hi")]);
    }

    #[test]
    fn test_redirect_without_command_dropped() {
        assert!(split_pipeline("> out.txt").is_empty());
    }

    #[test]
    fn test_pipe_with_redirect() {
        let jobs = parse_line("cat | grep x > found.txt && echo ok");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].commands.len(), 2);
        assert_eq!(jobs[0].commands[1].redirection_path.as_deref(), Some("found.txt"));
        assert_eq!(jobs[1].operator, LogicalOp::And);
    }
}
