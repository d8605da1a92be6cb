//! Prompt detection and output normalization
//!
//! Every response read from the shell passes through [`normalize`] before it
//! is rendered or captured: the trailing prompt is extracted, long runs of a
//! repeated character are collapsed and the echoed command is stripped.

use regex::Regex;
use std::sync::OnceLock;

/// Longest run of one repeated character kept in the output
pub const MAX_RUN: usize = 75;

/// Shell prompt forms, longest first: `[user@host dir]$`, `user@host:dir$`, bare `$`/`#`
const SHELL_PROMPT_PATTERN: &str =
    r"(\[[^\[\]\r\n]*@[^\[\]\r\n]*\][$%#]|[\w.-]+@[\w.-]+:[^\s$#]*[$#]|[$#])[ \t]*$";

/// A line ending in `?:` waiting for an answer
const QUESTION_PATTERN: &str = r"([^\r\n]*\?:)[ \t]*$";

static SHELL_PROMPT: OnceLock<Regex> = OnceLock::new();
static QUESTION: OnceLock<Regex> = OnceLock::new();
static COMPLETION: OnceLock<Regex> = OnceLock::new();

fn shell_prompt_regex() -> &'static Regex {
    SHELL_PROMPT.get_or_init(|| Regex::new(SHELL_PROMPT_PATTERN).expect("valid regex"))
}

fn question_regex() -> &'static Regex {
    QUESTION.get_or_init(|| Regex::new(QUESTION_PATTERN).expect("valid regex"))
}

/// Default completion pattern: the output ends in a shell prompt or a question
pub fn default_completion_pattern() -> &'static Regex {
    COMPLETION.get_or_init(|| {
        Regex::new(&format!("(?:{})|(?:{})", QUESTION_PATTERN, SHELL_PROMPT_PATTERN))
            .expect("valid regex")
    })
}

/// What the tail of a response turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMatch {
    /// The shell is back at its prompt; carries the prompt token
    ShellPrompt(String),
    /// The remote program asked something; carries the question line
    Question(String),
}

/// Recognises prompts and questions at the end of a response
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptMatcher;

impl PromptMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Match a shell prompt at the end of `text`
    pub fn match_shell_prompt(&self, text: &str) -> Option<PromptMatch> {
        shell_prompt_regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| PromptMatch::ShellPrompt(m.as_str().to_string()))
    }

    /// Match a mid-dialog question at the end of `text`
    pub fn match_question(&self, text: &str) -> Option<PromptMatch> {
        question_regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| PromptMatch::Question(m.as_str().trim().to_string()))
    }

    /// Classify the tail of `text`, questions first
    pub fn detect(&self, text: &str) -> Option<PromptMatch> {
        self.match_question(text)
            .or_else(|| self.match_shell_prompt(text))
    }
}

/// Response after normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOutput {
    /// Text to show or capture
    pub text: String,
    /// Prompt or question found at the end of the raw response
    pub prompt: Option<PromptMatch>,
}

/// Normalize a raw response to `command`
pub fn normalize(raw: &str, command: &str) -> NormalizedOutput {
    let prompt = PromptMatcher::new().detect(raw);

    let body = match &prompt {
        Some(PromptMatch::ShellPrompt(token)) if token.chars().count() > 1 => {
            raw.replace(token.as_str(), "").trim_end().to_string()
        }
        _ => raw.to_string(),
    };

    let body = compress_runs(&body, MAX_RUN);
    let text = strip_echo(&body, command).to_string();

    NormalizedOutput { text, prompt }
}

/// Collapse every run of more than `max` identical characters to exactly
/// `max`. Newlines are never collapsed.
pub fn compress_runs(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    let mut run = 0usize;

    for c in text.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }

        if c == '\n' || run <= max {
            out.push(c);
        }
    }

    out
}

/// Remove the echoed command from the start of `text`
pub fn strip_echo<'a>(text: &'a str, command: &str) -> &'a str {
    let command = command.trim();
    if command.is_empty() {
        return text;
    }

    let mut rest = text;
    loop {
        let without_space = rest.strip_prefix(' ').unwrap_or(rest);
        let stripped = without_space
            .strip_prefix(command)
            .and_then(|tail| tail.strip_prefix("\r\n").or_else(|| tail.strip_prefix('\n')));

        match stripped {
            Some(tail) => rest = tail,
            None => return rest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_prompt() {
        let matcher = PromptMatcher::new();
        assert_eq!(
            matcher.match_shell_prompt("total 0\r\n[root@web01 etc]# "),
            Some(PromptMatch::ShellPrompt("[root@web01 etc]#".to_string()))
        );
    }

    #[test]
    fn test_debian_prompt() {
        let matcher = PromptMatcher::new();
        assert_eq!(
            matcher.match_shell_prompt("hello\r\ndeploy@app-02:~/releases$ "),
            Some(PromptMatch::ShellPrompt("deploy@app-02:~/releases$".to_string()))
        );
    }

    #[test]
    fn test_bare_prompt() {
        let matcher = PromptMatcher::new();
        assert_eq!(
            matcher.match_shell_prompt("output\n$ "),
            Some(PromptMatch::ShellPrompt("$".to_string()))
        );
        assert_eq!(matcher.match_shell_prompt("still running..."), None);
    }

    #[test]
    fn test_question() {
        let matcher = PromptMatcher::new();
        let text = "Installing...\r\nIs this ok [y/d/N]?: ";
        assert_eq!(
            matcher.detect(text),
            Some(PromptMatch::Question("Is this ok [y/d/N]?:".to_string()))
        );
        assert!(default_completion_pattern().is_match(text));
    }

    #[test]
    fn test_prompt_in_middle_is_not_completion() {
        assert!(!default_completion_pattern().is_match("cost: 5$ per unit\r\nloading"));
        assert!(default_completion_pattern().is_match("done\r\n[ops@db1 ~]$ "));
    }

    #[test]
    fn test_compress_long_run() {
        let text = format!("{}\n", "=".repeat(200));
        let compressed = compress_runs(&text, MAX_RUN);
        assert_eq!(compressed, format!("{}\n", "=".repeat(75)));
    }

    #[test]
    fn test_compress_keeps_short_runs_and_newlines() {
        let text = format!("{}{}", "-".repeat(75), "\n".repeat(100));
        assert_eq!(compress_runs(&text, MAX_RUN), text);
    }

    #[test]
    fn test_compress_carriage_returns() {
        let text = format!("a{}b", "\r".repeat(80));
        assert_eq!(compress_runs(&text, MAX_RUN), format!("a{}b", "\r".repeat(75)));
    }

    #[test]
    fn test_strip_echo_variants() {
        assert_eq!(strip_echo("ls\nfile", "ls"), "file");
        assert_eq!(strip_echo("ls\r\nfile", "ls"), "file");
        assert_eq!(strip_echo(" ls\nfile", "ls"), "file");
        assert_eq!(strip_echo(" ls\r\nfile", "ls"), "file");
        assert_eq!(strip_echo("lsfile", "ls"), "lsfile");
    }

    #[test]
    fn test_strip_echo_is_idempotent() {
        let once = strip_echo("uptime\r\nuptime\r\n 10:00 up 3 days", "uptime");
        assert_eq!(strip_echo(once, "uptime"), once);
        assert_eq!(once, " 10:00 up 3 days");
    }

    #[test]
    fn test_normalize_full_response() {
        let raw = "uname -r\r\n5.14.0-362.el9.x86_64\r\n[root@web01 ~]# ";
        let normalized = normalize(raw, "uname -r");

        assert_eq!(normalized.text, "5.14.0-362.el9.x86_64");
        assert_eq!(
            normalized.prompt,
            Some(PromptMatch::ShellPrompt("[root@web01 ~]#".to_string()))
        );
    }

    #[test]
    fn test_normalize_keeps_single_char_prompt() {
        let normalized = normalize("echo hi\nhi\n$ ", "echo hi");
        assert_eq!(normalized.text, "hi\n$ ");
        assert_eq!(normalized.prompt, Some(PromptMatch::ShellPrompt("$".to_string())));
    }

    #[test]
    fn test_normalize_keeps_question_visible() {
        let normalized = normalize("yum install git\r\nIs this ok [y/N]?: ", "yum install git");
        assert_eq!(normalized.text, "Is this ok [y/N]?: ");
        assert!(matches!(normalized.prompt, Some(PromptMatch::Question(_))));
    }
}
