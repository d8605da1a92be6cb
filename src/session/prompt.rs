//! Interactive prompts for connection details and credentials

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyEventState, KeyModifiers};
use crossterm::terminal;
use std::collections::VecDeque;
use std::io::Write;

/// A credential typed by the user
#[derive(Clone, PartialEq, Eq)]
pub struct SecretInput {
    pub value: String,
    /// Caps lock was on, or the input looks like it was
    pub caps_lock: bool,
}

impl std::fmt::Debug for SecretInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretInput")
            .field("value", &"***")
            .field("caps_lock", &self.caps_lock)
            .finish()
    }
}

/// Source of answers to interactive questions
pub trait Prompter: Send {
    /// Ask for a line of text; `None` when input ended
    fn read_line(&mut self, label: &str) -> Result<Option<String>>;

    /// Ask for a secret with masked echo; `None` when the user cancelled
    fn read_secret(&mut self, label: &str) -> Result<Option<SecretInput>>;
}

/// Whether a typed secret looks like it was entered with caps lock on
pub fn looks_like_caps_lock(value: &str) -> bool {
    let letters: Vec<char> = value.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

/// Leaves raw mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        Self
    }

    fn read_masked(out: &mut impl Write) -> Result<Option<SecretInput>> {
        let _raw = RawModeGuard::enable()?;
        let mut value = String::new();
        let mut caps_reported = false;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            if key.state.contains(KeyEventState::CAPS_LOCK) {
                caps_reported = true;
            }

            match key.code {
                KeyCode::Enter => break,
                KeyCode::Esc => return Ok(None),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(None);
                }
                KeyCode::Backspace => {
                    if value.pop().is_some() {
                        write!(out, "\x08 \x08")?;
                        out.flush()?;
                    }
                }
                KeyCode::Char(c) => {
                    value.push(c);
                    write!(out, "*")?;
                    out.flush()?;
                }
                _ => {}
            }
        }

        let caps_lock = caps_reported || looks_like_caps_lock(&value);
        Ok(Some(SecretInput { value, caps_lock }))
    }
}

impl Prompter for ConsolePrompter {
    fn read_line(&mut self, label: &str) -> Result<Option<String>> {
        let mut out = std::io::stdout();
        write!(out, "{}", label)?;
        out.flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn read_secret(&mut self, label: &str) -> Result<Option<SecretInput>> {
        let mut out = std::io::stdout();
        write!(out, "{}", label)?;
        out.flush()?;

        let result = Self::read_masked(&mut out);
        writeln!(out)?;
        result
    }
}

/// Answers prompts from prepared lists; used by tests
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    lines: VecDeque<String>,
    secrets: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer to the next line prompt
    pub fn line(mut self, answer: &str) -> Self {
        self.lines.push_back(answer.to_string());
        self
    }

    /// Queue an answer to the next secret prompt
    pub fn secret(mut self, answer: &str) -> Self {
        self.secrets.push_back(answer.to_string());
        self
    }

    /// Labels of every prompt shown so far
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, label: &str) -> Result<Option<String>> {
        self.asked.push(label.to_string());
        Ok(self.lines.pop_front())
    }

    fn read_secret(&mut self, label: &str) -> Result<Option<SecretInput>> {
        self.asked.push(label.to_string());
        Ok(self.secrets.pop_front().map(|value| SecretInput {
            caps_lock: looks_like_caps_lock(&value),
            value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_lock_heuristic() {
        assert!(looks_like_caps_lock("HUNTER2"));
        assert!(looks_like_caps_lock("PA55WORD!"));
        assert!(!looks_like_caps_lock("Hunter2"));
        assert!(!looks_like_caps_lock("12345"));
        assert!(!looks_like_caps_lock("A1"));
    }

    #[test]
    fn test_scripted_prompter() {
        let mut prompter = ScriptedPrompter::new().line("web01").secret("SECRET");

        assert_eq!(prompter.read_line("Host: ").unwrap().as_deref(), Some("web01"));
        let secret = prompter.read_secret("Password: ").unwrap().unwrap();
        assert!(secret.caps_lock);
        assert!(prompter.read_line("Host: ").unwrap().is_none());
        assert_eq!(prompter.asked().len(), 3);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SecretInput {
            value: "hunter2".to_string(),
            caps_lock: false,
        };
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}
