//! User Interface module
//!
//! Output is described semantically: plain text carries a [`SemanticColor`],
//! remote output is tagged line by line ([`TaggedLine`]) so directory listings
//! and automation-tool reports can be coloured without the session layer knowing
//! about terminals.

/// Interactive screens and help pages
pub mod cli;

/// Terminal renderer
pub mod console;

pub use console::ConsoleRenderer;

use std::sync::Mutex;

/// Meaning of a piece of text; the renderer picks the actual colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticColor {
    Normal,
    Muted,
    Heading,
    Info,
    Value,
    Success,
    Warning,
    Error,
    Prompt,
    Question,
}

/// File type taken from the first permission character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    CharDevice,
    BlockDevice,
    Symlink,
}

/// One line of an `ls -l` style listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    /// Permission string as printed, e.g. `drwxr-xr-x.`
    pub permissions: String,
    pub kind: EntryKind,
    pub sticky: bool,
    /// Everybody may read, write and execute
    pub full_permissions: bool,
    /// Text between the permission string and the name
    pub middle: String,
    /// Entry name; for links `name -> target`
    pub name: String,
}

/// Status of an automation-tool report line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationStatus {
    Warning,
    Ignoring,
    Ok,
    Skipping,
    Header,
    Failed,
    Fatal,
    Recap,
}

/// A line of remote output, classified for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedLine {
    Listing(ListingLine),
    Automation {
        status: AutomationStatus,
        text: String,
    },
    /// Mid-dialog question; rendered without a line break
    Question(String),
    Plain(String),
}

impl TaggedLine {
    /// The line's text without any styling
    pub fn text(&self) -> String {
        match self {
            TaggedLine::Listing(listing) => {
                format!("{}{}{}", listing.permissions, listing.middle, listing.name)
            }
            TaggedLine::Automation { text, .. } => text.clone(),
            TaggedLine::Question(text) | TaggedLine::Plain(text) => text.clone(),
        }
    }
}

/// Classify one line of remote output
pub fn tag_line(line: &str) -> TaggedLine {
    let line = line.trim_end_matches('\r');

    if let Some(listing) = parse_listing(line) {
        return TaggedLine::Listing(listing);
    }

    if let Some(status) = automation_status(line) {
        return TaggedLine::Automation {
            status,
            text: line.to_string(),
        };
    }

    if line.trim_end().ends_with("?:") {
        return TaggedLine::Question(line.to_string());
    }

    TaggedLine::Plain(line.to_string())
}

fn parse_listing(line: &str) -> Option<ListingLine> {
    if line.split_whitespace().count() < 9 {
        return None;
    }

    let permissions = line.split(' ').next()?;
    let core = match permissions.len() {
        10 => permissions,
        11 if matches!(permissions.as_bytes()[10], b'.' | b'+' | b'@') => &permissions[..10],
        _ => return None,
    };

    let mut chars = core.chars();
    let kind = match chars.next()? {
        '-' | 'p' | 's' => EntryKind::File,
        'd' => EntryKind::Directory,
        'c' => EntryKind::CharDevice,
        'b' => EntryKind::BlockDevice,
        'l' => EntryKind::Symlink,
        _ => return None,
    };
    if !chars.all(|c| "rwxsStT-".contains(c)) {
        return None;
    }

    let sticky = matches!(core.as_bytes()[9], b't' | b'T');
    let full_permissions = core.contains("rwxrwxrw");

    let name_end = match (kind, line.find(" -> ")) {
        (EntryKind::Symlink, Some(arrow)) => arrow,
        _ => line.len(),
    };
    let name_start = line[..name_end].rfind(' ').map(|i| i + 1)?;

    Some(ListingLine {
        permissions: permissions.to_string(),
        kind,
        sticky,
        full_permissions,
        middle: line[permissions.len()..name_start].to_string(),
        name: line[name_start..].to_string(),
    })
}

fn automation_status(line: &str) -> Option<AutomationStatus> {
    let starts = |prefix: &str| {
        line.len() >= prefix.len()
            && line.is_char_boundary(prefix.len())
            && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    };

    if starts("[WARNING]: ") {
        Some(AutomationStatus::Warning)
    } else if starts("...ignoring") {
        Some(AutomationStatus::Ignoring)
    } else if starts("ok: ") {
        Some(AutomationStatus::Ok)
    } else if starts("skipping: ") {
        Some(AutomationStatus::Skipping)
    } else if starts("PLAY [") || starts("TASK [") || starts("PLAY RECAP **") {
        Some(AutomationStatus::Header)
    } else if starts("failed: ") || starts("ERROR! ") {
        Some(AutomationStatus::Failed)
    } else if starts("fatal: ") {
        Some(AutomationStatus::Fatal)
    } else if line.contains(": ok=")
        && line.contains("changed=")
        && line.contains("failed=")
        && line.contains("skipped=")
    {
        Some(AutomationStatus::Recap)
    } else {
        None
    }
}

/// Where all console output goes
pub trait Renderer: Send + Sync {
    /// Write text in the given colour
    fn emit(&self, text: &str, color: SemanticColor, line_break: bool);

    /// Write one tagged line of remote output
    fn emit_line(&self, line: &TaggedLine);

    /// Clear the screen
    fn clear(&self);

    /// Tag and write a block of remote output
    fn render_output(&self, text: &str) {
        for line in text.split('\n') {
            self.emit_line(&tag_line(line));
        }
    }
}

/// Renderer that keeps a plain-text transcript; used by tests
#[derive(Debug, Default)]
pub struct CaptureRenderer {
    transcript: Mutex<String>,
    clears: Mutex<usize>,
}

impl CaptureRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn text(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Number of screen clears
    pub fn clear_count(&self) -> usize {
        self.clears.lock().map(|c| *c).unwrap_or_default()
    }

    fn push(&self, text: &str, line_break: bool) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push_str(text);
            if line_break {
                transcript.push('\n');
            }
        }
    }
}

impl Renderer for CaptureRenderer {
    fn emit(&self, text: &str, _color: SemanticColor, line_break: bool) {
        self.push(text, line_break);
    }

    fn emit_line(&self, line: &TaggedLine) {
        let line_break = !matches!(line, TaggedLine::Question(_));
        self.push(&line.text(), line_break);
    }

    fn clear(&self) {
        if let Ok(mut clears) = self.clears.lock() {
            *clears += 1;
        }
    }
}
