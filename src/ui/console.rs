//! Colour terminal renderer

use colored::{Color, ColoredString, Colorize};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use std::io::{Write, stdout};
use std::sync::Mutex;

use super::{AutomationStatus, EntryKind, ListingLine, Renderer, SemanticColor, TaggedLine};
use crate::config::ColorConfig;

/// Resolved listing colours
#[derive(Debug, Clone, Copy)]
pub struct ColorScheme {
    pub directory: Color,
    pub sticky: Color,
    pub full_permissions_fg: Color,
    pub full_permissions_bg: Color,
    pub block_device: Color,
    pub char_device: Color,
    pub symlink: Color,
    pub prompt: Color,
}

impl ColorScheme {
    pub fn from_config(config: &ColorConfig) -> Self {
        let parse = |name: &str, fallback: Color| name.parse::<Color>().unwrap_or(fallback);

        Self {
            directory: parse(&config.directory, Color::Green),
            sticky: parse(&config.sticky, Color::Cyan),
            full_permissions_fg: parse(&config.full_permissions_fg, Color::White),
            full_permissions_bg: parse(&config.full_permissions_bg, Color::Red),
            block_device: parse(&config.block_device, Color::Yellow),
            char_device: parse(&config.char_device, Color::Magenta),
            symlink: parse(&config.symlink, Color::BrightYellow),
            prompt: parse(&config.prompt, Color::Green),
        }
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::from_config(&ColorConfig::default())
    }
}

/// Writes to stdout with colours
pub struct ConsoleRenderer {
    colors: ColorScheme,
    /// Keeps lines from concurrent writers whole
    lock: Mutex<()>,
}

impl ConsoleRenderer {
    pub fn new(colors: ColorScheme) -> Self {
        Self {
            colors,
            lock: Mutex::new(()),
        }
    }

    fn paint(&self, text: &str, color: SemanticColor) -> ColoredString {
        match color {
            SemanticColor::Normal => text.normal(),
            SemanticColor::Muted => text.bright_black(),
            SemanticColor::Heading => text.cyan().bold(),
            SemanticColor::Info => text.cyan(),
            SemanticColor::Value => text.yellow(),
            SemanticColor::Success => text.green(),
            SemanticColor::Warning => text.yellow(),
            SemanticColor::Error => text.red(),
            SemanticColor::Prompt => text.color(self.colors.prompt),
            SemanticColor::Question => text.yellow(),
        }
    }

    fn paint_listing(&self, listing: &ListingLine) -> String {
        let permissions = if listing.full_permissions {
            listing
                .permissions
                .color(self.colors.full_permissions_fg)
                .on_color(self.colors.full_permissions_bg)
        } else {
            listing.permissions.normal()
        };

        let name_color = if listing.sticky {
            Some(self.colors.sticky)
        } else {
            match listing.kind {
                EntryKind::Directory => Some(self.colors.directory),
                EntryKind::CharDevice => Some(self.colors.char_device),
                EntryKind::BlockDevice => Some(self.colors.block_device),
                EntryKind::Symlink => Some(self.colors.symlink),
                EntryKind::File => None,
            }
        };
        let name = match name_color {
            Some(color) => listing.name.color(color),
            None => listing.name.normal(),
        };

        format!("{}{}{}", permissions, listing.middle, name)
    }

    fn paint_automation(&self, status: AutomationStatus, text: &str) -> ColoredString {
        match status {
            AutomationStatus::Warning => text.yellow(),
            AutomationStatus::Ignoring | AutomationStatus::Skipping => text.cyan(),
            AutomationStatus::Ok => text.green(),
            AutomationStatus::Header => text.bright_white(),
            AutomationStatus::Failed => text.bright_red(),
            AutomationStatus::Fatal => text.red(),
            AutomationStatus::Recap => text.bright_cyan(),
        }
    }

    fn write(&self, text: &str, line_break: bool) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out = stdout().lock();
        let _ = if line_break {
            writeln!(out, "{}", text)
        } else {
            write!(out, "{}", text)
        };
        let _ = out.flush();
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new(ColorScheme::default())
    }
}

impl Renderer for ConsoleRenderer {
    fn emit(&self, text: &str, color: SemanticColor, line_break: bool) {
        self.write(&self.paint(text, color).to_string(), line_break);
    }

    fn emit_line(&self, line: &TaggedLine) {
        match line {
            TaggedLine::Listing(listing) => self.write(&self.paint_listing(listing), true),
            TaggedLine::Automation { status, text } => {
                self.write(&self.paint_automation(*status, text).to_string(), true)
            }
            TaggedLine::Question(text) => self.write(&text.yellow().to_string(), false),
            TaggedLine::Plain(text) => self.write(text, true),
        }
    }

    fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0));
    }
}
