//! Shorthand translation
//!
//! Maps a typed shorthand to its target command and default flags, and holds
//! the help metadata of the built-in commands.

use std::collections::HashSet;
use tracing::warn;

use crate::store::TranslationRule;

/// Help entry for a command handled locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalCommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Usage lines separated by `;`
    pub usage: &'static str,
}

const fn spec(name: &'static str, description: &'static str, usage: &'static str) -> InternalCommandSpec {
    InternalCommandSpec {
        name,
        description,
        usage,
    }
}

/// Every command handled locally, in help order
pub const INTERNAL_COMMANDS: &[InternalCommandSpec] = &[
    spec("-help", "Remote shell help screen.", "-help"),
    spec(
        "edit-config",
        "Edit the data file in the local editor and reload translations once the editor closes.",
        "edit-config",
    ),
    spec(
        "about",
        "Information about this tool and the host you are connected to.",
        "about",
    ),
    spec(
        "edit",
        "Pull a remote file, open it in the local editor, then upload it back where it came from.",
        "edit [REMOTE_FILE_NAME]",
    ),
    spec(
        "install-ansible",
        "Install pip, Python 3 packages and the latest Ansible on the connected host.",
        "install-ansible",
    ),
    spec(
        "refresh",
        "Pull every file and folder from the set-remote directory into the set-local directory.",
        "refresh",
    ),
    spec(
        "sync-date",
        "Set the remote date and time to match the local clock.",
        "sync-date",
    ),
    spec(
        "recon",
        "Reconnect with the existing credentials after being disconnected. Ignored when connected.",
        "recon",
    ),
    spec(
        "publish",
        "Upload every file and folder from set-local into set-remote.",
        "publish",
    ),
    spec(
        "send-file",
        "Send a file from set-local to the set-remote directory.",
        "send-file [LOCAL_FILE_NAME]",
    ),
    spec(
        "get-file",
        "Download a file from the current remote directory into set-local.",
        "get-file [REMOTE_FILE_NAME]",
    ),
    spec(
        "new-host",
        "Disconnect from the current host and connect to another one.",
        "new-host",
    ),
    spec(
        "local-dir",
        "List the files in the set-local folder, or in the given folder.",
        "local-dir;local-dir [LOCAL_PATH]",
    ),
    spec("legend", "Show the colours used in directory listings.", "legend"),
    spec(
        "permissions",
        "Explain the permission column of directory listings.",
        "permissions",
    ),
    spec("whoami", "Show the user connected to the host.", "whoami"),
    spec(
        "whereami",
        "Show the host, port and current directory.",
        "whereami;whereami --more",
    ),
    spec(
        "set-remote",
        "Set the remote root that set-local is published to.",
        "set-remote [/REMOTE_PATH]",
    ),
    spec(
        "set-local",
        "Set the local folder files are saved to and sent from.",
        "set-local [LOCAL_PATH]",
    ),
    spec("sets", "Show both set-local and set-remote.", "sets"),
    spec(
        "clear-local",
        "Reset set-local to the default workspace folder.",
        "clear-local",
    ),
    spec(
        "view",
        "Translates to cat. Interactive viewers would hang the channel.",
        "view [FILE_NAME]",
    ),
    spec("cat", "Print a remote file.", "cat [FILE_NAME]"),
    spec("cls", "Clear the screen.", "cls;clear"),
    spec("exit", "Close the session and quit.", "exit"),
];

/// Look up the help entry of a local command
pub fn internal_command(name: &str) -> Option<&'static InternalCommandSpec> {
    INTERNAL_COMMANDS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Read-only lookup over the user's translation rules
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    rules: Vec<TranslationRule>,
}

impl TranslationTable {
    /// Build the table; a repeated `Typed` key keeps its first rule
    pub fn new(rules: &[TranslationRule]) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(rules.len());

        for rule in rules {
            let key = rule.typed.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            if !seen.insert(key) {
                warn!("Duplicate translation for '{}' ignored", rule.typed);
                continue;
            }
            unique.push(rule.clone());
        }

        Self { rules: unique }
    }

    /// Rule registered for `typed`, ignoring case
    pub fn lookup(&self, typed: &str) -> Option<&TranslationRule> {
        self.rules
            .iter()
            .find(|r| r.typed.trim().eq_ignore_ascii_case(typed))
    }

    /// Rewrite `typed args...` into `<ChangeTo> <flags> <args>`.
    ///
    /// Flags are the `-` arguments the user passed or, when there are none,
    /// the rule's default options. Empty parts are left out.
    pub fn rewrite(&self, typed: &str, args: &[&str]) -> Option<String> {
        let rule = self.lookup(typed)?;

        let (flags, operands): (Vec<&str>, Vec<&str>) =
            args.iter().copied().partition(|arg| arg.starts_with('-'));

        let flags = if flags.is_empty() {
            rule.options.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            flags.join(" ")
        };

        let command = [rule.change_to.trim(), flags.as_str(), &operands.join(" ")]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        Some(command)
    }

    pub fn rules(&self) -> &[TranslationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
