//! Console screens
//!
//! Help, legend, permission help, host menu and local directory listings.
//! Everything goes through a [`Renderer`] so the screens can be captured in tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::Path;

use super::{Renderer, SemanticColor};
use crate::session::Session;
use crate::store::HostRecord;
use crate::translation::{INTERNAL_COMMANDS, InternalCommandSpec, TranslationTable};

/// Width of the name column in help and listings
const NAME_WIDTH: usize = 30;

/// Separator under each help entry
const RULE_WIDTH: usize = 75;

/// Pad to `width`; longer text is cut and marked with `...`
pub fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len <= width {
        format!("{}{}", text, " ".repeat(width - len))
    } else {
        let kept: String = text.chars().take(width.saturating_sub(4)).collect();
        format!("{}... ", kept)
    }
}

/// Human-readable size, 1024 based
pub fn size_suffix(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn emit_entry(renderer: &dyn Renderer, name: &str, description: &str, usage: &str, translates_to: Option<String>) {
    renderer.emit(&format!("\t{}", pad(&format!("{}:", name), NAME_WIDTH)), SemanticColor::Value, false);

    let mut first = true;
    for line in description.split(';').map(str::trim).filter(|l| !l.is_empty()) {
        if first {
            renderer.emit(line, SemanticColor::Normal, true);
            first = false;
        } else {
            renderer.emit(&format!("\t{}{}", pad(" ", NAME_WIDTH), line), SemanticColor::Normal, true);
        }
    }
    if first {
        renderer.emit("", SemanticColor::Normal, true);
    }

    if let Some(target) = translates_to {
        renderer.emit(
            &format!("\t{}Translates To: {}", pad(" ", NAME_WIDTH), target),
            SemanticColor::Normal,
            true,
        );
    }

    for example in usage.split(';').map(str::trim).filter(|u| !u.is_empty()) {
        renderer.emit(&format!("\t{}e.g. {}", pad(" ", NAME_WIDTH), example), SemanticColor::Muted, true);
    }
    renderer.emit(&format!("\t{}", "-".repeat(RULE_WIDTH)), SemanticColor::Muted, true);
}

/// Full help: local commands, then the user's translation rules
pub fn show_help(renderer: &dyn Renderer, table: &TranslationTable, data_file: &Path) {
    renderer.emit(
        "All Linux commands are accepted. The entries below are local actions or shorthands",
        SemanticColor::Normal,
        true,
    );
    renderer.emit("translated into Linux commands.\n", SemanticColor::Normal, true);

    renderer.emit("-=[ INTERNAL COMMANDS ]=-\n", SemanticColor::Success, true);
    let mut internal: Vec<&InternalCommandSpec> = INTERNAL_COMMANDS.iter().collect();
    internal.sort_by_key(|spec| spec.name);
    for spec in internal {
        emit_entry(renderer, spec.name, spec.description, spec.usage, None);
    }
    renderer.emit("", SemanticColor::Normal, true);

    renderer.emit("-=[ USER COMMANDS ]=-", SemanticColor::Success, true);
    renderer.emit("Can be edited or added to here:", SemanticColor::Info, true);
    renderer.emit(&format!("     {}\n", data_file.display()), SemanticColor::Info, true);

    let mut rules: Vec<_> = table.rules().iter().collect();
    rules.sort_by(|a, b| a.typed.to_lowercase().cmp(&b.typed.to_lowercase()));
    for rule in rules {
        let target = format!("{} {}", rule.change_to, rule.options).trim_end().to_string();
        emit_entry(renderer, &rule.typed, &rule.description, &rule.usage, Some(target));
    }
    renderer.emit("", SemanticColor::Normal, true);
}

/// Usage of one local command
pub fn show_usage(renderer: &dyn Renderer, spec: &InternalCommandSpec) {
    renderer.emit(&format!("-=[ Example of Usage for {} ]=-\n", spec.name), SemanticColor::Info, true);
    emit_entry(renderer, spec.name, spec.description, spec.usage, None);
}

/// Listing colours, shown as sample listing lines in those colours
pub fn show_legend(renderer: &dyn Renderer, config_file: &str) {
    renderer.emit(
        "Listing and prompt colors are set in the [colors] section of:",
        SemanticColor::Warning,
        true,
    );
    renderer.emit(&format!(" {}\n", config_file), SemanticColor::Muted, true);

    let samples = [
        "drwxr-xr-x. 2 root root 4096 Aug 25 06:06 directory",
        "drwxrwxrwt. 9 root root 4096 Aug 25 06:06 sticky",
        "-rwxrwxrwx. 1 root root 1024 Aug 25 06:06 full-permissions",
        "brw-rw----. 1 root disk 8, 0 Aug 25 06:06 block-special-file",
        "crw-rw-rw-. 1 root tty  5, 0 Aug 25 06:06 character-special-file",
        "lrwxrwxrwx. 1 root root    7 Aug 25 06:06 symbolic-link -> target",
    ];
    for sample in samples {
        renderer.render_output(sample);
    }
    renderer.emit("[user@host dir]$  = prompt\n", SemanticColor::Prompt, true);
}

/// Explanation of `ls -l` permission strings
pub fn show_permissions(renderer: &dyn Renderer) {
    let heading = "===========[ Linux Permissions Help ]===========";
    renderer.emit(heading, SemanticColor::Warning, true);

    renderer.emit("  User Permissions:", SemanticColor::Info, true);
    renderer.emit("     The owner of the file or directory.", SemanticColor::Info, true);
    renderer.emit("  Group Permissions:", SemanticColor::Success, true);
    renderer.emit(
        "     Group of the file or directory. This must be one of the owner's groups.",
        SemanticColor::Success,
        true,
    );
    renderer.emit("  Other Permissions:", SemanticColor::Value, true);
    renderer.emit("     Everyone else.\n", SemanticColor::Value, true);

    let diagram = [
        "           _ User Permissions",
        "          |   _ Group Permissions",
        "  Type _  |  |   _ Other Permissions",
        "        | |  |  |",
        "        |/|\\/|\\/|\\",
        "        -rwxr-xr-x. 2 root  root     6 Aug 25 06:06 FileOrDirectoryName",
        "                  | |  |     |  |____| |__________| |_________________|",
        "                  | |  |     |    |         |               |_ File or Directory",
        "                  | |  |     |    |         |_ Date and Time Stamp",
        "                  | |  |     |    |_ File or Directory Size",
        "                  | |  |     |_ Group Name",
        "                  | |  |_ Owner Name",
        "                  | |_ The number of hard links to this file",
        "                  |_ . is normal, @ or + means extended permissions (see setfacl, getfacl, xattr)\n",
    ];
    for line in diagram {
        renderer.emit(line, SemanticColor::Heading, true);
    }

    renderer.emit("  Type:", SemanticColor::Error, true);
    for line in [
        "- - standard file",
        "d - directory",
        "c - character special file",
        "l - symbolic link",
        "p - named pipe (FIFO)",
        "s - socket",
        "b - block special file\n",
    ] {
        renderer.emit(&format!("     {}", line), SemanticColor::Error, true);
    }

    renderer.emit("  Permission Meaning:", SemanticColor::Normal, true);
    for line in [
        "r = read (4)",
        "w = write (2)",
        "x = execute (1)",
        "- = no permissions (0)",
        "s = setuid/setgid bit. [chmod u+s file] or [chmod g+s file] to add it.",
        "t = sticky bit. Only the owner may delete files in the directory. [chmod +t dir] to add it.\n",
    ] {
        renderer.emit(&format!("     {}", line), SemanticColor::Info, true);
    }

    renderer.emit("  Permission Numeric Values:", SemanticColor::Normal, true);
    for line in [
        "read (4) + write (2) + execute (1) = 7 (full permissions)",
        "read (4) + write (0) + execute (1) = 5 (read/execute permissions)",
        "read (4) + write (0) + execute (0) = 4 (read only permissions)",
        "",
        "usr | grp | other",
        "----|-----|------",
        "rwx | r-x | r--",
        " 7  |  5  |  4\n",
    ] {
        renderer.emit(&format!("     {}", line), SemanticColor::Info, true);
    }
}

/// Application information
pub fn show_about(renderer: &dyn Renderer) {
    renderer.emit(
        &format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        SemanticColor::Heading,
        true,
    );
    renderer.emit(env!("CARGO_PKG_DESCRIPTION"), SemanticColor::Normal, true);
    renderer.emit("", SemanticColor::Normal, true);
}

/// Where the session is connected to
pub fn show_whereami(renderer: &dyn Renderer, session: &Session, details: &[String]) {
    let row = |label: &str, value: &str| {
        renderer.emit(&pad(label, 20), SemanticColor::Info, false);
        renderer.emit(value, SemanticColor::Value, true);
    };

    row("Server:", &session.display_name);
    row("Port:", &session.port.to_string());
    row("Directory:", session.remote_directory.as_deref().unwrap_or("(unknown)"));
    for line in details {
        renderer.emit(&format!("    {}", line.trim()), SemanticColor::Normal, true);
    }
}

/// Current transfer folders
pub fn show_sets(renderer: &dyn Renderer, session: &Session) {
    renderer.emit("Local Path:  ", SemanticColor::Info, false);
    renderer.emit(&session.local_path.display().to_string(), SemanticColor::Value, true);
    renderer.emit("    Change by using: 'set-local <DIRECTORY>'", SemanticColor::Muted, true);
    renderer.emit("Remote Path: ", SemanticColor::Info, false);
    renderer.emit(&session.remote_path, SemanticColor::Value, true);
    renderer.emit("    Change by using: 'set-remote /<dir>/<dir>'", SemanticColor::Muted, true);
}

fn modified(metadata: &std::fs::Metadata) -> String {
    metadata
        .modified()
        .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Folders and files of a local directory
pub fn show_local_dir(renderer: &dyn Renderer, path: &Path) -> Result<()> {
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("Cannot read local directory {}", path.display()))?;

    let mut directories = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().to_string();
        if metadata.is_dir() {
            directories.push((name, modified(&metadata)));
        } else {
            files.push((name, modified(&metadata), metadata.len()));
        }
    }
    directories.sort();
    files.sort();

    renderer.emit(&"=".repeat(50), SemanticColor::Value, true);
    renderer.emit(&format!("{}{}", pad("Directory:", 20), path.display()), SemanticColor::Info, true);
    renderer.emit(&format!("{}{}", pad("   Directories:", 20), directories.len()), SemanticColor::Info, true);
    renderer.emit(&format!("{}{}", pad("   Files:", 20), files.len()), SemanticColor::Value, true);
    renderer.emit(&"=".repeat(50), SemanticColor::Value, true);
    renderer.emit("", SemanticColor::Normal, true);

    renderer.emit(&format!("{}{}", pad("Directory", NAME_WIDTH), "Modified Date"), SemanticColor::Success, true);
    renderer.emit(&"-".repeat(75), SemanticColor::Success, true);
    for (name, date) in &directories {
        renderer.emit(&pad(name, NAME_WIDTH), SemanticColor::Info, false);
        renderer.emit(date, SemanticColor::Muted, true);
    }
    renderer.emit("", SemanticColor::Normal, true);

    renderer.emit(
        &format!("{}{}Size", pad("Filename", NAME_WIDTH), pad("Modified Date", NAME_WIDTH)),
        SemanticColor::Success,
        true,
    );
    renderer.emit(&"-".repeat(75), SemanticColor::Success, true);
    for (name, date, size) in &files {
        renderer.emit(&pad(name, NAME_WIDTH), SemanticColor::Value, false);
        renderer.emit(&format!("{}{}", pad(date, NAME_WIDTH), size_suffix(*size)), SemanticColor::Muted, true);
    }
    if !files.is_empty() {
        renderer.emit("", SemanticColor::Normal, true);
    }

    Ok(())
}

/// Host history with reachability; unreachable hosts are shown in red
pub fn show_host_menu(renderer: &dyn Renderer, hosts: &[(HostRecord, bool)]) {
    let width = |f: fn(&HostRecord) -> &str| {
        hosts
            .iter()
            .map(|(h, _)| f(h).chars().count() + 1)
            .max()
            .unwrap_or(1)
    };
    let host_width = width(|h| h.host_name.as_str());
    let env_width = width(|h| h.environment.as_str());

    for (host, reachable) in hosts {
        let color = if *reachable { SemanticColor::Success } else { SemanticColor::Error };
        renderer.emit("[", SemanticColor::Muted, false);
        renderer.emit(
            &host.host_id,
            if *reachable { SemanticColor::Value } else { SemanticColor::Error },
            false,
        );
        renderer.emit("]\t", SemanticColor::Muted, false);
        renderer.emit(&pad(&host.host_name, host_width), color, false);
        if !host.environment.trim().is_empty() {
            renderer.emit(&format!("- {}", pad(&host.environment, env_width)), color, false);
        }
        renderer.emit(&format!("- {}", host.user_name), SemanticColor::Muted, true);
    }

    renderer.emit(
        "\n Select a host from above by its number.\n - 'n' to add a new host\n - 'r' to refresh the list\n - 'd <id>' to delete one host\n - 'q' to quit\n",
        SemanticColor::Warning,
        true,
    );
    if hosts.iter().any(|(_, reachable)| !reachable) {
        renderer.emit(" #### Red hosts above are unreachable. ####\n", SemanticColor::Error, true);
    }
}

/// `[ OK ] label` line of a multi-step installation
pub fn install_step(renderer: &dyn Renderer, label: &str, ok: bool) {
    renderer.emit("[ ", SemanticColor::Muted, false);
    if ok {
        renderer.emit("OK", SemanticColor::Success, false);
    } else {
        renderer.emit("TO", SemanticColor::Error, false);
    }
    renderer.emit(" ] ", SemanticColor::Muted, false);
    renderer.emit(&pad(label, NAME_WIDTH), SemanticColor::Normal, true);
}
