//! Persistent table store
//!
//! A single JSON document holding typed tables. `CommandTranslation` carries the
//! user's shorthand rules and `HostHistory` the hosts connected to before.
//! Tables the store does not know about are kept untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TRANSLATION_TABLE: &str = "CommandTranslation";
pub const HOST_TABLE: &str = "HostHistory";

/// Highest host id handed out
pub const MAX_HOST_ID: u8 = 99;

/// Error types for the table store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Data file {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Host history is full (99 hosts)")]
    HostTableFull,
}

/// A user-defined shorthand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranslationRule {
    /// What the user types
    pub typed: String,
    /// Command sent instead
    pub change_to: String,
    /// Flags used when the user passes none
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub description: String,
    /// Usage lines separated by `;`
    #[serde(default)]
    pub usage: String,
}

impl TranslationRule {
    pub fn new(typed: &str, change_to: &str, options: &str, description: &str, usage: &str) -> Self {
        Self {
            typed: typed.to_string(),
            change_to: change_to.to_string(),
            options: options.to_string(),
            description: description.to_string(),
            usage: usage.to_string(),
        }
    }
}

/// A host connected to before
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostRecord {
    /// Two-digit id, `01` to `99`
    #[serde(rename = "HostID")]
    pub host_id: String,
    /// Host name, optionally with `:port`
    pub host_name: String,
    pub user_name: String,
    #[serde(default)]
    pub local_path: String,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub environment: String,
}

impl HostRecord {
    /// Record for a host that has no id yet
    pub fn new(host_name: &str, user_name: &str) -> Self {
        Self {
            host_id: String::new(),
            host_name: host_name.to_string(),
            user_name: user_name.to_string(),
            local_path: String::new(),
            remote_path: "/".to_string(),
            environment: String::new(),
        }
    }
}

/// Rules every data file starts with
pub fn default_translation_rules() -> Vec<TranslationRule> {
    vec![
        TranslationRule::new("cd..", "cd ..", "", "Corrects 'cd..' which will fail.", "cd.."),
        TranslationRule::new(
            "datetime",
            "timedatectl",
            "",
            "Display date, time and timezone information.",
            "datetime",
        ),
        TranslationRule::new("cd/", "cd /", "", "Corrects 'cd/' which will fail.", "cd/"),
        TranslationRule::new(
            "dir",
            "ls",
            "-ltr",
            "Windows command shortcut.",
            "dir -=[ uses the default options;dir -altr -=[ uses only what you pass",
        ),
        TranslationRule::new(
            "co",
            "sudo chown",
            "",
            "Shortcut for change owner.",
            "co [USER]:[GROUP] [[DIRECTORY]|[FILE]]",
        ),
        TranslationRule::new(
            "md",
            "mkdir",
            "",
            "Windows command shortcut.",
            "md [OPTIONS] [DIRECTORY_NAME]",
        ),
        TranslationRule::new(
            "ap",
            "ansible-playbook",
            "",
            "Shortcut for ansible-playbook.",
            "ap [OPTIONS] [YAML_FILENAME]",
        ),
        TranslationRule::new(
            "rd",
            "rmdir",
            "",
            "Windows command shortcut.",
            "rd /ME/SubFolder",
        ),
        TranslationRule::new(
            "del",
            "rm",
            "-f -r",
            "Windows command shortcut.",
            "del * -=[ deletes all files and folders;del [FOLDER] -=[ deletes a folder;del [FILENAME] -=[ deletes a file",
        ),
    ]
}

/// JSON-backed store of typed tables
#[derive(Debug)]
pub struct TableStore {
    path: PathBuf,
    translations: Vec<TranslationRule>,
    hosts: Vec<HostRecord>,
    /// Tables owned by nobody in particular; written back as found
    other_tables: Map<String, Value>,
}

impl TableStore {
    /// Open the store, creating the file with default tables when missing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            translations: Vec::new(),
            hosts: Vec::new(),
            other_tables: Map::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the file from disk, migrating it when needed
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let mut dirty = false;
        let mut document = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

            if content.trim().is_empty() {
                dirty = true;
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content).map_err(|source| StoreError::Json {
                    path: self.path.display().to_string(),
                    source,
                })? {
                    Value::Object(map) => map,
                    _ => {
                        warn!("Data file {} is not a table document, rebuilding", self.path.display());
                        dirty = true;
                        Map::new()
                    }
                }
            }
        } else {
            info!("Creating data file {}", self.path.display());
            dirty = true;
            Map::new()
        };

        let (mut translations, rebuilt) = take_table::<TranslationRule>(&mut document, TRANSLATION_TABLE)
            .map(|rows| (rows, false))
            .unwrap_or_else(|| (default_translation_rules(), true));
        dirty |= rebuilt;
        dirty |= merge_builtin_rules(&mut translations);

        let (hosts, rebuilt) = take_table::<HostRecord>(&mut document, HOST_TABLE)
            .map(|rows| (rows, false))
            .unwrap_or_else(|| (Vec::new(), true));
        dirty |= rebuilt;

        self.translations = translations;
        self.hosts = hosts;
        self.other_tables = document;

        if dirty {
            self.save()?;
        }

        debug!(
            "Loaded {} translation rules and {} hosts",
            self.translations.len(),
            self.hosts.len()
        );
        Ok(())
    }

    /// Write every table back to disk
    pub fn save(&self) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let mut document = self.other_tables.clone();
        document.insert(TRANSLATION_TABLE.to_string(), to_value(&self.translations));
        document.insert(HOST_TABLE.to_string(), to_value(&self.hosts));

        let content = serde_json::to_string_pretty(&Value::Object(document)).map_err(|source| {
            StoreError::Json {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        std::fs::write(&self.path, content).map_err(io_error)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn translation_rules(&self) -> &[TranslationRule] {
        &self.translations
    }

    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    pub fn host(&self, host_id: &str) -> Option<&HostRecord> {
        self.hosts.iter().find(|h| h.host_id == host_id)
    }

    /// First free two-digit host id
    pub fn next_host_id(&self) -> Option<String> {
        (1..=MAX_HOST_ID)
            .map(|id| format!("{:02}", id))
            .find(|id| self.host(id).is_none())
    }

    /// Insert or update a host, keyed by host name and user name
    pub fn save_host(&mut self, mut record: HostRecord) -> Result<HostRecord, StoreError> {
        let existing = self.hosts.iter().position(|h| {
            h.host_name.eq_ignore_ascii_case(&record.host_name) && h.user_name == record.user_name
        });

        match existing {
            Some(index) => {
                record.host_id = self.hosts[index].host_id.clone();
                self.hosts[index] = record.clone();
            }
            None => {
                record.host_id = self.next_host_id().ok_or(StoreError::HostTableFull)?;
                self.hosts.push(record.clone());
                self.hosts.sort_by(|a, b| a.host_id.cmp(&b.host_id));
            }
        }

        self.save()?;
        info!("Saved host {} as {}", record.host_name, record.host_id);
        Ok(record)
    }

    /// Remove a host; returns whether it existed
    pub fn delete_host(&mut self, host_id: &str) -> Result<bool, StoreError> {
        let before = self.hosts.len();
        self.hosts.retain(|h| h.host_id != host_id);
        if self.hosts.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

/// Take a table out of the document; `None` when it is missing or its rows
/// lack required columns
fn take_table<T: DeserializeOwned>(document: &mut Map<String, Value>, name: &str) -> Option<Vec<T>> {
    let value = document.remove(name)?;
    match serde_json::from_value::<Vec<T>>(value) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!("Table {} is unreadable ({}), rebuilding with defaults", name, e);
            None
        }
    }
}

/// Add built-in rules the user table lacks; never touches user rows
fn merge_builtin_rules(rules: &mut Vec<TranslationRule>) -> bool {
    let missing: Vec<TranslationRule> = default_translation_rules()
        .into_iter()
        .filter(|builtin| !rules.iter().any(|r| r.typed == builtin.typed))
        .collect();

    if missing.is_empty() {
        return false;
    }

    debug!("Adding {} built-in translation rules", missing.len());
    rules.extend(missing);
    true
}

fn to_value<T: Serialize>(rows: &[T]) -> Value {
    Value::Array(
        rows.iter()
            .filter_map(|row| serde_json::to_value(row).ok())
            .collect(),
    )
}
