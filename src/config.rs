use clap::ValueEnum;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_OUTPUT_FILE: &str = "index.html";
pub const DEFAULT_JOBS: usize = 4;

/// Timestamp ordering of the exported conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Messaging service prefix used in the store's chat guid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum Service {
    #[default]
    #[value(name = "iMessage", alias = "imessage")]
    #[serde(rename = "iMessage", alias = "imessage")]
    IMessage,
    #[value(name = "SMS", alias = "sms")]
    #[serde(rename = "SMS", alias = "sms")]
    Sms,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::IMessage => write!(f, "iMessage"),
            Service::Sms => write!(f, "SMS"),
        }
    }
}

/// Configuration required to run one export.
/// This decouples the pipeline from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Phone number or email address of the contact, e.g. `+15554443333`.
    pub account: String,
    pub service: Service,
    pub db_path: PathBuf,
    /// Copy the live database to a temporary file before querying it.
    pub snapshot: bool,
    pub order: SortOrder,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub output_dir: PathBuf,
    pub output_file: String,
    pub show_line_numbers: bool,
    /// Size of the attachment copy pool. `1` copies strictly in sequence.
    pub jobs: usize,
    pub stylesheet: Option<PathBuf>,
}

impl ExportConfig {
    pub fn new(account: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            account: account.into(),
            service: Service::default(),
            db_path: db_path.into(),
            snapshot: false,
            order: SortOrder::default(),
            skip: None,
            limit: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            show_line_numbers: false,
            jobs: DEFAULT_JOBS,
            stylesheet: None,
        }
    }

    /// The `chat.guid` value identifying a one-to-one conversation with `account`.
    pub fn chat_guid(&self) -> String {
        format!("{};-;{}", self.service, self.account)
    }
}

/// Settings that may be persisted in `config.toml`. Every key is optional and
/// loses to the matching CLI flag.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_file: Option<String>,
    pub service: Option<Service>,
    pub jobs: Option<usize>,
    pub stylesheet: Option<PathBuf>,
    pub line_numbers: Option<bool>,
}

/// `~/Library/Messages/chat.db`, where Messages keeps its store.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join("Library/Messages/chat.db"))
}

pub fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("imessage-html-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}
