//! # imessage-html-export
//!
//! Exports one iMessage conversation to a static HTML page you can open, search,
//! and archive without Messages.app.
//!
//! ## What it does
//!
//! macOS keeps Messages history in a SQLite database (`~/Library/Messages/chat.db`).
//! This tool pulls the rows for a single contact, copies every attachment it can
//! find into `output/attachments/`, and renders the conversation to
//! `output/index.html`. Images show inline; other attachments become links.
//!
//! The database is opened **read-only**, your data is never modified. Pass
//! `--snapshot` to read from a temporary copy instead of the live file.
//!
//! ## Usage
//!
//! ```sh
//! # Export everything with +1 555 444 3333, oldest first
//! imessage-html-export +15554443333
//!
//! # Newest 200 messages, numbered, from a backed-up database
//! imessage-html-export someone@example.com --order desc --limit 200 -n -f ~/backup/chat.db
//! ```
//!
//! Preferences can be persisted in `~/.config/imessage-html-export/config.toml`.
//!
//! ## Library
//!
//! [`pipeline::export`] runs the whole export against any [`store::RecordSource`],
//! which is how the tests drive it without a real Messages database.

pub mod attachments;
pub mod config;
pub mod error;
pub mod pipeline;
#[cfg(feature = "progress")]
pub mod progress;
pub mod render;
pub mod store;
pub mod view;

pub use config::ExportConfig;
pub use error::{AttachmentError, ExportError, StoreError, TemplateError};
pub use pipeline::{ExportSummary, Stage, StageObserver, TracingObserver, execute, export};
