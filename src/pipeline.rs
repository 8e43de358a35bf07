//! The export pipeline.
//!
//! ```text
//! EnsureOutputDirs -> Fetch -> MaterializeAttachments -> BuildView -> Render -> WriteOutput
//! ```
//!
//! Stages run strictly in order. A fatal error in any stage ends the run and is
//! returned to the caller; files already written are left in place. Attachment
//! copying is the one stage that cannot fail: a bad copy degrades that message to
//! text and the run carries on.

use crate::attachments::{self, ATTACHMENTS_DIR};
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::render::{self, RenderOptions};
use crate::store::{DatabaseFile, RecordQuery, RecordSource};
use crate::view;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnsureOutputDirs,
    Fetch,
    MaterializeAttachments,
    BuildView,
    Render,
    WriteOutput,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::EnsureOutputDirs => "Creating output directory",
            Stage::Fetch => "Fetching rows from the database",
            Stage::MaterializeAttachments => "Copying attachments",
            Stage::BuildView => "Preparing messages",
            Stage::Render => "Rendering template",
            Stage::WriteOutput => "Writing HTML to disk",
        };
        f.write_str(text)
    }
}

/// Notified as the pipeline moves between stages. Observers only watch; nothing
/// in the pipeline reads their state.
pub trait StageObserver {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage) {}
    fn stage_failed(&self, _stage: Stage, _error: &ExportError) {}
}

/// Reports stage transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn stage_started(&self, stage: Stage) {
        info!("{}...", stage);
    }

    fn stage_failed(&self, stage: Stage, err: &ExportError) {
        error!("{} failed: {}", stage, err);
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub attachments_copied: usize,
    pub attachments_failed: usize,
    pub output_path: PathBuf,
}

/// Run the export against the database named in `config`.
pub fn execute(config: &ExportConfig, observer: &dyn StageObserver) -> Result<ExportSummary, ExportError> {
    let source = DatabaseFile {
        path: config.db_path.clone(),
        snapshot: config.snapshot,
    };
    export(config, &source, observer)
}

/// Run every stage against an arbitrary record source.
pub fn export(
    config: &ExportConfig,
    source: &dyn RecordSource,
    observer: &dyn StageObserver,
) -> Result<ExportSummary, ExportError> {
    let root = config.output_dir.as_path();

    stage(observer, Stage::EnsureOutputDirs, || ensure_output_dirs(root))?;

    let guid = config.chat_guid();
    let records = stage(observer, Stage::Fetch, || {
        let query = RecordQuery {
            chat_guid: &guid,
            order: config.order,
            skip: config.skip,
            limit: config.limit,
        };
        source.fetch(&query).map_err(ExportError::from)
    })?;
    info!("Retrieved {} records.", records.len());

    let outputs = stage(observer, Stage::MaterializeAttachments, || {
        Ok(attachments::materialize(&records, root, config.jobs))
    })?;
    let wanted = records.iter().filter(|r| r.has_attachment).count();
    let copied = outputs.iter().filter(|o| o.is_some()).count();

    let records_len = records.len();
    let views = stage(observer, Stage::BuildView, || {
        let mut views = view::build(records, config.skip.unwrap_or(0));
        view::attach_outputs(&mut views, outputs);
        Ok(views)
    })?;

    let html = stage(observer, Stage::Render, || {
        let options = RenderOptions {
            handle: &config.account,
            show_line_numbers: config.show_line_numbers,
            stylesheet: config.stylesheet.as_deref(),
        };
        render::render(&views, &options).map_err(ExportError::from)
    })?;

    let output_path = root.join(&config.output_file);
    stage(observer, Stage::WriteOutput, || {
        fs::write(&output_path, html).map_err(|e| ExportError::filesystem(&output_path, e))
    })?;

    let summary = ExportSummary {
        records: records_len,
        attachments_copied: copied,
        attachments_failed: wanted - copied,
        output_path,
    };
    info!(
        "Done. {} messages, {} attachments copied, {} failed. Wrote {}",
        summary.records,
        summary.attachments_copied,
        summary.attachments_failed,
        summary.output_path.display()
    );
    Ok(summary)
}

fn stage<T>(
    observer: &dyn StageObserver,
    stage: Stage,
    run: impl FnOnce() -> Result<T, ExportError>,
) -> Result<T, ExportError> {
    observer.stage_started(stage);
    match run() {
        Ok(value) => {
            observer.stage_finished(stage);
            Ok(value)
        }
        Err(e) => {
            observer.stage_failed(stage, &e);
            Err(e)
        }
    }
}

/// Create the output root and its attachments folder. Existing directories are fine.
pub fn ensure_output_dirs(root: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(root).map_err(|e| ExportError::filesystem(root, e))?;
    let attachments = root.join(ATTACHMENTS_DIR);
    fs::create_dir_all(&attachments).map_err(|e| ExportError::filesystem(&attachments, e))?;
    Ok(())
}
