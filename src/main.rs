use clap::Parser;
use eyre::{Context, Result, eyre};
use imessage_html_export::config::{
    self, DEFAULT_JOBS, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILE, ExportConfig, Service, SortOrder,
};
use imessage_html_export::pipeline::{self, StageObserver, TracingObserver};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Export an iMessage conversation and its attachments to an HTML page.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The iMessage phone number or email address to pull records for, e.g. +15554443333.
    #[arg(value_name = "ACCOUNT")]
    account: String,

    /// Sort messages by date in asc or desc order.
    #[arg(short, long, value_enum, ignore_case = true, default_value = "asc")]
    order: SortOrder,

    /// Skip the first N rows.
    #[arg(short, long, value_name = "N")]
    skip: Option<usize>,

    /// Only export N rows.
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,

    /// Verbose logging, including the SQL that is run.
    #[arg(short, long)]
    debug: bool,

    /// The iMessage database file to load.
    /// Defaults to ~/Library/Messages/chat.db.
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Show line numbers.
    #[arg(short = 'n', long)]
    line_numbers: bool,

    /// Name of the HTML file written inside the output directory.
    #[arg(short = 'a', long, value_name = "NAME")]
    output_file: Option<String>,

    /// Directory receiving the HTML file and attachments.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Service prefix of the conversation.
    #[arg(long, value_enum, ignore_case = true)]
    service: Option<Service>,

    /// Number of attachments copied at the same time.
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// CSS file to use instead of the built-in stylesheet.
    #[arg(long, value_name = "FILE")]
    stylesheet: Option<PathBuf>,

    /// Read from a temporary copy of the database instead of the live file.
    #[arg(long)]
    snapshot: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/imessage-html-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Only print warnings and errors.
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,
}

fn init_tracing<W>(debug: bool, quiet: bool, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env = std::env::var("IMESSAGE_EXPORT_LOG").unwrap_or_else(|_| {
        let level = if debug {
            "debug"
        } else if quiet {
            "warn"
        } else {
            "info"
        };
        format!("imessage_html_export={}", level)
    });
    let _ = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = !cli.quiet && !cli.debug && std::io::stderr().is_terminal();
    let observer = observer(interactive, cli.debug, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = config::load_file_config(cli.config.as_deref())?;

    // 2. Resolve db_path (CLI > Config > ~/Library/Messages/chat.db)
    let db_path = cli
        .file
        .or(file_cfg.db_path)
        .or_else(config::default_db_path)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --file to specify it, or set db_path in config.toml.")
        })?;

    if !db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --file to specify the path manually.",
            db_path.display()
        ));
    }

    // 3. Build the export config (CLI > Config > Default)
    let export_config = ExportConfig {
        account: cli.account,
        service: cli.service.or(file_cfg.service).unwrap_or_default(),
        db_path,
        snapshot: cli.snapshot,
        order: cli.order,
        skip: cli.skip,
        limit: cli.limit,
        output_dir: cli
            .output_dir
            .or(file_cfg.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        output_file: cli
            .output_file
            .or(file_cfg.output_file)
            .unwrap_or_else(|| DEFAULT_OUTPUT_FILE.to_string()),
        show_line_numbers: cli.line_numbers || file_cfg.line_numbers.unwrap_or(false),
        jobs: cli.jobs.or(file_cfg.jobs).unwrap_or(DEFAULT_JOBS).max(1),
        stylesheet: cli.stylesheet.or(file_cfg.stylesheet),
    };

    // 4. Run the export
    pipeline::execute(&export_config, observer.as_ref())
        .wrap_err("An error occurred while exporting your messages")?;
    Ok(())
}

/// Pick the stage observer and install the log subscriber. With a spinner on
/// screen, log lines are printed through it so the two do not interleave.
#[cfg(feature = "progress")]
fn observer(interactive: bool, debug: bool, quiet: bool) -> Box<dyn StageObserver> {
    use imessage_html_export::progress::ProgressObserver;

    if interactive {
        let spinner = ProgressObserver::new();
        let writer = spinner.log_writer();
        init_tracing(debug, quiet, move || writer.clone());
        return Box::new(spinner);
    }
    init_tracing(debug, quiet, std::io::stderr);
    Box::new(TracingObserver)
}

#[cfg(not(feature = "progress"))]
fn observer(_interactive: bool, debug: bool, quiet: bool) -> Box<dyn StageObserver> {
    init_tracing(debug, quiet, std::io::stderr);
    Box::new(TracingObserver)
}
