//! CLI binary for petite-souris.
//!
//! A thin shim over the library crate: `serve` maps flags onto
//! `GatewayConfig` and runs the gateway, `convert` feeds files through an
//! `Orchestrator`, `formats` prints the format table.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use petite_souris::{
    format, AppState, DirectorySink, FileType, GatewayConfig, JobStatus, Orchestrator,
    OrchestratorConfig, QueueProgressCallback, QueueSummary,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the queue, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl QueueProgressCallback for CliProgressCallback {
    fn on_queue_start(&self, pending: usize) {
        self.bar.set_length(pending as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {pending} file(s)…"))
        ));
    }

    fn on_job_start(&self, _id: &str, file_name: &str, _position: usize, _total: usize) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_status_change(&self, _id: &str, status: JobStatus) {
        if status == JobStatus::Converting {
            self.bar.set_prefix("Converting");
        }
    }

    fn on_job_complete(&self, _id: &str, output_name: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            output_name,
            dim(&format!("{bytes:>9} bytes")),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, _id: &str, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_queue_complete(&self, summary: &QueueSummary) {
        self.bar.finish_and_clear();
        if summary.failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&summary.succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if summary.succeeded == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&summary.succeeded.to_string()),
                summary.attempted,
                red(&summary.failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the gateway against the CloudConvert sandbox
  CLOUDCONVERT_API_KEY=... petite-souris serve --sandbox

  # Convert files through a running gateway
  petite-souris convert report.docx notes.txt --to pdf -o converted/

  # List supported formats
  petite-souris formats

ENVIRONMENT VARIABLES:
  CLOUDCONVERT_API_KEY            CloudConvert API key (required for serve)
  CLOUDCONVERT_API_URL            Override the CloudConvert API root
  CLOUDCONVERT_SANDBOX            Use the CloudConvert sandbox
  MAX_FILE_SIZE                   Upload limit in bytes (default 10485760)
  PETITE_SOURIS_BIND              Listen address (default 0.0.0.0:3000)
  PETITE_SOURIS_SERVER            Gateway URL used by convert
  RUST_LOG                        Log filter, overrides -v / -q
"#;

/// Document conversion gateway and upload queue backed by CloudConvert.
#[derive(Parser, Debug)]
#[command(
    name = "petite-souris",
    version,
    about = "Document conversion gateway and upload queue backed by CloudConvert",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PETITE_SOURIS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PETITE_SOURIS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the conversion gateway.
    Serve(ServeArgs),
    /// Convert files through a running gateway, one at a time.
    Convert(ConvertArgs),
    /// Print the supported formats.
    Formats,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PETITE_SOURIS_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// CloudConvert API key.
    #[arg(long, env = "CLOUDCONVERT_API_KEY", hide_env_values = true)]
    api_key: String,

    /// CloudConvert API root.
    #[arg(long, env = "CLOUDCONVERT_API_URL")]
    api_url: Option<String>,

    /// Use the CloudConvert sandbox.
    #[arg(long, env = "CLOUDCONVERT_SANDBOX")]
    sandbox: bool,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = petite_souris::config::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,

    /// Seconds to wait for a remote job before giving up.
    #[arg(long, env = "PETITE_SOURIS_WAIT_TIMEOUT", default_value_t = 300)]
    wait_timeout: u64,

    /// Milliseconds between remote job status polls.
    #[arg(long, env = "PETITE_SOURIS_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Timeout for each remote HTTP call in seconds.
    #[arg(long, env = "PETITE_SOURIS_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Files to convert.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target format: pdf, docx, doc, txt, rtf, odt, html.
    #[arg(short, long)]
    to: FileType,

    /// Gateway base URL.
    #[arg(long, env = "PETITE_SOURIS_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Directory converted files are written to.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Largest file accepted into the queue, in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = petite_souris::config::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,

    /// Timeout for one conversion request in seconds.
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PETITE_SOURIS_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for `convert`; the server logs at
    // info by default.
    let show_progress = matches!(&cli.command, Command::Convert(a) if !a.no_progress) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Convert(args) => run_convert(args, show_progress).await,
        Command::Formats => {
            print_formats();
            Ok(())
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut builder = GatewayConfig::builder()
        .api_key(args.api_key)
        .max_file_size(args.max_file_size)
        .wait_timeout_secs(args.wait_timeout)
        .poll_interval_ms(args.poll_interval_ms)
        .request_timeout_secs(args.request_timeout)
        .sandbox(args.sandbox);
    if let Some(url) = args.api_url {
        builder = builder.api_base_url(url);
    }
    let config = builder.build().context("Invalid gateway configuration")?;
    tracing::debug!("{:?}", config);

    let state = AppState::cloudconvert(config).context("Failed to set up CloudConvert client")?;
    petite_souris::serve(&args.bind, state)
        .await
        .with_context(|| format!("Server on {} stopped", args.bind))
}

async fn run_convert(args: ConvertArgs, show_progress: bool) -> Result<()> {
    let config = OrchestratorConfig::new(args.server)
        .with_max_file_size(args.max_file_size)
        .with_request_timeout_secs(args.timeout);
    let mut queue = Orchestrator::http(config)
        .context("Failed to build gateway client")?
        .with_sink(Arc::new(DirectorySink::new(&args.output_dir)));
    if show_progress {
        queue = queue.with_progress(CliProgressCallback::new());
    }

    let mut rejected = 0usize;
    for path in &args.files {
        if let Err(e) = queue.add_path(path, args.to).await {
            eprintln!("{} {}: {}", red("✗"), path.display(), e);
            rejected += 1;
        }
    }

    let summary = queue.start_all().await;
    if !show_progress {
        for job in queue.jobs() {
            match job.status {
                JobStatus::Success => match job.result().and_then(|r| r.saved_path()) {
                    Some(path) => println!("{} -> {}", job.source.name, path.display()),
                    None => println!("{} converted but not saved", job.source.name),
                },
                _ => println!(
                    "{} failed: {}",
                    job.source.name,
                    job.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }

    let unsaved = queue
        .jobs()
        .iter()
        .filter(|j| j.status == JobStatus::Success && j.result().and_then(|r| r.saved_path()).is_none())
        .count();
    if summary.failed > 0 || rejected > 0 || unsaved > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_formats() {
    println!("{:<6} {:<10} {:<74} {}", "KEY", "EXTENSION", "CONTENT TYPE", "NAME");
    for f in format::all_formats() {
        println!(
            "{:<6} {:<10} {:<74} {}",
            f.key.as_str(),
            f.extension,
            f.content_type,
            f.display_name
        );
    }
}
