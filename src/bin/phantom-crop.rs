//! CLI binary for phantom-crop.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `RitualConfig`, runs one ritual and writes the cut-out next to the input.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use phantom_crop::config::DEFAULT_ENDPOINT;
use phantom_crop::{
    default_output_path, probe_backend, write_image, Cue, RitualConfig, RitualController, RitualObserver,
    RitualPhase, UploadCandidate,
};
use std::io::{self, Write};
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
fn magenta(s: &str) -> String {
    format!("\x1b[35m{s}\x1b[0m")
}

// ── Terminal observer ────────────────────────────────────────────────────────

/// Renders ritual events on the terminal: a spinner while severing, a bell
/// for cues and a red line for alerts.
struct TerminalObserver {
    /// `None` when progress output is disabled.
    bar: Option<ProgressBar>,
}

impl TerminalObserver {
    fn new(show_progress: bool) -> Arc<Self> {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.magenta} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["◐", "◓", "◑", "◒", "●"]);
            bar.set_style(style);
            bar.set_prefix("Ritual");
            bar
        });
        Arc::new(Self { bar })
    }

    fn println(&self, line: String) {
        match self.bar {
            Some(ref bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl RitualObserver for TerminalObserver {
    fn on_phase_change(&self, _from: RitualPhase, to: RitualPhase) {
        let Some(ref bar) = self.bar else { return };
        match to {
            RitualPhase::Severing => {
                bar.set_message("Severing the veil…");
                bar.enable_steady_tick(Duration::from_millis(120));
            }
            RitualPhase::Complete | RitualPhase::Failed => bar.finish_and_clear(),
            RitualPhase::Idle => {}
        }
    }

    fn on_cue(&self, _cue: Cue) {
        // The terminal bell is the only sound we make.
        let mut err = io::stderr();
        let _ = err.write_all(b"\x07");
        let _ = err.flush();
    }

    fn on_alert(&self, message: &str) {
        self.println(format!("{} {}", red("✘"), red(message)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Remove the background with the local backend
  phantom-crop portrait.jpg

  # No backend running: echo the image back after 3 s
  phantom-crop --mock portrait.jpg -o ghost.png

  # Check that the backend is alive
  phantom-crop --probe --endpoint http://gpu-box:5000/sever

  # Machine-readable summary
  phantom-crop --json portrait.jpg > ritual.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Key for the spirit reading (placeholder text without it)
  OPENAI_API_KEY, ...     Key for other providers, named after the provider
  PHANTOM_CROP_API_KEY_VAR  Read the key from this variable instead
  PHANTOM_CROP_ENDPOINT   Background-removal endpoint (default http://localhost:5000/sever)
  PHANTOM_CROP_MOCK       Use the mock backend
  PHANTOM_CROP_PROVIDER   Vision provider for the reading (default gemini)
  PHANTOM_CROP_MODEL      Vision model for the reading (default gemini-2.5-flash)
  RUST_LOG                Override the log filter
"#;

/// Cut the background out of an image and read its spirit.
#[derive(Parser, Debug)]
#[command(
    name = "phantom-crop",
    version,
    about = "Cut the background out of an image and read its spirit",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file to process.
    #[arg(required_unless_present = "probe")]
    input: Option<PathBuf>,

    /// Where to write the cut-out. Default: <stem>.severed.<ext> next to the input.
    #[arg(short, long, env = "PHANTOM_CROP_OUTPUT")]
    output: Option<PathBuf>,

    /// Skip the backend: wait, then return the resized input unchanged.
    #[arg(long, env = "PHANTOM_CROP_MOCK")]
    mock: bool,

    /// Background-removal endpoint.
    #[arg(long, env = "PHANTOM_CROP_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Vision model for the spirit reading.
    #[arg(long, env = "PHANTOM_CROP_MODEL")]
    model: Option<String>,

    /// Vision provider for the spirit reading.
    #[arg(long, env = "PHANTOM_CROP_PROVIDER")]
    provider: Option<String>,

    /// Environment variable holding the provider's API key.
    /// Default: derived from the provider (GEMINI_API_KEY, OPENAI_API_KEY, ...).
    #[arg(long, env = "PHANTOM_CROP_API_KEY_VAR")]
    api_key_var: Option<String>,

    /// No terminal bell on success or failure.
    #[arg(long, env = "PHANTOM_CROP_MUTE")]
    mute: bool,

    /// Print the ritual report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "PHANTOM_CROP_NO_PROGRESS")]
    no_progress: bool,

    /// Only check that the backend is alive.
    #[arg(long)]
    probe: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PHANTOM_CROP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PHANTOM_CROP_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; library INFO logs
    // would tear through it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Probe-only mode ──────────────────────────────────────────────────
    if cli.probe {
        let client = reqwest::Client::new();
        let health = probe_backend(&client, &cli.endpoint)
            .await
            .with_context(|| format!("Backend at {} did not answer", cli.endpoint))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&health).context("Failed to serialise health")?
            );
        } else {
            println!("{} {}  {}", green("✔"), bold(&health.status), dim(&health.message));
        }
        return Ok(());
    }

    let input = cli.input.clone().context("An image path is required")?;

    // ── Build config ─────────────────────────────────────────────────────
    let observer = TerminalObserver::new(show_progress);
    let config = build_config(&cli, Arc::clone(&observer))?;
    let mut ritual = RitualController::new(config).context("Failed to prepare the ritual")?;

    // ── Run the ritual ───────────────────────────────────────────────────
    let upload = UploadCandidate::from_path(&input)
        .await
        .context("Failed to read the image")?;
    let result = ritual.submit(upload).await.context("The ritual failed")?;

    let processed = result
        .processed
        .as_ref()
        .context("The ritual completed without a processed image")?;
    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input, processed.extension()));
    write_image(processed, &out_path)
        .await
        .context("Failed to write the processed image")?;

    let reading = result.spirit_reading.as_deref().unwrap_or_default();

    if cli.json {
        let mut report = result.report(RitualPhase::Complete);
        report.output_path = Some(out_path.display().to_string());
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        println!("{}", magenta(reading));
        let stats = &result.stats;
        eprintln!(
            "{}  {}×{} → {}  {}ms  →  {}",
            green("✔"),
            stats.dimensions.0,
            stats.dimensions.1,
            dim(&format!("{} bytes", stats.processed_bytes)),
            stats.total_duration_ms,
            bold(&out_path.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `RitualConfig`.
fn build_config(cli: &Cli, observer: Arc<TerminalObserver>) -> Result<RitualConfig> {
    let mut builder = RitualConfig::builder()
        .use_mock(cli.mock)
        .endpoint_url(cli.endpoint.clone())
        .muted(cli.mute)
        .observer(observer);

    if let Some(ref model) = cli.model {
        builder = builder.spirit_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.spirit_provider(provider.clone());
    }
    if let Some(ref var) = cli.api_key_var {
        builder = builder.api_key_var(var.clone());
    }

    builder.build().context("Invalid configuration")
}
