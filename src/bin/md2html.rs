//! CLI binary for md2html-publish.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use md2html_publish::{
    ConfigOverrides, ConversionConfig, ConversionOutput, ConversionProgressCallback, Converter,
    ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a spinner showing the running stage, with one
/// log line per finished stage. Asset events arrive concurrently while images
/// download and only bump counters shown in the spinner message.
struct CliProgressCallback {
    bar: ProgressBar,
    assets_ready: AtomicUsize,
    assets_failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            assets_ready: AtomicUsize::new(0),
            assets_failed: AtomicUsize::new(0),
        })
    }

    fn asset_message(&self) -> String {
        let ready = self.assets_ready.load(Ordering::SeqCst);
        let failed = self.assets_failed.load(Ordering::SeqCst);
        if failed == 0 {
            format!("{ready} assets")
        } else {
            format!("{ready} assets, {failed} failed")
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: &Path) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Publishing {}", source.display()))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("");
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<12}  {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_skipped(&self, stage: Stage) {
        self.bar
            .println(format!("  {} {:<12}  {}", dim("-"), stage.to_string(), dim("skipped")));
    }

    fn on_asset_ready(&self, _url: &str, _cached: bool) {
        self.assets_ready.fetch_add(1, Ordering::SeqCst);
        self.bar.set_message(self.asset_message());
    }

    fn on_asset_failed(&self, url: &str, error: &str) {
        self.assets_failed.fetch_add(1, Ordering::SeqCst);
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), url, red(&msg)));
        self.bar.set_message(self.asset_message());
    }

    fn on_conversion_complete(&self, success: bool) {
        self.bar.finish_and_clear();
        if !success {
            eprintln!("{} conversion failed", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Publish spec.md as spec.html (pandoc must be on PATH)
  md2html spec.md

  # Choose the output file
  md2html spec.md -o public/index.html

  # Format the source first, and render a PDF as well
  md2html --format --pdf --date 2024-03-05 spec.md

  # Only extract metadata and fix the TOC heading, no rendering
  md2html --no-render --json spec.md

  # Layer a JSON configuration file over the defaults
  md2html --config publish.json spec.md

OUTPUT LAYOUT:
  <out-dir>/spec.html
  <out-dir>/styles/<stylesheet>.css   managed stylesheet (fetched once)
  <out-dir>/images/<name>             localized images (fetched once)

CONFIG FILE (all fields optional):
  {
    "stylesheet_url": "https://example.org/site.css",
    "stylesheet_filename": "site.css",
    "max_concurrent_downloads": 4,
    "renderer_program": "/opt/pandoc/bin/pandoc",
    "copyright_holder": "Example Org"
  }

ENVIRONMENT VARIABLES:
  RUST_LOG                Override log filter (e.g. md2html_publish=debug)
"#;

/// Publish Markdown documents as styled, self-contained HTML.
#[derive(Parser, Debug)]
#[command(
    name = "md2html",
    version,
    about = "Publish Markdown documents as styled, self-contained HTML",
    long_about = "Render a Markdown document with an external renderer, then post-process the \
HTML for static publication: localize remote images, link the managed stylesheet, insert the \
logo and meta tags, turn bare URLs into links. Optionally render a PDF beside it.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown source file.
    source: PathBuf,

    /// Write HTML to this file instead of beside the source.
    #[arg(short, long, env = "MD2HTML_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON file with configuration overrides.
    #[arg(long, env = "MD2HTML_CONFIG")]
    config: Option<PathBuf>,

    /// Run the Markdown formatter on the source before rendering.
    #[arg(long, env = "MD2HTML_FORMAT")]
    format: bool,

    /// Stop after metadata and TOC normalisation; produce no HTML.
    #[arg(long, env = "MD2HTML_NO_RENDER", conflicts_with = "pdf")]
    no_render: bool,

    /// Also render a PDF beside the HTML.
    #[arg(long, env = "MD2HTML_PDF")]
    pdf: bool,

    /// Date for the PDF footer (YYYY-MM-DD). Default: today.
    #[arg(long, env = "MD2HTML_DATE")]
    date: Option<String>,

    /// Always re-download assets, even when a local copy exists.
    #[arg(long, env = "MD2HTML_NO_CACHE")]
    no_cache: bool,

    /// Report links to anchors that do not exist in the document.
    #[arg(long, env = "MD2HTML_VALIDATE_LINKS")]
    validate_links: bool,

    /// Maximum concurrent image downloads.
    #[arg(long, env = "MD2HTML_MAX_DOWNLOADS")]
    max_downloads: Option<usize>,

    /// Per-download timeout in seconds.
    #[arg(long, env = "MD2HTML_FETCH_TIMEOUT")]
    fetch_timeout: Option<u64>,

    /// Abort the whole conversion after this many seconds.
    #[arg(long, env = "MD2HTML_TIMEOUT")]
    timeout: Option<u64>,

    /// Output structured JSON (ConversionOutput) on stdout.
    #[arg(long, env = "MD2HTML_JSON")]
    json: bool,

    /// Disable progress display.
    #[arg(long, env = "MD2HTML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2HTML_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress display is active;
    // it provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let converter = Converter::new(config).context("Failed to initialise converter")?;
    let output = converter
        .convert(&cli.source, cli.output.as_deref())
        .await
        .with_context(|| format!("Conversion of {} failed", cli.source.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`. Flags win over the config file.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder();

    if let Some(ref path) = cli.config {
        let overrides = ConfigOverrides::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        builder = builder.overrides(overrides);
    }

    builder = builder
        .format_source(cli.format)
        .render_html(!cli.no_render)
        .render_pdf(cli.pdf);

    if cli.no_cache {
        builder = builder.cache_enabled(false);
    }
    if cli.validate_links {
        builder = builder.validate_links(true);
    }
    if let Some(ref date) = cli.date {
        builder = builder.pdf_date(date.clone());
    }
    if let Some(n) = cli.max_downloads {
        builder = builder.max_concurrent_downloads(n);
    }
    if let Some(secs) = cli.fetch_timeout {
        builder = builder.fetch_timeout_secs(secs);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.conversion_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput) {
    let meta = &output.metadata;
    eprintln!("{} {}", green("✔"), bold(&meta.title));
    if output.toc_title_inserted {
        eprintln!("   {}", dim("inserted \"Table of Contents\" heading into the source"));
    }
    if let Some(ref html) = output.html_path {
        eprintln!("   HTML  →  {}", bold(&html.display().to_string()));
    }
    if let Some(ref pdf) = output.pdf_path {
        eprintln!("   PDF   →  {}", bold(&pdf.display().to_string()));
    }
    if let Some(ref report) = output.report {
        eprintln!(
            "   {} images localized, {} links created",
            report.images_localized, report.links_created
        );
        for dropped in &report.images_dropped {
            eprintln!("   {} dropped {}", yellow("⚠"), dropped.src);
        }
        for anchor in &report.broken_anchors {
            eprintln!("   {} no target for #{}", yellow("⚠"), anchor);
        }
    }
    for asset in &output.written_assets {
        eprintln!("   {} {}", cyan("+"), asset.display());
    }
    eprintln!(
        "   {}",
        dim(&format!(
            "{} fetched / {} cached  —  {}ms total",
            output.stats.assets_fetched, output.stats.assets_cached, output.stats.total_duration_ms
        ))
    );
}
