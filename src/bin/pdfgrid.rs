//! CLI binary for edgequake-pdfgrid.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfgrid::{
    inspect_with_password, run, GridLayout, LayoutRecorder, PipelineConfig,
    PipelineProgressCallback, PipelineState, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar, reused per phase. It spins while pages are rasterised and
/// counts files during the tonal stages, whose files finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Pages rasterised; the length of every tonal stage.
    pages: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            pages: AtomicUsize::new(0),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, run_id: &str) {
        self.bar.set_message(dim(run_id));
    }

    fn on_phase_start(&self, phase: PipelineState) {
        self.bar.set_prefix(phase.to_string());
        match phase {
            PipelineState::Stage1 | PipelineState::Stage2 | PipelineState::Final => {
                self.bar.set_style(Self::bar_style());
                self.bar.set_length(self.pages.load(Ordering::SeqCst) as u64);
                self.bar.set_position(0);
                self.bar.set_message("");
            }
            _ => {
                self.bar.set_style(Self::spinner_style());
            }
        }
    }

    fn on_file_complete(&self, _phase: PipelineState, file: &str, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
        self.bar.set_message(file.to_string());
    }

    fn on_phase_complete(&self, phase: PipelineState, files: usize) {
        if phase == PipelineState::Rasterizing {
            self.pages.store(files, Ordering::SeqCst);
        }
        let unit = if phase == PipelineState::Assembling {
            "pages"
        } else {
            "files"
        };
        self.bar.println(format!(
            "  {} {:<12} {}",
            green("✓"),
            phase.to_string(),
            dim(&format!("{files} {unit}"))
        ));
    }

    fn on_run_complete(&self, pages: usize, tiles: usize) {
        self.bar.finish_and_clear();
        if tiles == 0 {
            eprintln!("{} nothing to tile, no document written", cyan("⚠"));
        } else {
            eprintln!(
                "{} {} tiles on {} pages",
                green("✔"),
                bold(&tiles.to_string()),
                bold(&pages.to_string())
            );
        }
    }

    fn on_run_failed(&self, phase: PipelineState, error: &str) {
        self.bar.abandon();
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        eprintln!("{} failed during {}: {}", red("✘"), phase, red(&msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default 2 columns × 4 rows, written next to the input
  pdfgrid slides.pdf

  # 3 columns × 5 rows to a chosen file
  pdfgrid slides.pdf --columns 3 --rows 5 -o handout.pdf

  # Print where every tile would go, without writing a PDF
  pdfgrid slides.pdf --plan

  # Inspect PDF metadata only
  pdfgrid --inspect-only slides.pdf

  # JSON summary of the run
  pdfgrid --json slides.pdf > run.json

LAYOUT:
  Rows must be 1–20 and columns 1–10. A value outside its range silently
  falls back to the default for that dimension (4 rows, 2 columns).

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH    Path to libpdfium; otherwise ./ then the system library path
  RUST_LOG           Override the log filter (e.g. edgequake_pdfgrid=debug)
"#;

/// Turn PDF pages into a numbered grid of darkened thumbnails.
#[derive(Parser, Debug)]
#[command(
    name = "pdfgrid",
    version,
    about = "Turn PDF pages into a numbered grid of darkened thumbnails",
    long_about = "Rasterise every page of a PDF, pass the pages through three fixed \
negate-and-contrast stages, and tile them rows × columns per A4 page, each tile \
bordered and numbered.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write the grid PDF here. Default: <input stem>.grid.pdf next to the input.
    #[arg(short, long, env = "PDFGRID_OUTPUT")]
    output: Option<PathBuf>,

    /// Tile rows per page (1–20, default 4).
    #[arg(long, env = "PDFGRID_ROWS", allow_negative_numbers = true)]
    rows: Option<i64>,

    /// Tile columns per page (1–10, default 2).
    #[arg(long, env = "PDFGRID_COLUMNS", allow_negative_numbers = true)]
    columns: Option<i64>,

    /// Longest edge of each rasterised page, in pixels.
    #[arg(long, env = "PDFGRID_MAX_PIXELS", default_value_t = 1200,
          value_parser = clap::value_parser!(u32).range(100..=10000))]
    max_pixels: u32,

    /// Images transformed at once inside a stage.
    #[arg(short, long, env = "PDFGRID_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFGRID_PASSWORD")]
    password: Option<String>,

    /// Parent directory for per-run staging directories.
    #[arg(long, env = "PDFGRID_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Print the tile layout as JSON instead of writing a PDF.
    #[arg(long)]
    plan: bool,

    /// Print a JSON summary of the run (PipelineOutput) on stdout.
    #[arg(long, env = "PDFGRID_JSON")]
    json: bool,

    /// Print PDF metadata only, no processing.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFGRID_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFGRID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFGRID_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.plan;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect_with_password(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            if let Some(ref p) = info.producer {
                println!("Producer:     {}", p);
            }
            let layout = GridLayout::resolve(cli.rows, cli.columns);
            println!(
                "Grid pages:   {} at {}",
                layout.page_count(info.page_count),
                layout
            );
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    // A plan is written to a scratch directory and echoed on stdout.
    let plan_dir = if cli.plan {
        Some(tempfile::tempdir().context("Failed to create plan directory")?)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb, plan_dir.as_ref().map(|d| d.path()))?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = run(&cli.input, cli.rows, cli.columns, &config)
        .await
        .context("Pipeline failed")?;

    if cli.plan {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        match output.output_path {
            Some(ref path) => {
                let plan = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read plan {:?}", path))?;
                handle.write_all(&plan).context("Failed to write to stdout")?;
                handle.write_all(b"\n").ok();
            }
            None => {
                handle.write_all(b"[]\n").context("Failed to write to stdout")?;
            }
        }
        return Ok(());
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet && !cli.json {
        for w in &output.warnings {
            eprintln!("  {} {}", cyan("⚠"), w);
        }
        match output.output_path {
            Some(ref path) => eprintln!(
                "{}  {} tiles  {} pages  {}ms  →  {}",
                green("✔"),
                output.stats.tiles,
                output.stats.output_pages,
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            ),
            None if !show_progress => {
                eprintln!("Nothing to tile; no document written");
            }
            None => {}
        }
    }

    Ok(())
}

/// Default output location: `<stem>.grid.pdf` beside the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}.grid.pdf"))
}

/// Map CLI args to `PipelineConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    plan_dir: Option<&Path>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder = match plan_dir {
        Some(dir) => builder
            .backend(Arc::new(LayoutRecorder))
            .output_path(dir.join("plan.json")),
        None => builder.output_path(
            cli.output
                .clone()
                .unwrap_or_else(|| default_output(&cli.input)),
        ),
    };

    builder.build().context("Invalid configuration")
}
