//! CLI binary for manual-pipeline.
//!
//! A thin shim over the library crate: one subcommand per stage, plus `all`,
//! `status`, `check` and the offline migrations.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use manual_pipeline::config::{ManualConfig, Settings, PUBLIC_DIR, SETTINGS_FILE};
use manual_pipeline::migrate::{self, MigrationOutcome, MigrationReport};
use manual_pipeline::pipeline::{clean, dataset, extract, manifest, render, split, status, translate};
use manual_pipeline::{
    run_all, LlmBackend, ManualRegistry, PipelineProgress, ProgressCallback, Stage, StageError, TranslateSummary,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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

/// One progress bar per stage. Translation pages complete out of order
/// within a batch, so everything goes through the bar's own counters.
struct CliProgress {
    bar: Mutex<Option<ProgressBar>>,
    errors: AtomicUsize,
    skipped: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            errors: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl PipelineProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:>9}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total_pages as u64);
        bar.set_style(style);
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        self.errors.store(0, Ordering::SeqCst);
        self.skipped.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_page_complete(&self, _stage: Stage, _page_num: u32, _total: usize) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_page_skipped(&self, _stage: Stage, _page_num: u32, _total: usize) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_page_error(&self, _stage: Stage, page_num: u32, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                red("✗"),
                page_num,
                total,
                red(&msg)
            ));
            bar.inc(1);
        });
    }

    fn on_stage_complete(&self, stage: Stage, done: usize) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
        let errors = self.errors.load(Ordering::SeqCst);
        let skipped = self.skipped.load(Ordering::SeqCst);
        let extra = if skipped > 0 {
            dim(&format!("  ({skipped} already done)"))
        } else {
            String::new()
        };
        if errors == 0 {
            eprintln!("{} {:<9} {} pages{}", green("✔"), stage, bold(&done.to_string()), extra);
        } else {
            eprintln!(
                "{} {:<9} {} pages  ({} failed){}",
                cyan("⚠"),
                stage,
                bold(&done.to_string()),
                red(&errors.to_string()),
                extra
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole pipeline for one manual
  manual-pipeline --slug oxi-coral all

  # Individual stages (each can be re-run on its own)
  manual-pipeline --slug oxi-coral split
  manual-pipeline --slug oxi-coral render
  manual-pipeline --slug oxi-coral extract
  manual-pipeline --slug oxi-coral translate
  manual-pipeline --slug oxi-coral build
  manual-pipeline --slug oxi-coral manifest

  # Where is this manual at?
  manual-pipeline --slug oxi-coral status

  # Start over (manual-pdf/<slug>/ is never touched)
  manual-pipeline --slug oxi-coral clean

  # Verify every published manual
  manual-pipeline check

  # Legacy data migrations
  manual-pipeline migrate parts-to-pages --dry-run
  manual-pipeline migrate to-bilingual

LAYOUT (relative to --root):
  pdf-config.json                  settings shared by every manual
  manual-pdf/<slug>/*.pdf          source PDF (first by name)
  temp-processing/<slug>/          split-pdf/, extracted/, translations-draft/
  public/<slug>/pages/             page images
  public/<slug>/data/              pages-<lang>.json, manifest.json
  __inbox/                         per-page translation error reports

ENVIRONMENT VARIABLES:
  MANUAL_ROOT             Project root (default: current directory)
  MANUAL_SLUG             Manual to process
  MANUAL_LLM_PROVIDER     Override settings.translationProvider
  MANUAL_LLM_MODEL        Override settings.translationModel
  ANTHROPIC_API_KEY       Anthropic API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides -v / -q
"#;

/// Turn hardware-manual PDFs into bilingual page datasets.
#[derive(Parser, Debug)]
#[command(
    name = "manual-pipeline",
    version,
    about = "Turn hardware-manual PDFs into bilingual page datasets",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Project root holding pdf-config.json, manual-pdf/ and public/.
    #[arg(long, global = true, env = "MANUAL_ROOT", default_value = ".")]
    root: PathBuf,

    /// Manual identifier: lowercase letters, digits and '-'.
    #[arg(long, global = true, env = "MANUAL_SLUG")]
    slug: Option<String>,

    #[command(flatten)]
    llm: LlmArgs,

    /// Disable progress bars.
    #[arg(long, global = true, env = "MANUAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MANUAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MANUAL_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// Translation provider (anthropic, openai, gemini, ollama, …).
    #[arg(long, global = true, env = "MANUAL_LLM_PROVIDER")]
    provider: Option<String>,

    /// Translation model ID.
    #[arg(long, global = true, env = "MANUAL_LLM_MODEL")]
    model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the source PDF into one PDF per page.
    Split,
    /// Render every page PDF to an image.
    Render,
    /// Extract the text layer of every page PDF.
    Extract,
    /// Translate extracted text; pages with a record are skipped.
    Translate,
    /// Build pages-<source>.json and pages-<target>.json.
    Build,
    /// Build manifest.json from the target dataset.
    Manifest,
    /// Empty every pipeline-owned directory of the manual.
    Clean,
    /// Run split, render, extract, translate, build and manifest.
    All,
    /// Show how far the manual has progressed.
    Status {
        /// Print the status as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check every published manual for consistency.
    Check {
        /// Dataset language to check (default: settings.targetLanguage).
        #[arg(long)]
        language: Option<String>,
    },
    /// One-way migrations of legacy published data.
    #[command(subcommand)]
    Migrate(MigrateCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Merge data/part-*.json into data/pages.json.
    PartsToPages {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Convert data/pages.json into pages-<lang>.json datasets.
    ToBilingual {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    /// Commands that render a per-page progress bar.
    fn has_progress(&self) -> bool {
        matches!(
            self,
            Command::Split
                | Command::Render
                | Command::Extract
                | Command::Translate
                | Command::Build
                | Command::Manifest
                | Command::All
        )
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep INFO-level library logs out of the way of the progress bar.
    let show_progress = !cli.quiet && !cli.no_progress && cli.command.has_progress();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: ProgressCallback = if show_progress {
        CliProgress::new()
    } else {
        manual_pipeline::progress::noop()
    };

    match &cli.command {
        Command::Status { json } => {
            let config = resolve(&cli)?;
            print_status(&config, *json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { language } => check(&cli, language.as_deref()),
        Command::Migrate(cmd) => migrate_cmd(&cli, cmd),
        Command::Clean => {
            let config = resolve(&cli)?;
            let cleaned = clean::clean(&config).context("Clean failed")?;
            if !cli.quiet {
                for dir in &cleaned {
                    eprintln!("  {} {:<20} {} entries removed", green("✓"), dir.label, dir.removed);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Split => {
            let config = resolve(&cli)?;
            let pages = split::split(&config, &progress).await.context("Split failed")?;
            summary(&cli, &format!("{pages} page PDFs in {}", config.paths.split_pdf.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Render => {
            let config = resolve(&cli)?;
            let pages = render::render(&config, &progress).await.context("Render failed")?;
            summary(&cli, &format!("{pages} images in {}", config.paths.images.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Extract => {
            let config = resolve(&cli)?;
            let pages = extract::extract_text(&config, &progress)
                .await
                .context("Text extraction failed")?;
            summary(&cli, &format!("{pages} text files in {}", config.paths.extracted.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Translate => {
            let config = resolve(&cli)?;
            let backend = LlmBackend::from_settings(&config.settings).context("Translation provider unavailable")?;
            let result = translate::translate(&config, &backend, &progress)
                .await
                .context("Translation failed")?;
            Ok(translate_exit(&cli, &result))
        }
        Command::Build => {
            let config = resolve(&cli)?;
            let built = dataset::build_datasets(&config, &progress).context("Dataset build failed")?;
            let mut line = format!("{} pages, {} with content", built.target_pages, built.content_pages);
            if built.missing_records > 0 {
                line.push_str(&format!(", {} without translation", built.missing_records));
            }
            summary(&cli, &line);
            Ok(ExitCode::SUCCESS)
        }
        Command::Manifest => {
            let config = resolve(&cli)?;
            let m = manifest::build_manifest(&config, &progress).context("Manifest build failed")?;
            summary(
                &cli,
                &format!("{}: {} pages, {} with content", m.title, m.total_pages, m.content_pages),
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::All => {
            let config = resolve(&cli)?;
            let backend = LlmBackend::from_settings(&config.settings).context("Translation provider unavailable")?;
            match run_all(&config, &backend, &progress).await {
                Ok(report) => {
                    summary(
                        &cli,
                        &format!(
                            "{}: {} pages, {} with content  →  {}",
                            report.manifest.title,
                            report.pages,
                            report.manifest.content_pages,
                            config.manifest_path().display()
                        ),
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(StageError::TranslationIncomplete { failed }) => {
                    eprintln!(
                        "{} {} page(s) failed translation; see {} and re-run to retry them",
                        red("✘"),
                        failed,
                        config.paths.inbox.display()
                    );
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e).context("Pipeline failed"),
            }
        }
    }
}

/// Resolve the manual and apply provider/model overrides.
fn resolve(cli: &Cli) -> Result<ManualConfig> {
    let mut config =
        ManualConfig::resolve(&cli.root, cli.slug.as_deref()).context("Invalid configuration")?;
    if let Some(ref provider) = cli.llm.provider {
        config.settings.translation_provider = provider.clone();
    }
    if let Some(ref model) = cli.llm.model {
        config.settings.translation_model = model.clone();
    }
    config.settings.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Settings for commands that span every manual; defaults when the project
/// has no settings file.
fn root_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if path.is_file() {
        Settings::load(&path).context("Invalid configuration")
    } else {
        Ok(Settings::default())
    }
}

fn summary(cli: &Cli, line: &str) {
    if !cli.quiet {
        eprintln!("{}  {}", green("✔"), line);
    }
}

fn translate_exit(cli: &Cli, result: &TranslateSummary) -> ExitCode {
    if !cli.quiet {
        eprintln!(
            "{}  {} translated, {} skipped, {} failed",
            if result.is_complete() { green("✔") } else { cyan("⚠") },
            result.success,
            result.skipped,
            result.failed
        );
        for failure in &result.failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
    }
    if result.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_status(config: &ManualConfig, json: bool) -> Result<()> {
    let s = status::status(config);
    if json {
        let value = serde_json::json!({
            "slug": config.slug,
            "state": s.state.to_string(),
            "splitPages": s.split_pages,
            "renderedPages": s.rendered_pages,
            "extractedPages": s.extracted_pages,
            "translatedPages": s.translated_pages,
            "missingRecords": s.missing_records,
            "errorReports": s.error_reports,
            "hasTargetDataset": s.has_target_dataset,
            "hasSourceDataset": s.has_source_dataset,
            "hasManifest": s.has_manifest,
        });
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise status")?);
        return Ok(());
    }

    let yes_no = |b: bool| if b { green("yes") } else { dim("no") };
    println!("Manual:        {}", bold(&config.slug));
    println!("Source:        {}", config.source_pdf.display());
    println!("State:         {}", cyan(&s.state.to_string()));
    println!("Split pages:   {}", s.split_pages);
    println!("Rendered:      {}", s.rendered_pages);
    println!("Extracted:     {}", s.extracted_pages);
    println!("Translated:    {}", s.translated_pages);
    if !s.missing_records.is_empty() {
        let preview: Vec<String> = s.missing_records.iter().take(20).map(u32::to_string).collect();
        let more = s.missing_records.len().saturating_sub(preview.len());
        println!(
            "Untranslated:  {}{}",
            red(&preview.join(", ")),
            if more > 0 { format!(" (+{more})") } else { String::new() }
        );
    }
    if s.error_reports > 0 {
        println!("Error reports: {}", red(&s.error_reports.to_string()));
    }
    println!(
        "Datasets:      {} {}, {} {}",
        config.settings.target_language,
        yes_no(s.has_target_dataset),
        config.settings.source_language,
        yes_no(s.has_source_dataset)
    );
    println!("Manifest:      {}", yes_no(s.has_manifest));
    Ok(())
}

fn check(cli: &Cli, language: Option<&str>) -> Result<ExitCode> {
    let language = match language {
        Some(l) => l.to_string(),
        None => root_settings(&cli.root)?.target_language,
    };
    let registry = ManualRegistry::open(cli.root.join(PUBLIC_DIR), &language).context("Failed to open registry")?;

    let slugs: Vec<String> = match cli.slug {
        Some(ref slug) => vec![slug.clone()],
        None => registry.slugs().into_iter().map(String::from).collect(),
    };
    if slugs.is_empty() && !cli.quiet {
        eprintln!("{} no published manuals under {}", cyan("⚠"), cli.root.join(PUBLIC_DIR).display());
    }

    let mut failed = 0usize;
    for slug in &slugs {
        match registry.entry(slug) {
            Ok(entry) => {
                if !cli.quiet {
                    eprintln!(
                        "  {} {:<24} {} pages, {} with content",
                        green("✓"),
                        slug,
                        entry.manifest.total_pages,
                        entry.manifest.content_pages
                    );
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {} {:<24} {}", red("✗"), slug, e);
            }
        }
    }
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn migrate_cmd(cli: &Cli, cmd: &MigrateCommand) -> Result<ExitCode> {
    let report = match cmd {
        MigrateCommand::PartsToPages { dry_run } => {
            migrate::parts_to_pages(&cli.root, *dry_run).context("Migration failed")?
        }
        MigrateCommand::ToBilingual { dry_run } => {
            let settings = root_settings(&cli.root)?;
            migrate::to_bilingual(
                &cli.root,
                &settings.source_language,
                &settings.target_language,
                *dry_run,
            )
            .context("Migration failed")?
        }
    };
    print_migration(cli, &report);
    Ok(if report.failed() == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_migration(cli: &Cli, report: &MigrationReport) {
    for outcome in &report.outcomes {
        match outcome {
            MigrationOutcome::Migrated { slug, detail } => {
                if !cli.quiet {
                    eprintln!("  {} {:<24} {}", green("✓"), slug, detail);
                }
            }
            MigrationOutcome::Skipped { slug, reason } => {
                if !cli.quiet {
                    eprintln!("  {} {:<24} {}", dim("-"), slug, dim(reason));
                }
            }
            MigrationOutcome::Failed { slug, error } => {
                eprintln!("  {} {:<24} {}", red("✗"), slug, red(&error.to_string()));
            }
        }
    }
    if !cli.quiet {
        eprintln!(
            "{}  {} migrated, {} skipped, {} failed{}",
            if report.failed() == 0 { green("✔") } else { cyan("⚠") },
            report.migrated(),
            report.skipped(),
            report.failed(),
            if report.dry_run { dim("  (dry run, nothing written)") } else { String::new() }
        );
    }
}
