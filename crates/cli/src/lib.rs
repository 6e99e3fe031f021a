use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use concur_checker::{Analysis, CheckerConfig, CheckerKind, Report, CONFIG_FILE_NAME};
use concur_graph::{BuildOptions, GraphDocument, Program, ProgramBuilder};
use std::path::PathBuf;
use std::process::ExitCode;

mod output;
mod scan;

use output::OutputFormat;
use scan::SourceScanner;

#[derive(Parser)]
#[command(name = "concur")]
#[command(about = "Check that functions run only in the concurrency contexts they declare", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report calls made from the wrong context
    Check(CheckArgs),

    /// Print the tags declared in both namespaces
    Facts(FactsArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Files or directories to analyze (defaults to current directory)
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Load a call graph document instead of parsing sources
    #[arg(long, value_name = "FILE")]
    graph: Option<PathBuf>,

    /// Configuration file (defaults to concur.toml in the project root)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Checkers to run (overrides the configuration)
    #[arg(long = "checker", value_enum)]
    checkers: Vec<CheckerArg>,
}

#[derive(Args)]
struct FactsArgs {
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Copy, Clone, ValueEnum)]
enum CheckerArg {
    Context,
    Lexical,
}

impl From<CheckerArg> for CheckerKind {
    fn from(arg: CheckerArg) -> Self {
        match arg {
            CheckerArg::Context => CheckerKind::Context,
            CheckerArg::Lexical => CheckerKind::Lexical,
        }
    }
}

pub fn main_entry() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Check(args) => run_check(args),
        Commands::Facts(args) => run_facts(args),
    }
}

fn run_check(args: CheckArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.source)?;
    if !args.checkers.is_empty() {
        config.checkers = args.checkers.iter().copied().map(CheckerKind::from).collect();
        config.checkers.sort();
        config.checkers.dedup();
    }

    let report = analyze(&args.source, config)?;
    print!("{}", output::render_diagnostics(&report, args.source.format)?);

    log::info!(
        "{} diagnostics ({} context, {} lexical)",
        report.diagnostics.len(),
        report.count(CheckerKind::Context),
        report.count(CheckerKind::Lexical)
    );

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_facts(args: FactsArgs) -> Result<ExitCode> {
    let config = load_config(&args.source)?;
    let report = analyze(&args.source, config)?;
    print!("{}", output::render_facts(&report, args.source.format)?);
    Ok(ExitCode::SUCCESS)
}

fn analyze(source: &SourceArgs, config: CheckerConfig) -> Result<Report> {
    let analysis = Analysis::new(config).context("Invalid configuration")?;
    let program = load_program(source, analysis.config().build_options())?;
    Ok(analysis.run(&program))
}

/// Explicit `--config`, else `concur.toml` in the project root, else defaults
fn load_config(source: &SourceArgs) -> Result<CheckerConfig> {
    if let Some(path) = &source.config {
        return CheckerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let root = project_root(&source.paths);
    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        log::debug!("Using config {}", candidate.display());
        return CheckerConfig::load(&candidate)
            .with_context(|| format!("Failed to load config {}", candidate.display()));
    }

    Ok(CheckerConfig::default())
}

fn project_root(paths: &[PathBuf]) -> PathBuf {
    match paths.first() {
        Some(path) if path.is_dir() => path.clone(),
        _ => PathBuf::from("."),
    }
}

fn load_program(source: &SourceArgs, options: &BuildOptions) -> Result<Program> {
    if let Some(path) = &source.graph {
        let document = GraphDocument::load(path)
            .with_context(|| format!("Failed to read graph document {}", path.display()))?;
        return document
            .into_program()
            .with_context(|| format!("Invalid graph document {}", path.display()));
    }

    for path in &source.paths {
        if !path.exists() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }
    }

    let files = SourceScanner::new(source.paths.iter().cloned()).scan();
    Ok(build_program(&files, options))
}

/// Unreadable files are skipped; a builder that cannot start yields an empty program
fn build_program(files: &[PathBuf], options: &BuildOptions) -> Program {
    let mut builder = match ProgramBuilder::new(options.clone()) {
        Ok(builder) => builder,
        Err(e) => {
            log::warn!("No call graph available: {e}");
            return Program::default();
        }
    };

    for file in files {
        if let Err(e) = builder.add_file(file) {
            log::warn!("Skipping {}: {e}", file.display());
        }
    }
    if builder.file_count() == 0 {
        log::warn!("No Rust sources found; nothing to check");
    }

    builder.build()
}
