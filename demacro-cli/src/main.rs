#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use demacro::{AnalyzerDriver, IntSize, TranslationConfig, TranslationStats};

/// Translate C preprocessor macros into equivalent C constructs
#[derive(Parser, Debug)]
#[command(name = "demacro", version, about)]
struct Cli {
    /// Root of the C source tree
    #[arg(long)]
    src_dir: PathBuf,

    /// Analyzer output: a record file or a directory of .maki files
    #[arg(long)]
    analysis: PathBuf,

    /// Directory receiving the transformed sources
    #[arg(long)]
    out_dir: PathBuf,

    /// Write a per-macro CSV report to this path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Program name used in the CSV report
    #[arg(long, default_value = "")]
    program_name: String,

    /// Width of int on the target
    #[arg(long, default_value = "32")]
    int_size: IntSize,

    /// Mark transformed files read-only
    #[arg(long)]
    readonly: bool,

    /// Only translate macros defined under this location prefix
    #[arg(long, default_value = "")]
    source_prefix: String,

    /// Run the analyzer over this compile_commands.json into the analysis
    /// directory before translating
    #[arg(long, requires = "plugin")]
    compile_commands: Option<PathBuf>,

    /// Path of the analyzer plugin shared library
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// Number of analyzer worker threads
    #[arg(long)]
    jobs: Option<usize>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let (Some(compile_commands), Some(plugin)) = (&cli.compile_commands, &cli.plugin) {
        let mut driver =
            AnalyzerDriver::new(plugin.clone(), cli.src_dir.clone(), cli.analysis.clone());
        if let Some(jobs) = cli.jobs {
            driver = driver.with_jobs(jobs);
        }
        let commands = AnalyzerDriver::load_compile_commands(compile_commands)
            .with_context(|| format!("loading {}", compile_commands.display()))?;
        driver
            .run(&commands)
            .context("analyzer fan-out failed")?;
    }

    let config = TranslationConfig::new()
        .with_int_size(cli.int_size)
        .with_source_prefix(cli.source_prefix.clone())
        .with_program_name(cli.program_name.clone());
    let run = demacro::translate_analysis_path(&cli.analysis, &config)
        .with_context(|| format!("loading analysis from {}", cli.analysis.display()))?;

    let written =
        demacro::apply_translations(&run.translations, &cli.src_dir, &cli.out_dir, cli.readonly)
            .context("writing transformed sources")?;

    if let Some(csv_path) = &cli.csv {
        let file = File::create(csv_path)
            .with_context(|| format!("creating {}", csv_path.display()))?;
        run.stats
            .write_csv(file, &config.program_name)
            .with_context(|| format!("writing {}", csv_path.display()))?;
    }

    print_summary(&run.stats, written.len());
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn print_summary(stats: &TranslationStats, files_written: usize) {
    let heading = format!(
        "{} macros classified: {} translated, {} skipped; {} files written",
        stats.total(),
        stats.translated(),
        stats.skipped(),
        files_written,
    );
    if atty::is(atty::Stream::Stdout) {
        println!("{}", heading.green().bold());
    } else {
        println!("{heading}");
    }
    print!("{stats}");
}
