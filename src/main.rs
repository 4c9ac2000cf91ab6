//! Social Restore - put social media exports back together.
//!
//! Reads a platform's data export, reunites media with its metadata,
//! re-applies captions and stickers, restores capture dates and rebuilds
//! message threads.
//!
//!   social-restore process export.zip --platform snapchat -o restored/
//!   social-restore inspect tweets.js --platform twitter --format json
//!   social-restore platforms
//!   social-restore config init

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_restore::application::{
    deliverable, format_diagnostics_table, format_platforms_table, format_records_json,
    format_records_table, format_summary, inspect, OutputFormat, RestoreSession, SourceInput,
};
use social_restore::cli::{Cli, Commands, ConfigAction};
use social_restore::domain::{AppError, ErrorKind, Platform, RestoreConfig};
use social_restore::infrastructure::{
    ensure_config_exists, load_config, OfflineFetcher,
};

/// Diagnostics rows shown after a run.
const DIAGNOSTIC_ROWS: usize = 15;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli
        .command
        .output_format()
        .map_err(|message| AppError::Config { message })?;

    match cli.command {
        Commands::Process {
            input,
            platform,
            output,
            previews,
            offline,
        } => {
            cmd_process(
                config,
                &input,
                platform,
                output.as_deref(),
                previews.as_deref(),
                offline,
            )
            .await?;
        }
        Commands::Inspect {
            input,
            platform,
            limit,
            ..
        } => {
            cmd_inspect(&config, &input, platform, format, limit)?;
        }
        Commands::Platforms => {
            println!("{}", format_platforms_table());
        }
        Commands::Config { action } => {
            cmd_config(&action, &config, cli.config.as_deref())?;
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<SourceInput> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(SourceInput::new(name, bytes))
}

/// Headline shown above a failed run, by error class.
fn failure_headline(platform: Platform, error: &AppError) -> String {
    match error.kind() {
        ErrorKind::Unimplemented => format!("🚧 {} restoration is not yet available", platform.display_name()),
        ErrorKind::Schema => "The export's metadata layout was not recognized (try `inspect`)".to_string(),
        ErrorKind::Format => "This file is not a readable export archive or document".to_string(),
        ErrorKind::NotFound => "The export is missing a required file".to_string(),
        ErrorKind::PerItem | ErrorKind::Other => "Restore failed".to_string(),
    }
}

/// Where the deliverable goes: into `output` if it is a directory (or
/// unspecified), otherwise to `output` itself.
fn resolve_output(output: Option<&Path>, name: &str) -> PathBuf {
    match output {
        None => PathBuf::from(name),
        Some(path) if path.is_dir() || path.extension().is_none() => path.join(name),
        Some(path) => path.to_path_buf(),
    }
}

/// Restore command.
async fn cmd_process(
    config: RestoreConfig,
    input: &Path,
    platform: Platform,
    output: Option<&Path>,
    previews_dir: Option<&Path>,
    offline: bool,
) -> anyhow::Result<()> {
    let source = read_input(input)?;

    let session = if offline {
        RestoreSession::with_fetcher(config, Arc::new(OfflineFetcher))
    } else {
        RestoreSession::new(config)?
    };

    println!(
        "{} {} export: {}",
        "🔧".bold(),
        platform.display_name().cyan(),
        input.display()
    );

    let outcome = session
        .process(platform, source, |update| {
            eprintln!("{} {}", format!("[{:>3}%]", update.percent).dimmed(), update.message);
        })
        .await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            let headline = failure_headline(platform, &e);
            return Err(anyhow::Error::new(e).context(headline));
        }
    };

    let out = deliverable(platform, &result.files)?;
    let path = resolve_output(output, &out.name);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, &out.bytes).with_context(|| format!("Failed to write {}", path.display()))?;

    println!();
    println!("{}", format_summary(platform, &result));
    println!("  Saved to: {}", path.display().to_string().green());

    if !result.diagnostics.is_empty() {
        println!();
        println!("{}", "Skipped records".yellow().bold());
        println!("{}", format_diagnostics_table(&result.diagnostics, DIAGNOSTIC_ROWS));
    }

    let previews = result.previews.release();
    if let Some(dir) = previews_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for preview in &previews {
            let stem = Path::new(&preview.filename)
                .file_stem()
                .map_or_else(|| preview.filename.clone(), |s| s.to_string_lossy().into_owned());
            let path = dir.join(format!("{stem}_thumb.jpg"));
            fs::write(&path, &preview.thumbnail)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        println!("  Previews: {} written to {}", previews.len(), dir.display());
    }

    Ok(())
}

/// Inspect command.
fn cmd_inspect(
    config: &RestoreConfig,
    input: &Path,
    platform: Platform,
    format: OutputFormat,
    limit: usize,
) -> anyhow::Result<()> {
    let source = read_input(input)?;
    let mut records = inspect(platform, &source, config)
        .map_err(|e| {
            let headline = failure_headline(platform, &e);
            anyhow::Error::new(e).context(headline)
        })?;
    let total = records.len();
    if limit > 0 {
        records.truncate(limit);
    }

    match format {
        OutputFormat::Json => println!("{}", format_records_json(&records)?),
        OutputFormat::Table => {
            println!("{}", format_records_table(&records));
            println!();
            println!(
                "{} {} of {} records",
                "📋".bold(),
                records.len().to_string().cyan(),
                total.to_string().cyan()
            );
        }
    }

    Ok(())
}

/// Config management command.
fn cmd_config(
    action: &ConfigAction,
    config: &RestoreConfig,
    explicit: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = ensure_config_exists()?;
            println!("{} Config file: {}", "✅".green(), path.display());
        }
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("{text}");
        }
        ConfigAction::Path => {
            let path = explicit.map_or_else(RestoreConfig::default_config_path, Path::to_path_buf);
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Setup tracing subscriber for logging.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
