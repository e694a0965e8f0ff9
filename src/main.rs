//! CLI entry point for chorus.
//!
//! Commands: `init`, `config`, `analyze` and `words`.

use anyhow::Context;
use chorus::display::{
    StageProgress, THEME, Theme, create_cluster_table, create_stats_table, create_word_table,
};
use chorus::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use chorus::pipeline::{AnalysisReport, AnalysisSupervisor, Pipeline};
use chorus::text::WordCounter;
use chorus::{PipelineError, Settings, TextItem};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic clusters for song comments
#[derive(Parser)]
#[command(
    name = "chorus",
    version = env!("CARGO_PKG_VERSION"),
    about = "Group comments into semantic clusters",
    long_about = "Embed comments, cluster them at two granularities and summarize each group.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .chorus directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display effective settings")]
    Config,

    #[command(about = "Cluster the comments in a JSON file")]
    Analyze {
        /// JSON array of comments with at least `id` and `text`
        file: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Pin the clustering seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    #[command(about = "Show the most frequent words in a JSON file of comments")]
    Words {
        file: PathBuf,

        /// Number of words to show
        #[arg(short, long, default_value_t = 30)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Configuration error: {e}")));
            return ExitCode::ConfigError.into();
        }
    };

    init_tracing(&settings);

    let code = match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Config => run_config(&settings),
        Commands::Analyze { file, json, seed } => {
            run_analyze(settings, &file, OutputFormat::from_json_flag(json), seed).await
        }
        Commands::Words { file, limit } => run_words(&file, limit),
    };
    code.into()
}

fn init_tracing(settings: &Settings) {
    let fallback = if settings.debug {
        "debug".to_string()
    } else {
        settings.logging.level.clone()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_init(force: bool) -> ExitCode {
    match Settings::init_config_file(force) {
        Ok(path) => {
            let verb = if force { "Wrote" } else { "Created" };
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "{verb} configuration file at: {}",
                    path.display()
                ))
            );
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&e.to_string()));
            ExitCode::ConfigError
        }
    }
}

fn run_config(settings: &Settings) -> ExitCode {
    match settings.to_toml() {
        Ok(rendered) => {
            println!("{}", THEME.apply(&THEME.header, "Effective settings"));
            println!();
            println!("{rendered}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Cannot render settings: {e}")));
            ExitCode::GeneralError
        }
    }
}

fn read_items(path: &Path) -> anyhow::Result<Vec<TextItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("'{}' is not a JSON array of comments", path.display()))
}

async fn run_analyze(
    mut settings: Settings,
    file: &Path,
    format: OutputFormat,
    seed: Option<u64>,
) -> ExitCode {
    let items = match read_items(file) {
        Ok(items) => items,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
            return ExitCode::IoError;
        }
    };

    if seed.is_some() {
        settings.clustering.seed = seed;
    }
    if settings.embedding.api_key().is_none() {
        eprintln!(
            "{}",
            THEME.warning_with_icon(&format!(
                "{} is not set, requests will be sent without a key",
                settings.embedding.api_key_env
            ))
        );
    }

    let service = match settings.embedding.http_service() {
        Ok(service) => service,
        Err(e) => return report_error(&PipelineError::from(e), format),
    };
    let pipeline = Pipeline::from_settings(&settings, Arc::new(service));

    let supervisor = Arc::new(AnalysisSupervisor::new());
    let ticket = supervisor.begin();
    let interrupt = Arc::clone(&supervisor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel_current();
        }
    });

    let progress = if format.is_json() || Theme::should_disable_colors() {
        StageProgress::hidden()
    } else {
        StageProgress::new()
    };

    let started = Instant::now();
    let result = pipeline.run_observed(items, &ticket, &progress).await;
    progress.finish();

    match result {
        Ok(report) if supervisor.is_current(&ticket) => {
            let elapsed = started.elapsed().as_millis() as u64;
            print_report(&report, format, elapsed)
        }
        Ok(_) => ExitCode::Cancelled,
        Err(e) => report_error(&e, format),
    }
}

fn print_report(report: &AnalysisReport, format: OutputFormat, elapsed_ms: u64) -> ExitCode {
    if format.is_json() {
        let response = JsonResponse::success(report).with_meta(ResponseMeta::now(Some(elapsed_ms)));
        return match serde_json::to_string_pretty(&response) {
            Ok(json) => {
                println!("{json}");
                ExitCode::Success
            }
            Err(e) => {
                eprintln!("{}", THEME.error_with_icon(&format!("Cannot serialize report: {e}")));
                ExitCode::GeneralError
            }
        };
    }

    println!(
        "{}",
        THEME.apply(
            &THEME.header,
            format!("Coarse clusters ({} comments)", report.coarse.item_count())
        )
    );
    println!("{}", create_cluster_table(report, &report.coarse));

    println!();
    println!(
        "{}",
        THEME.apply(&THEME.header, format!("Fine clusters ({})", report.fine.len()))
    );
    println!("{}", create_cluster_table(report, &report.fine));

    if !report.claims.is_empty() {
        println!();
        println!("{}", THEME.apply(&THEME.header, "What people are saying"));
        for claim in &report.claims {
            println!("  {}", THEME.apply(&THEME.quote, &claim.text));
        }
    }

    println!();
    println!("{}", create_stats_table(&report.stats));
    println!(
        "{}",
        THEME.success_with_icon(&format!("Analysis finished in {elapsed_ms} ms"))
    );
    ExitCode::Success
}

fn report_error(error: &PipelineError, format: OutputFormat) -> ExitCode {
    if format.is_json() {
        let response = JsonResponse::from_error(error);
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("{error}"),
        }
    } else {
        eprintln!(
            "{}",
            THEME.error_with_icon(&format!("Failed during {}: {error}", error.stage()))
        );
        for suggestion in error.recovery_suggestions() {
            eprintln!("  {}", THEME.apply(&THEME.dim, format!("- {suggestion}")));
        }
    }
    ExitCode::from_error(error)
}

fn run_words(file: &Path, limit: usize) -> ExitCode {
    let items = match read_items(file) {
        Ok(items) => items,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
            return ExitCode::IoError;
        }
    };

    let words = WordCounter::default()
        .with_limit(limit)
        .count(items.iter().map(|item| item.text.as_str()));

    if words.is_empty() {
        println!("{}", THEME.warning_with_icon("No recurring words found"));
    } else {
        println!("{}", create_word_table(&words));
    }
    ExitCode::Success
}
