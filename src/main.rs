use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use iojudge::{iospec, judger, languages, registry, JudgeOptions, Limits, Verdict};

#[derive(Parser)]
#[command(name = "judge", about = "Build, run and grade interactive console programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and print the interaction transcript
    Run {
        /// Path to the source file
        source: PathBuf,
        /// File with one input value per line, fed as a single run
        #[arg(long, conflicts_with = "io")]
        inputs: Option<PathBuf>,
        /// Interaction spec file; the program is run once per test case
        /// using its inputs
        #[arg(long)]
        io: Option<PathBuf>,
        /// Language key or alias (default: inferred from the file extension)
        #[arg(long)]
        lang: Option<String>,
        /// Wall-clock limit per run in milliseconds
        #[arg(long)]
        time_limit: Option<u64>,
    },
    /// Grade a program against an interaction spec
    Grade {
        /// Path to the source file
        source: PathBuf,
        /// Interaction spec file with the expected test cases
        spec: PathBuf,
        /// Language key or alias (default: inferred from the file extension)
        #[arg(long)]
        lang: Option<String>,
        /// Wall-clock limit per test case in milliseconds
        #[arg(long)]
        time_limit: Option<u64>,
        /// Emit the reports as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("judge=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    match std::env::var("LANGUAGES_CONFIG") {
        Ok(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read language configuration {}", path))?;
            languages::register_languages_from_toml(&content)?;
            info!("Loaded language configurations from {}", path);
        }
        Err(_) => languages::register_builtin_languages()?,
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            source,
            inputs,
            io,
            lang,
            time_limit,
        } => run_command(&source, inputs, io, lang, time_limit).await,
        Commands::Grade {
            source,
            spec,
            lang,
            time_limit,
            json,
        } => grade_command(&source, &spec, lang, time_limit, json).await,
    }
}

async fn run_command(
    source: &Path,
    inputs: Option<PathBuf>,
    io: Option<PathBuf>,
    lang: Option<String>,
    time_limit: Option<u64>,
) -> Result<ExitCode> {
    let code = read_source(source)?;
    let lang = resolve_language(source, lang)?;
    let options = options_for(time_limit);

    let input_sets: Vec<Vec<String>> = match (inputs, io) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read inputs file {}", path.display()))?;
            vec![content.lines().map(|l| l.to_string()).collect()]
        }
        (None, Some(path)) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read spec file {}", path.display()))?;
            iospec::parse(&content)?
                .iter()
                .map(|case| case.inputs())
                .collect()
        }
        (None, None) => vec![Vec::new()],
    };

    let transcripts = judger::run_with_options(&code, &input_sets, &lang, &options).await?;
    print!("{}", iospec::format_all(&transcripts));
    Ok(ExitCode::SUCCESS)
}

async fn grade_command(
    source: &Path,
    spec: &Path,
    lang: Option<String>,
    time_limit: Option<u64>,
    json: bool,
) -> Result<ExitCode> {
    let code = read_source(source)?;
    let lang = resolve_language(source, lang)?;
    let options = options_for(time_limit);

    let content = std::fs::read_to_string(spec)
        .with_context(|| format!("failed to read spec file {}", spec.display()))?;
    let cases = iospec::parse(&content)?;

    let reports = judger::grade_with_options(&code, &cases, &lang, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (index, report) in reports.iter().enumerate() {
            println!("case {}: {}", index + 1, report.verdict);
            if let Some(mismatch) = &report.mismatch {
                println!("  expected: {:?}", mismatch.expected);
                println!("  observed: {:?}", mismatch.observed);
            }
            if let Some(message) = &report.message {
                for line in message.lines() {
                    println!("  {}", line);
                }
            }
        }
        let correct = reports.iter().filter(|r| r.is_correct()).count();
        println!("{}/{} correct", correct, reports.len());
    }

    if reports.iter().all(|r| r.verdict == Verdict::Correct) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read source file {}", path.display()))
}

fn resolve_language(source: &Path, lang: Option<String>) -> Result<String> {
    match lang {
        Some(lang) => Ok(lang),
        None => {
            let registration = registry::resolve_by_filename(&source.to_string_lossy())?;
            Ok(registration.key.clone())
        }
    }
}

fn options_for(time_limit: Option<u64>) -> JudgeOptions {
    let mut options = JudgeOptions::default();
    if let Some(ms) = time_limit {
        options.limits = Limits {
            wall_time_ms: ms,
            ..Limits::default()
        };
    }
    options
}
