mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codejudge-cli")]
#[command(about = "CodeJudge CLI - Run and judge code locally, manage problems and sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a source file once
    Run {
        /// Language (cpp, c, rust, python, javascript, shell)
        #[arg(short, long, default_value = "cpp")]
        lang: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Judge a source file against a JSON list of test cases
    Judge {
        #[arg(short, long, default_value = "cpp")]
        lang: String,

        #[arg(short, long)]
        file: PathBuf,

        /// JSON array of {"input", "expected_output"}
        #[arg(short, long)]
        tests: PathBuf,

        /// first-failure or all-cases
        #[arg(short, long, default_value = "first-failure")]
        mode: String,
    },

    /// List configured toolchains
    Languages,

    /// Store a problem's hidden test cases in Redis
    SeedProblem {
        #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
        redis_url: String,

        #[arg(short, long)]
        problem_id: String,

        #[arg(short, long)]
        tests: PathBuf,
    },

    /// Register a session token for a submitter
    AddSession {
        #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
        redis_url: String,

        #[arg(short, long)]
        token: String,

        #[arg(short, long)]
        submitter: String,

        /// Lifetime in seconds
        #[arg(long, default_value = "86400")]
        ttl: u64,
    },

    /// Show the problems a submitter has solved
    Solved {
        #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
        redis_url: String,

        #[arg(short, long)]
        submitter: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { lang, file, input } => {
            commands::run_file(&lang, &file, input.as_deref()).await?;
        }
        Commands::Judge {
            lang,
            file,
            tests,
            mode,
        } => {
            commands::judge_file(&lang, &file, &tests, &mode).await?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
        Commands::SeedProblem {
            redis_url,
            problem_id,
            tests,
        } => {
            commands::seed_problem(&redis_url, &problem_id, &tests).await?;
        }
        Commands::AddSession {
            redis_url,
            token,
            submitter,
            ttl,
        } => {
            commands::add_session(&redis_url, &token, &submitter, ttl).await?;
        }
        Commands::Solved {
            redis_url,
            submitter,
        } => {
            commands::show_solved(&redis_url, &submitter).await?;
        }
    }

    Ok(())
}
