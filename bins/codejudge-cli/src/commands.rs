// CLI commands: local run/judge, toolchain listing, Redis seeding
use anyhow::{bail, Context, Result};
use codejudge_common::config::ServiceConfig;
use codejudge_common::redis as keys;
use codejudge_common::types::{JudgeMode, Language, SubmitResponse, TestCase};
use codejudge_engine::{Judge, RunnerLimits, ToolchainRegistry, ToolchainRunner, WorkspaceManager};
use redis::aio::ConnectionManager;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn local_runner(config: &ServiceConfig) -> Result<ToolchainRunner> {
    let registry = ToolchainRegistry::load_or_builtin(&config.languages_path)
        .context("Failed to load toolchains")?;

    let workspace = WorkspaceManager::new(&config.workdir);
    workspace
        .init()
        .with_context(|| format!("Failed to prepare workdir {}", config.workdir.display()))?;

    Ok(ToolchainRunner::new(
        Arc::new(registry),
        workspace,
        RunnerLimits::from(config),
    ))
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Parse a JSON array of test cases
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test cases in {}", path.display()))
}

async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
    ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// Run a file once and print what the /run endpoint would return
pub async fn run_file(lang: &str, file: &Path, input: Option<&Path>) -> Result<()> {
    let language: Language = lang.parse()?;
    let source = read_source(file)?;
    let stdin = match input {
        Some(path) => read_source(path)?,
        None => String::new(),
    };

    let config = ServiceConfig::from_env()?;
    let runner = local_runner(&config)?;

    let outcome = runner.run_once(language, &source, &stdin).await?;
    print!("{}", outcome.render());
    if !outcome.is_success() {
        println!();
    }
    Ok(())
}

/// Judge a file against local test cases and print the verdict as JSON
pub async fn judge_file(lang: &str, file: &Path, tests: &Path, mode: &str) -> Result<()> {
    let language: Language = lang.parse()?;
    let mode: JudgeMode = mode.parse().map_err(anyhow::Error::msg)?;
    let source = read_source(file)?;
    let cases = load_test_cases(tests)?;

    let config = ServiceConfig::from_env()?;
    let judge = Judge::new(local_runner(&config)?, mode);

    println!("→ Judging {} against {} test cases", file.display(), cases.len());
    let report = judge.judge(language, &source, &cases).await?;

    let response = SubmitResponse::from(report);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn list_languages() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let registry = ToolchainRegistry::load_or_builtin(&config.languages_path)
        .context("Failed to load toolchains")?;

    for language in registry.languages() {
        let toolchain = registry.get(language)?;
        let compile = match &toolchain.compile {
            Some(stage) => format!("{} {}", stage.command.program, stage.command.args.join(" ")),
            None => "-".to_string(),
        };
        println!(
            "{:<12} .{:<4} compile: {:<50} run: {} {}",
            language,
            toolchain.file_extension,
            compile,
            toolchain.run.command.program,
            toolchain.run.command.args.join(" ")
        );
    }
    Ok(())
}

pub async fn seed_problem(redis_url: &str, problem_id: &str, tests: &Path) -> Result<()> {
    if problem_id.trim().is_empty() {
        bail!("Problem id cannot be empty");
    }
    let cases = load_test_cases(tests)?;

    let mut conn = connect(redis_url).await?;
    keys::put_test_cases(&mut conn, problem_id, &cases)
        .await
        .context("Failed to store test cases")?;

    println!("✓ Stored {} test cases for problem {}", cases.len(), problem_id);
    Ok(())
}

pub async fn add_session(redis_url: &str, token: &str, submitter: &str, ttl: u64) -> Result<()> {
    if token.trim().is_empty() || submitter.trim().is_empty() {
        bail!("Token and submitter cannot be empty");
    }

    let mut conn = connect(redis_url).await?;
    keys::put_session(&mut conn, token, submitter, ttl)
        .await
        .context("Failed to store session")?;

    println!("✓ Session registered for {} (expires in {}s)", submitter, ttl);
    Ok(())
}

pub async fn show_solved(redis_url: &str, submitter: &str) -> Result<()> {
    let mut conn = connect(redis_url).await?;
    let mut solved = keys::solved_problems(&mut conn, submitter)
        .await
        .context("Failed to read solved set")?;
    solved.sort();

    if solved.is_empty() {
        println!("{} has not solved any problems yet", submitter);
    }
    for problem in solved {
        println!("{}", problem);
    }
    Ok(())
}
