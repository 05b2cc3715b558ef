/// Toolchain Runner - Compile and Execute Untrusted Source
///
/// **Core Responsibility:**
/// Turn (language, source, stdin) into a classified `ExecutionOutcome` by
/// driving the language's `CompileStage` and `RunStage` as child processes.
///
/// **Critical Architectural Boundary:**
/// - Runner knows HOW to build and run a program
/// - Runner does NOT know about test cases or verdicts
/// - Compile errors, runtime errors and timeouts are returned as outcomes;
///   only infrastructure failures come back as `Err`
///
/// Compilation is split from execution so the judge can build once and run
/// the same artifact against every test case.

use crate::classifier;
use crate::error::{EngineError, Result};
use crate::process::{self, StageLimits};
use crate::toolchain::{StagePaths, Toolchain, ToolchainRegistry};
use crate::workspace::{release_all, FileHandle, ScratchDir, WorkspaceManager};
use async_trait::async_trait;
use codejudge_common::config::ServiceConfig;
use codejudge_common::types::{ExecutionOutcome, Language};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Safety limits to keep pathological payloads away from the toolchains
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Result of the build step
#[derive(Debug)]
pub enum Preparation<P> {
    /// Ready to execute any number of times
    Ready(P),
    /// The toolchain refused the source; no execution is possible
    Rejected(ExecutionOutcome),
}

/// Anything that can build a program once and run it against many inputs.
///
/// The judge is written against this trait so its state machine can be
/// exercised without spawning processes.
#[async_trait]
pub trait Executor: Send + Sync {
    type Program: Send + Sync;

    async fn prepare(&self, language: Language, source: &str) -> Result<Preparation<Self::Program>>;

    async fn execute(&self, program: &Self::Program, stdin: &str) -> Result<ExecutionOutcome>;
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerLimits {
    /// Budget for the execution stage
    pub timeout: Duration,
    /// Budget for the compile stage
    pub compile_timeout: Duration,
    pub max_output_bytes: usize,
}

impl From<&ServiceConfig> for RunnerLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            compile_timeout: Duration::from_millis(config.compile_timeout_ms),
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// A source file that passed its compile stage, the artifact it produced and
/// the directory its processes run in. All of them are removed when this is
/// released or dropped.
#[derive(Debug)]
pub struct PreparedProgram {
    toolchain: Toolchain,
    paths: StagePaths,
    source: FileHandle,
    artifact: FileHandle,
    scratch: ScratchDir,
}

impl PreparedProgram {
    pub fn job_id(&self) -> &str {
        self.source.id()
    }

    pub fn language(&self) -> Language {
        self.toolchain.language
    }

    /// Remove the job's files and directory now instead of on drop
    pub fn release(self) -> std::io::Result<()> {
        let files = release_all([self.source, self.artifact]);
        let scratch = self.scratch.release();
        files.and(scratch)
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainRunner {
    registry: Arc<ToolchainRegistry>,
    workspace: WorkspaceManager,
    limits: RunnerLimits,
}

impl ToolchainRunner {
    pub fn new(registry: Arc<ToolchainRegistry>, workspace: WorkspaceManager, limits: RunnerLimits) -> Self {
        Self {
            registry,
            workspace,
            limits,
        }
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn limits(&self) -> RunnerLimits {
        self.limits
    }

    /// One-shot job for the run path: build, execute once, clean up
    #[tracing::instrument(skip_all, fields(language = %language))]
    pub async fn run_once(&self, language: Language, source: &str, stdin: &str) -> Result<ExecutionOutcome> {
        check_stdin(stdin)?;

        let program = match self.prepare(language, source).await? {
            Preparation::Ready(program) => program,
            Preparation::Rejected(outcome) => return Ok(outcome),
        };

        let job_id = program.job_id().to_string();
        let result = self.execute(&program, stdin).await;

        if let Err(e) = program.release() {
            warn!(job_id = %job_id, error = %e, "Failed to release job files");
        }

        result
    }

    fn stage_limits(&self, timeout: Duration) -> StageLimits {
        StageLimits {
            timeout,
            max_output_bytes: self.limits.max_output_bytes,
        }
    }
}

#[async_trait]
impl Executor for ToolchainRunner {
    type Program = PreparedProgram;

    async fn prepare(&self, language: Language, source: &str) -> Result<Preparation<PreparedProgram>> {
        check_source(source)?;

        let toolchain = self.registry.get(language)?.clone();
        let source_file = self
            .workspace
            .materialize_source(source, &toolchain.file_extension)?;
        let artifact = self.workspace.reserve_artifact(&source_file);
        let scratch = self.workspace.create_scratch(&source_file)?;

        let paths = StagePaths {
            source: source_file.path().to_path_buf(),
            artifact: artifact.path().to_path_buf(),
            dir: scratch.path().to_path_buf(),
        };

        if let Some(compile) = &toolchain.compile {
            let (program, args) = compile.command.render(&paths);
            debug!(job_id = %source_file.id(), program = %program, "Compiling");

            let output = process::run_stage(
                &program,
                &args,
                &paths.dir,
                None,
                &self.stage_limits(self.limits.compile_timeout),
            )
            .await?;

            if let Some(outcome) = classifier::classify_compile(&output, compile, &paths.source) {
                info!(
                    job_id = %source_file.id(),
                    language = %language,
                    compile_ms = output.elapsed.as_millis() as u64,
                    "Compilation rejected source"
                );
                // Handles drop here, removing the source, any partial artifact and the job dir
                return Ok(Preparation::Rejected(outcome));
            }

            debug!(
                job_id = %source_file.id(),
                compile_ms = output.elapsed.as_millis() as u64,
                "Compilation succeeded"
            );
        }

        Ok(Preparation::Ready(PreparedProgram {
            toolchain,
            paths,
            source: source_file,
            artifact,
            scratch,
        }))
    }

    async fn execute(&self, program: &PreparedProgram, stdin: &str) -> Result<ExecutionOutcome> {
        check_stdin(stdin)?;

        let input = self.workspace.materialize_input(stdin)?;
        let (command, args) = program.toolchain.run.command.render(&program.paths);

        let result = process::run_stage(
            &command,
            &args,
            &program.paths.dir,
            Some(input.path()),
            &self.stage_limits(self.limits.timeout),
        )
        .await;

        if let Err(e) = input.release() {
            warn!(job_id = %program.job_id(), error = %e, "Failed to remove input file");
        }

        let output = result?;
        let outcome = classifier::classify_run(&output, &program.paths.source);

        info!(
            job_id = %program.job_id(),
            language = %program.language(),
            execution_ms = output.elapsed.as_millis() as u64,
            outcome = outcome.label(),
            "Execution finished"
        );

        Ok(outcome)
    }
}

fn check_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(EngineError::InvalidRequest("code is required".to_string()));
    }
    if source.len() > MAX_SOURCE_CODE_BYTES {
        return Err(EngineError::InvalidRequest(format!(
            "source code exceeds {} bytes",
            MAX_SOURCE_CODE_BYTES
        )));
    }
    Ok(())
}

fn check_stdin(stdin: &str) -> Result<()> {
    if stdin.len() > MAX_STDIN_BYTES {
        return Err(EngineError::InvalidRequest(format!(
            "input exceeds {} bytes",
            MAX_STDIN_BYTES
        )));
    }
    Ok(())
}
