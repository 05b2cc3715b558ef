/// Judge Service - the Run and Submit entry points
///
/// Run:    request -> runner -> outcome. Never touches collaborators.
/// Submit: credential -> identity -> hidden tests -> judge -> reporter -> report.
///
/// A semaphore bounds how many jobs hold child processes at once; requests
/// beyond that wait for a permit rather than failing.

use crate::error::{EngineError, Result};
use crate::judge::Judge;
use crate::reporter::VerdictReporter;
use crate::runner::ToolchainRunner;
use crate::store::{IdentityVerifier, ProblemStore, SubmissionLedger};
use codejudge_common::types::{
    ExecutionOutcome, JudgeMode, JudgeReport, Language, RunRequest, SubmitRequest,
};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{info, warn};

/// Collaborators the submit path depends on
#[derive(Clone)]
pub struct Collaborators {
    pub problems: Arc<dyn ProblemStore>,
    pub ledger: Arc<dyn SubmissionLedger>,
    pub identity: Arc<dyn IdentityVerifier>,
}

pub struct JudgeService {
    judge: Judge<ToolchainRunner>,
    problems: Arc<dyn ProblemStore>,
    identity: Arc<dyn IdentityVerifier>,
    reporter: VerdictReporter,
    permits: Semaphore,
}

impl JudgeService {
    pub fn new(
        runner: ToolchainRunner,
        mode: JudgeMode,
        collaborators: Collaborators,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            judge: Judge::new(runner, mode),
            problems: collaborators.problems,
            identity: collaborators.identity,
            reporter: VerdictReporter::new(collaborators.ledger),
            permits: Semaphore::new(max_concurrent_jobs.max(1)),
        }
    }

    pub fn languages(&self) -> Vec<Language> {
        self.judge.executor().registry().languages()
    }

    pub fn mode(&self) -> JudgeMode {
        self.judge.mode()
    }

    /// Interactive run: one job, stdout returned verbatim
    pub async fn run(&self, request: &RunRequest) -> Result<ExecutionOutcome> {
        let _permit = self.acquire().await?;
        self.judge
            .executor()
            .run_once(request.language, &request.code, &request.input)
            .await
    }

    /// Graded submission. `credential` is the caller's session token, if any.
    #[tracing::instrument(skip_all, fields(language = %request.language, problem_id = %request.problem_id))]
    pub async fn submit(&self, credential: Option<&str>, request: &SubmitRequest) -> Result<JudgeReport> {
        let credential = credential
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| EngineError::Unauthorized("missing credential".to_string()))?;
        let submitter_id = self.identity.verify(credential).await?;

        if request.code.trim().is_empty() {
            return Err(EngineError::InvalidRequest("code is required".to_string()));
        }
        if request.problem_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("problem id is required".to_string()));
        }

        let cases = self.problems.hidden_test_cases(&request.problem_id).await?;

        let report = {
            let _permit = self.acquire().await?;
            self.judge
                .judge(request.language, &request.code, &cases)
                .await?
        };

        info!(
            submitter_id = %submitter_id,
            verdict = report.verdict.label(),
            passed = report.passed,
            total = report.total,
            "Submission judged"
        );

        self.reporter
            .report(
                &submitter_id,
                &request.problem_id,
                &report.verdict,
                &request.code,
                request.language,
            )
            .await;

        Ok(report)
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        if self.permits.available_permits() == 0 {
            warn!("All job slots busy, waiting");
        }
        self.permits
            .acquire()
            .await
            .map_err(|_| EngineError::Infrastructure("job slots closed".to_string()))
    }
}
