// In-process collaborators for tests and offline CLI judging
use crate::error::{EngineError, Result};
use crate::store::{IdentityVerifier, ProblemStore, SubmissionLedger};
use async_trait::async_trait;
use codejudge_common::types::{SubmissionRecord, TestCase};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

fn poisoned() -> EngineError {
    EngineError::Collaborator("in-memory store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryProblemStore {
    problems: RwLock<HashMap<String, Vec<TestCase>>>,
}

impl InMemoryProblemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_problem(self, problem_id: &str, cases: Vec<TestCase>) -> Self {
        self.insert(problem_id, cases);
        self
    }

    pub fn insert(&self, problem_id: &str, cases: Vec<TestCase>) {
        if let Ok(mut problems) = self.problems.write() {
            problems.insert(problem_id.to_string(), cases);
        }
    }
}

#[async_trait]
impl ProblemStore for InMemoryProblemStore {
    async fn hidden_test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>> {
        self.problems
            .read()
            .map_err(|_| poisoned())?
            .get(problem_id)
            .cloned()
            .ok_or_else(|| EngineError::ProblemNotFound(problem_id.to_string()))
    }
}

/// Ledger held in memory. `set_failing(true)` makes every write fail.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    history: RwLock<Vec<SubmissionRecord>>,
    solved: RwLock<HashSet<(String, String)>>,
    failing: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn history(&self) -> Vec<SubmissionRecord> {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn solved_by(&self, submitter_id: &str) -> Vec<String> {
        let mut problems: Vec<String> = self
            .solved
            .read()
            .map(|s| {
                s.iter()
                    .filter(|(submitter, _)| submitter == submitter_id)
                    .map(|(_, problem)| problem.clone())
                    .collect()
            })
            .unwrap_or_default();
        problems.sort();
        problems
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Collaborator("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionLedger for InMemoryLedger {
    async fn record_submission(&self, record: &SubmissionRecord) -> Result<()> {
        self.check_available()?;
        self.history.write().map_err(|_| poisoned())?.push(record.clone());
        Ok(())
    }

    async fn mark_solved(&self, submitter_id: &str, problem_id: &str) -> Result<()> {
        self.check_available()?;
        self.solved
            .write()
            .map_err(|_| poisoned())?
            .insert((submitter_id.to_string(), problem_id.to_string()));
        Ok(())
    }
}

/// Fixed token -> submitter table
#[derive(Debug, Default)]
pub struct StaticIdentityVerifier {
    sessions: HashMap<String, String>,
}

impl StaticIdentityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, token: &str, submitter_id: &str) -> Self {
        self.sessions
            .insert(token.to_string(), submitter_id.to_string());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<String> {
        self.sessions
            .get(credential)
            .cloned()
            .ok_or_else(|| EngineError::Unauthorized("invalid or expired session".to_string()))
    }
}
