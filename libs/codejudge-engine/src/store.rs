// External collaborators consumed by the submit path, and their Redis backing
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use codejudge_common::redis as keys;
use codejudge_common::types::{SubmissionRecord, TestCase};
use redis::aio::ConnectionManager;
use tracing::debug;

/// Read-only source of a problem's hidden test cases
#[async_trait]
pub trait ProblemStore: Send + Sync {
    /// Cases in their configured order. Unknown problems are `ProblemNotFound`.
    async fn hidden_test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>>;
}

/// Append-only submission history plus the solved-problems set
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    async fn record_submission(&self, record: &SubmissionRecord) -> Result<()>;

    /// Idempotent set-add of `(submitter, problem)`
    async fn mark_solved(&self, submitter_id: &str, problem_id: &str) -> Result<()>;
}

/// Resolves a caller credential to a submitter identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String>;
}

/// All three collaborators over a single Redis connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn hidden_test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>> {
        let mut conn = self.conn.clone();
        match keys::get_test_cases(&mut conn, problem_id).await? {
            Some(cases) => {
                debug!(problem_id = %problem_id, cases = cases.len(), "Loaded hidden test cases");
                Ok(cases)
            }
            None => Err(EngineError::ProblemNotFound(problem_id.to_string())),
        }
    }
}

#[async_trait]
impl SubmissionLedger for RedisStore {
    async fn record_submission(&self, record: &SubmissionRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        keys::push_submission(&mut conn, record).await?;
        Ok(())
    }

    async fn mark_solved(&self, submitter_id: &str, problem_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let newly_solved = keys::mark_solved(&mut conn, submitter_id, problem_id).await?;
        debug!(
            submitter_id = %submitter_id,
            problem_id = %problem_id,
            newly_solved,
            "Marked problem solved"
        );
        Ok(())
    }
}

#[async_trait]
impl IdentityVerifier for RedisStore {
    async fn verify(&self, credential: &str) -> Result<String> {
        if credential.trim().is_empty() {
            return Err(EngineError::Unauthorized("missing credential".to_string()));
        }

        let mut conn = self.conn.clone();
        keys::get_session(&mut conn, credential)
            .await?
            .ok_or_else(|| EngineError::Unauthorized("invalid or expired session".to_string()))
    }
}
