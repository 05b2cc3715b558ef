/// Verdict Reporter - Forward Judged Submissions to the Ledger
///
/// Every submission lands in the history, whatever its verdict. Accepted ones
/// are also added to the submitter's solved set, which is a set-add and so
/// safe under repeated or concurrent Accepted verdicts.
///
/// Ledger failures are logged and swallowed: the verdict is already decided
/// and must reach the caller unchanged.

use crate::store::SubmissionLedger;
use chrono::Utc;
use codejudge_common::types::{JudgeVerdict, Language, SubmissionRecord};
use std::sync::Arc;
use tracing::{debug, error};

/// What happened to each ledger write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStatus {
    pub recorded: bool,
    /// `None` when the verdict was not Accepted and no solved-set write was attempted
    pub marked_solved: Option<bool>,
}

#[derive(Clone)]
pub struct VerdictReporter {
    ledger: Arc<dyn SubmissionLedger>,
}

impl VerdictReporter {
    pub fn new(ledger: Arc<dyn SubmissionLedger>) -> Self {
        Self { ledger }
    }

    pub async fn report(
        &self,
        submitter_id: &str,
        problem_id: &str,
        verdict: &JudgeVerdict,
        code: &str,
        language: Language,
    ) -> ReportStatus {
        let record = SubmissionRecord {
            submitter_id: submitter_id.to_string(),
            problem_id: problem_id.to_string(),
            language,
            code: code.to_string(),
            verdict: verdict.label().to_string(),
            submitted_at: Utc::now(),
        };

        let recorded = match self.ledger.record_submission(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    submitter_id = %submitter_id,
                    problem_id = %problem_id,
                    error = %e,
                    "Failed to record submission"
                );
                false
            }
        };

        let marked_solved = if verdict.is_accepted() {
            match self.ledger.mark_solved(submitter_id, problem_id).await {
                Ok(()) => Some(true),
                Err(e) => {
                    error!(
                        submitter_id = %submitter_id,
                        problem_id = %problem_id,
                        error = %e,
                        "Failed to mark problem solved"
                    );
                    Some(false)
                }
            }
        } else {
            None
        };

        debug!(recorded, ?marked_solved, verdict = verdict.label(), "Verdict reported");

        ReportStatus {
            recorded,
            marked_solved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;

    fn reporter() -> (VerdictReporter, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        (VerdictReporter::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn test_accepted_is_recorded_and_solved() {
        let (reporter, ledger) = reporter();
        let status = reporter
            .report("alice", "p1", &JudgeVerdict::Accepted, "code", Language::Cpp)
            .await;

        assert_eq!(
            status,
            ReportStatus {
                recorded: true,
                marked_solved: Some(true)
            }
        );
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.history()[0].verdict, "Accepted");
        assert_eq!(ledger.solved_by("alice"), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_but_not_solved() {
        let (reporter, ledger) = reporter();
        let status = reporter
            .report("alice", "p1", &JudgeVerdict::TimeoutExceeded, "code", Language::Python)
            .await;

        assert_eq!(status.marked_solved, None);
        assert_eq!(ledger.history()[0].verdict, "Time Limit Exceeded");
        assert!(ledger.solved_by("alice").is_empty());
    }

    #[tokio::test]
    async fn test_repeated_accepts_do_not_duplicate_solved() {
        let (reporter, ledger) = reporter();
        let reports = (0..5).map(|_| {
            reporter.report("alice", "p1", &JudgeVerdict::Accepted, "code", Language::Cpp)
        });
        futures_util::future::join_all(reports).await;

        assert_eq!(ledger.history().len(), 5);
        assert_eq!(ledger.solved_by("alice"), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_swallowed() {
        let (reporter, ledger) = reporter();
        ledger.set_failing(true);

        let status = reporter
            .report("alice", "p1", &JudgeVerdict::Accepted, "code", Language::Cpp)
            .await;
        assert_eq!(
            status,
            ReportStatus {
                recorded: false,
                marked_solved: Some(false)
            }
        );
    }
}
