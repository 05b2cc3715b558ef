/// Judge Orchestrator - Submission vs. Hidden Test Cases
///
/// **State machine:**
/// `Pending -> Running(i) -> {Accepted, WrongAnswer, CompileError, RuntimeError, TimeoutExceeded}`
///
/// **Rules:**
/// - The source is built once; a build failure is the verdict and no case runs
/// - Cases run strictly in the configured order
/// - A non-Success outcome becomes the verdict as-is
/// - A normalized output mismatch is WrongAnswer with the 1-based index
/// - Zero cases is Accepted
///
/// In `FirstFailure` mode the loop stops at the first failing case. In
/// `AllCases` mode every case runs and the first failure is still the verdict.

use crate::error::Result;
use crate::normalizer;
use crate::runner::{Executor, Preparation};
use codejudge_common::types::{
    ExecutionOutcome, JudgeMode, JudgeReport, JudgeVerdict, Language, TestCase,
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Judge<E> {
    executor: E,
    mode: JudgeMode,
}

impl<E: Executor> Judge<E> {
    pub fn new(executor: E, mode: JudgeMode) -> Self {
        Self { executor, mode }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn mode(&self) -> JudgeMode {
        self.mode
    }

    #[tracing::instrument(skip_all, fields(language = %language, cases = cases.len()))]
    pub async fn judge(&self, language: Language, source: &str, cases: &[TestCase]) -> Result<JudgeReport> {
        let total = cases.len();

        let program = match self.executor.prepare(language, source).await? {
            Preparation::Ready(program) => program,
            Preparation::Rejected(outcome) => {
                let verdict = JudgeVerdict::from_failure(outcome).unwrap_or_else(|| {
                    JudgeVerdict::CompileError {
                        diagnostics: String::new(),
                    }
                });
                info!(verdict = verdict.label(), "Build rejected, no test cases run");
                return Ok(JudgeReport {
                    verdict,
                    passed: 0,
                    total,
                });
            }
        };

        let mut passed = 0;
        let mut first_failure: Option<JudgeVerdict> = None;

        for (index, case) in cases.iter().enumerate() {
            let outcome = self.executor.execute(&program, &case.input).await?;

            match evaluate_case(index, case, outcome) {
                None => {
                    passed += 1;
                    debug!(case = index + 1, "Test case passed");
                }
                Some(failure) => {
                    debug!(case = index + 1, verdict = failure.label(), "Test case failed");
                    first_failure.get_or_insert(failure);
                    if self.mode == JudgeMode::FirstFailure {
                        break;
                    }
                }
            }
        }

        let verdict = first_failure.unwrap_or(JudgeVerdict::Accepted);
        info!(verdict = verdict.label(), passed, total, "Judging complete");

        Ok(JudgeReport {
            verdict,
            passed,
            total,
        })
    }
}

/// `None` when the case passed, otherwise the verdict it earns
fn evaluate_case(index: usize, case: &TestCase, outcome: ExecutionOutcome) -> Option<JudgeVerdict> {
    match outcome {
        ExecutionOutcome::Success { stdout } => {
            if normalizer::outputs_match(&case.expected_output, &stdout) {
                None
            } else {
                Some(JudgeVerdict::WrongAnswer {
                    failing_index: index + 1,
                    input: case.input.clone(),
                    expected_output: case.expected_output.clone(),
                    actual_output: stdout,
                })
            }
        }
        other => JudgeVerdict::from_failure(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor whose behaviour is scripted per stdin
    #[derive(Debug, Default)]
    struct ScriptedExecutor {
        reject_with: Option<ExecutionOutcome>,
        /// stdin -> outcome; unknown stdin prints "0"
        responses: HashMap<String, ExecutionOutcome>,
        fail_on: Option<String>,
        prepares: AtomicUsize,
        executed: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn always_prints(stdout: &str) -> Self {
            Self::default().default_stdout(stdout)
        }

        fn default_stdout(mut self, stdout: &str) -> Self {
            self.responses
                .insert(String::new(), ExecutionOutcome::Success { stdout: stdout.to_string() });
            self
        }

        fn respond(mut self, stdin: &str, outcome: ExecutionOutcome) -> Self {
            self.responses.insert(stdin.to_string(), outcome);
            self
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        type Program = ();

        async fn prepare(&self, _language: Language, _source: &str) -> Result<Preparation<()>> {
            self.prepares.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.reject_with {
                Some(outcome) => Preparation::Rejected(outcome.clone()),
                None => Preparation::Ready(()),
            })
        }

        async fn execute(&self, _program: &(), stdin: &str) -> Result<ExecutionOutcome> {
            self.executed.lock().unwrap().push(stdin.to_string());
            if self.fail_on.as_deref() == Some(stdin) {
                return Err(EngineError::Infrastructure("spawn failed".to_string()));
            }
            Ok(self
                .responses
                .get(stdin)
                .or_else(|| self.responses.get(""))
                .cloned()
                .unwrap_or(ExecutionOutcome::Success {
                    stdout: "0".to_string(),
                }))
        }
    }

    fn ok(stdout: &str) -> ExecutionOutcome {
        ExecutionOutcome::Success {
            stdout: stdout.to_string(),
        }
    }

    fn sum_cases() -> Vec<TestCase> {
        vec![TestCase::new("1 2", "3"), TestCase::new("5 6", "11")]
    }

    #[tokio::test]
    async fn test_no_cases_is_accepted() {
        let judge = Judge::new(ScriptedExecutor::always_prints("anything"), JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &[]).await.unwrap();

        assert_eq!(
            report,
            JudgeReport {
                verdict: JudgeVerdict::Accepted,
                passed: 0,
                total: 0
            }
        );
        assert!(judge.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_answer_on_first_case() {
        let judge = Judge::new(ScriptedExecutor::always_prints("0"), JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();

        assert_eq!(
            report.verdict,
            JudgeVerdict::WrongAnswer {
                failing_index: 1,
                input: "1 2".to_string(),
                expected_output: "3".to_string(),
                actual_output: "0".to_string(),
            }
        );
        assert_eq!(report.passed, 0);
        assert_eq!(judge.executor().executed(), vec!["1 2"]);
    }

    #[tokio::test]
    async fn test_first_failing_case_wins() {
        // Fails A, would pass B
        let executor = ScriptedExecutor::default()
            .respond("a", ok("wrong"))
            .respond("b", ok("B"));
        let cases = vec![TestCase::new("a", "A"), TestCase::new("b", "B")];

        let judge = Judge::new(executor, JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &cases).await.unwrap();

        match report.verdict {
            JudgeVerdict::WrongAnswer {
                failing_index,
                input,
                ..
            } => {
                assert_eq!(failing_index, 1);
                assert_eq!(input, "a");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cases_run_in_order_until_failure() {
        let executor = ScriptedExecutor::default()
            .respond("1 2", ok("3"))
            .respond("5 6", ok("12"));
        let cases = vec![
            TestCase::new("1 2", "3"),
            TestCase::new("5 6", "11"),
            TestCase::new("7 8", "15"),
        ];

        let judge = Judge::new(executor, JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &cases).await.unwrap();

        assert!(matches!(
            report.verdict,
            JudgeVerdict::WrongAnswer { failing_index: 2, .. }
        ));
        assert_eq!(report.passed, 1);
        assert_eq!(judge.executor().executed(), vec!["1 2", "5 6"]);
    }

    #[tokio::test]
    async fn test_compile_error_short_circuits() {
        let executor = ScriptedExecutor {
            reject_with: Some(ExecutionOutcome::CompileError {
                diagnostics: "Line 1: error: expected ';'".to_string(),
            }),
            ..Default::default()
        };

        let judge = Judge::new(executor, JudgeMode::AllCases);
        let report = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();

        assert_eq!(
            report.verdict,
            JudgeVerdict::CompileError {
                diagnostics: "Line 1: error: expected ';'".to_string()
            }
        );
        assert_eq!((report.passed, report.total), (0, 2));
        assert_eq!(judge.executor().prepares.load(Ordering::SeqCst), 1);
        assert!(judge.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_error_propagates() {
        let executor = ScriptedExecutor::default().respond(
            "1 2",
            ExecutionOutcome::RuntimeError {
                message: "Process terminated by signal 11 (segmentation fault)".to_string(),
            },
        );

        let judge = Judge::new(executor, JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();

        assert!(matches!(report.verdict, JudgeVerdict::RuntimeError { .. }));
        assert_eq!(judge.executor().executed().len(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_tolerance() {
        let judge = Judge::new(ScriptedExecutor::always_prints("3 "), JudgeMode::FirstFailure);
        let cases = vec![TestCase::new("1 2", "3\n")];

        let report = judge.judge(Language::Cpp, "src", &cases).await.unwrap();
        assert_eq!(report.verdict, JudgeVerdict::Accepted);
        assert_eq!(report.passed, 1);
    }

    #[tokio::test]
    async fn test_actual_output_is_not_normalized() {
        let judge = Judge::new(ScriptedExecutor::always_prints("  0 \n"), JudgeMode::FirstFailure);
        let report = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();

        match report.verdict {
            JudgeVerdict::WrongAnswer { actual_output, .. } => assert_eq!(actual_output, "  0 \n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_cases_mode_counts() {
        let executor = ScriptedExecutor::default()
            .respond("a", ok("A"))
            .respond("b", ok("nope"))
            .respond("c", ok("C"))
            .respond("d", ExecutionOutcome::TimeoutExceeded);
        let cases = vec![
            TestCase::new("a", "A"),
            TestCase::new("b", "B"),
            TestCase::new("c", "C"),
            TestCase::new("d", "D"),
        ];

        let judge = Judge::new(executor, JudgeMode::AllCases);
        let report = judge.judge(Language::Cpp, "src", &cases).await.unwrap();

        assert!(matches!(
            report.verdict,
            JudgeVerdict::WrongAnswer { failing_index: 2, .. }
        ));
        assert_eq!((report.passed, report.total), (2, 4));
        assert_eq!(judge.executor().executed(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_infrastructure_error_is_not_a_verdict() {
        let executor = ScriptedExecutor {
            fail_on: Some("5 6".to_string()),
            ..Default::default()
        }
        .respond("1 2", ok("3"));

        let judge = Judge::new(executor, JudgeMode::FirstFailure);
        let err = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn test_rejudging_is_deterministic() {
        let judge = Judge::new(ScriptedExecutor::always_prints("0"), JudgeMode::FirstFailure);
        let first = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();
        let second = judge.judge(Language::Cpp, "src", &sum_cases()).await.unwrap();
        assert_eq!(first, second);
    }

    mod with_processes {
        use super::*;
        use crate::runner::{RunnerLimits, ToolchainRunner};
        use crate::toolchain::ToolchainRegistry;
        use crate::workspace::WorkspaceManager;
        use std::path::Path;
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        fn shell_judge(dir: &Path, timeout_ms: u64) -> Judge<ToolchainRunner> {
            let workspace = WorkspaceManager::new(dir);
            workspace.init().unwrap();
            let runner = ToolchainRunner::new(
                Arc::new(ToolchainRegistry::builtin()),
                workspace,
                RunnerLimits {
                    timeout: Duration::from_millis(timeout_ms),
                    compile_timeout: Duration::from_secs(10),
                    max_output_bytes: 1024 * 1024,
                },
            );
            Judge::new(runner, JudgeMode::FirstFailure)
        }

        fn workspace_is_empty(dir: &Path) -> bool {
            ["codes", "inputs", "outputs", "jobs"]
                .iter()
                .all(|sub| std::fs::read_dir(dir.join(sub)).unwrap().next().is_none())
        }

        #[tokio::test]
        async fn test_shell_solution_accepted() {
            let dir = tempfile::tempdir().unwrap();
            let judge = shell_judge(dir.path(), 2000);

            let report = judge
                .judge(Language::Shell, "read a b; echo $((a + b))", &sum_cases())
                .await
                .unwrap();

            assert_eq!(report.verdict, JudgeVerdict::Accepted);
            assert_eq!(report.passed, 2);
            assert!(workspace_is_empty(dir.path()));
        }

        #[tokio::test]
        async fn test_infinite_loop_is_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let judge = shell_judge(dir.path(), 500);

            let started = Instant::now();
            let report = judge
                .judge(Language::Shell, "sleep 60 & while :; do :; done", &sum_cases())
                .await
                .unwrap();

            assert_eq!(report.verdict, JudgeVerdict::TimeoutExceeded);
            assert!(started.elapsed() < Duration::from_millis(500) + Duration::from_secs(3));
            assert!(workspace_is_empty(dir.path()));
        }

        #[tokio::test]
        async fn test_syntax_error_never_runs_cases() {
            let dir = tempfile::tempdir().unwrap();
            let judge = shell_judge(dir.path(), 2000);

            let report = judge
                .judge(Language::Shell, "if then fi (", &sum_cases())
                .await
                .unwrap();

            assert!(matches!(report.verdict, JudgeVerdict::CompileError { .. }));
            assert_eq!(report.passed, 0);
            assert!(workspace_is_empty(dir.path()));
        }
    }
}
