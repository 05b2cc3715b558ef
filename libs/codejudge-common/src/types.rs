use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages the engine knows how to build and run.
///
/// The set is closed; the toolchain used for each one is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    #[serde(alias = "c++", alias = "cxx")]
    Cpp,
    C,
    #[serde(alias = "rs")]
    Rust,
    #[serde(alias = "py", alias = "python3")]
    Python,
    #[serde(rename = "javascript", alias = "js", alias = "node")]
    JavaScript,
    #[serde(alias = "sh", alias = "bash")]
    Shell,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Cpp,
        Language::C,
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::Shell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Shell => "shell",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "rust" | "rs" => Ok(Language::Rust),
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "shell" | "sh" | "bash" => Ok(Language::Shell),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// One hidden test case: the stdin fed to the program and the output it must print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "output")]
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Classified result of a single job. Exactly one variant is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { stdout: String },
    CompileError { diagnostics: String },
    RuntimeError { message: String },
    TimeoutExceeded,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success { .. } => "Success",
            ExecutionOutcome::CompileError { .. } => "Compile Error",
            ExecutionOutcome::RuntimeError { .. } => "Runtime Error",
            ExecutionOutcome::TimeoutExceeded => "Time Limit Exceeded",
        }
    }

    /// Text returned by the interactive run path: raw stdout on success,
    /// otherwise the failure kind followed by its detail.
    pub fn render(&self) -> String {
        match self {
            ExecutionOutcome::Success { stdout } => stdout.clone(),
            ExecutionOutcome::CompileError { diagnostics } => {
                format!("{}:\n{}", self.label(), diagnostics)
            }
            ExecutionOutcome::RuntimeError { message } => {
                format!("{}:\n{}", self.label(), message)
            }
            ExecutionOutcome::TimeoutExceeded => {
                format!("{}:\nExecution exceeded the time limit", self.label())
            }
        }
    }
}

/// Final judgement of one submission against a problem's hidden test cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JudgeVerdict {
    Accepted,
    WrongAnswer {
        /// 1-based position of the failing test case
        failing_index: usize,
        input: String,
        expected_output: String,
        actual_output: String,
    },
    CompileError { diagnostics: String },
    RuntimeError { message: String },
    TimeoutExceeded,
}

impl JudgeVerdict {
    /// Verdict for a non-successful outcome; `None` for `Success`.
    pub fn from_failure(outcome: ExecutionOutcome) -> Option<Self> {
        match outcome {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::CompileError { diagnostics } => {
                Some(JudgeVerdict::CompileError { diagnostics })
            }
            ExecutionOutcome::RuntimeError { message } => {
                Some(JudgeVerdict::RuntimeError { message })
            }
            ExecutionOutcome::TimeoutExceeded => Some(JudgeVerdict::TimeoutExceeded),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, JudgeVerdict::Accepted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JudgeVerdict::Accepted => "Accepted",
            JudgeVerdict::WrongAnswer { .. } => "Wrong Answer",
            JudgeVerdict::CompileError { .. } => "Compile Error",
            JudgeVerdict::RuntimeError { .. } => "Runtime Error",
            JudgeVerdict::TimeoutExceeded => "Time Limit Exceeded",
        }
    }

    /// Snake-case tag, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeVerdict::Accepted => "accepted",
            JudgeVerdict::WrongAnswer { .. } => "wrong_answer",
            JudgeVerdict::CompileError { .. } => "compile_error",
            JudgeVerdict::RuntimeError { .. } => "runtime_error",
            JudgeVerdict::TimeoutExceeded => "timeout_exceeded",
        }
    }
}

/// Verdict plus how far the submission got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub verdict: JudgeVerdict,
    pub passed: usize,
    pub total: usize,
}

/// How the judge treats test cases after the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JudgeMode {
    #[default]
    FirstFailure,
    AllCases,
}

impl FromStr for JudgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-failure" | "first_failure" => Ok(JudgeMode::FirstFailure),
            "all-cases" | "all_cases" | "all" => Ok(JudgeMode::AllCases),
            other => Err(format!("unknown judge mode: {}", other)),
        }
    }
}

/// Entry appended to the submission history for every judged submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submitter_id: String,
    pub problem_id: String,
    pub language: Language,
    pub code: String,
    pub verdict: String,
    pub submitted_at: DateTime<Utc>,
}

// HTTP payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(alias = "problemNumber")]
    pub problem_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTestCase {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub verdict: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_test_case: Option<FailedTestCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub passed: usize,
    pub total: usize,
}

impl From<JudgeReport> for SubmitResponse {
    fn from(report: JudgeReport) -> Self {
        let verdict = report.verdict.label().to_string();
        let (test_case_number, failed_test_case, message) = match report.verdict {
            JudgeVerdict::Accepted => (None, None, None),
            JudgeVerdict::WrongAnswer {
                failing_index,
                input,
                expected_output,
                actual_output,
            } => (
                Some(failing_index),
                Some(FailedTestCase {
                    input,
                    expected_output,
                    actual_output,
                }),
                None,
            ),
            JudgeVerdict::CompileError { diagnostics } => (None, None, Some(diagnostics)),
            JudgeVerdict::RuntimeError { message } => (None, None, Some(message)),
            JudgeVerdict::TimeoutExceeded => (None, None, None),
        };

        SubmitResponse {
            verdict,
            test_case_number,
            failed_test_case,
            message,
            passed: report.passed,
            total: report.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("cpp".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("bash".parse::<Language>().unwrap(), Language::Shell);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_aliases() {
        let lang: Language = serde_json::from_str("\"js\"").unwrap();
        assert_eq!(lang, Language::JavaScript);
        assert_eq!(serde_json::to_string(&Language::JavaScript).unwrap(), "\"javascript\"");
    }

    #[test]
    fn test_run_request_defaults_to_cpp() {
        let req: RunRequest = serde_json::from_str(r#"{"code": "int main(){}"}"#).unwrap();
        assert_eq!(req.language, Language::Cpp);
        assert_eq!(req.input, "");
    }

    #[test]
    fn test_test_case_accepts_output_alias() {
        let tc: TestCase = serde_json::from_str(r#"{"input": "1 2", "output": "3"}"#).unwrap();
        assert_eq!(tc, TestCase::new("1 2", "3"));
    }

    #[test]
    fn test_render_prefixes_failure_kind() {
        let out = ExecutionOutcome::CompileError {
            diagnostics: "Line 3: error: expected ';'".to_string(),
        };
        assert_eq!(out.render(), "Compile Error:\nLine 3: error: expected ';'");
        assert!(ExecutionOutcome::TimeoutExceeded
            .render()
            .starts_with("Time Limit Exceeded:"));
        let ok = ExecutionOutcome::Success {
            stdout: "42\n".to_string(),
        };
        assert_eq!(ok.render(), "42\n");
    }

    #[test]
    fn test_submit_response_from_wrong_answer() {
        let report = JudgeReport {
            verdict: JudgeVerdict::WrongAnswer {
                failing_index: 1,
                input: "1 2".to_string(),
                expected_output: "3".to_string(),
                actual_output: "0".to_string(),
            },
            passed: 0,
            total: 2,
        };

        let resp = SubmitResponse::from(report);
        assert_eq!(resp.verdict, "Wrong Answer");
        assert_eq!(resp.test_case_number, Some(1));
        assert_eq!(resp.failed_test_case.unwrap().actual_output, "0");
    }

    #[test]
    fn test_from_failure_skips_success() {
        let ok = ExecutionOutcome::Success {
            stdout: "x".to_string(),
        };
        assert_eq!(JudgeVerdict::from_failure(ok), None);
        assert_eq!(
            JudgeVerdict::from_failure(ExecutionOutcome::TimeoutExceeded),
            Some(JudgeVerdict::TimeoutExceeded)
        );
    }
}
