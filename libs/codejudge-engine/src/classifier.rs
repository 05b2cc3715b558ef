/// Outcome Classifier - Raw Process Results to Outcomes
///
/// Pure mapping from `StageOutput` onto the closed set of `ExecutionOutcome`s.
/// Knows nothing about processes, files or test cases.
///
/// **Priority:**
/// 1. Compile stage failure (nonzero exit, timeout, or error marker in stderr)
/// 2. Execution timeout
/// 3. Nonzero exit or fatal signal, whatever the stderr says
/// 4. Clean exit with no stdout
/// 5. Clean exit with stdout

use crate::process::{ExitState, StageOutput};
use crate::toolchain::CompileStage;
use codejudge_common::types::ExecutionOutcome;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

pub const NO_OUTPUT_MESSAGE: &str = "no output produced";

lazy_static! {
    /// `<path>:<line>:<col>: <message>` as printed by gcc, clang and node
    static ref LOCATED: Regex =
        Regex::new(r"^(?P<path>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+): (?P<msg>.*)$")
            .expect("valid regex");
    /// `<path>: line <line>: <message>` (bash) and `<path>: <line>: <message>` (dash)
    static ref SHELL_LOCATED: Regex =
        Regex::new(r"^(?P<path>[^:\s][^:]*): (?:line )?(?P<line>\d+): (?P<msg>.*)$")
            .expect("valid regex");
    /// `File "<path>", line <line>` in Python tracebacks
    static ref PY_LOCATED: Regex =
        Regex::new(r#"File "(?P<path>[^"]+)", line (?P<line>\d+)"#).expect("valid regex");
}

/// `Some(CompileError)` when the compile stage rejected the source
pub fn classify_compile(
    output: &StageOutput,
    stage: &CompileStage,
    source_path: &Path,
) -> Option<ExecutionOutcome> {
    if output.timed_out() {
        return Some(ExecutionOutcome::CompileError {
            diagnostics: format!(
                "Compilation timed out after {} ms",
                output.elapsed.as_millis()
            ),
        });
    }

    if output.succeeded() && !contains_marker(&output.stderr, &stage.error_markers) {
        return None;
    }

    // Some toolchains report on stdout
    let raw = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };

    let diagnostics = format_diagnostics(raw, source_path);
    Some(ExecutionOutcome::CompileError {
        diagnostics: if diagnostics.is_empty() {
            exit_description(output.exit)
        } else {
            diagnostics
        },
    })
}

/// Classify the execution stage
pub fn classify_run(output: &StageOutput, source_path: &Path) -> ExecutionOutcome {
    match output.exit {
        ExitState::TimedOut => ExecutionOutcome::TimeoutExceeded,
        ExitState::Exited(0) => {
            if output.stdout.is_empty() {
                ExecutionOutcome::RuntimeError {
                    message: NO_OUTPUT_MESSAGE.to_string(),
                }
            } else {
                ExecutionOutcome::Success {
                    stdout: output.stdout.clone(),
                }
            }
        }
        exit => ExecutionOutcome::RuntimeError {
            message: runtime_message(&output.stderr, exit, source_path),
        },
    }
}

fn contains_marker(stream: &str, markers: &[String]) -> bool {
    !stream.trim().is_empty() && markers.iter().any(|m| stream.contains(m.as_str()))
}

fn runtime_message(stderr: &str, exit: ExitState, source_path: &Path) -> String {
    let text = strip_source_path(stderr.trim_end(), source_path);
    let detail = exit_description(exit);

    if text.is_empty() {
        detail
    } else if matches!(exit, ExitState::Signaled(_)) {
        format!("{}\n[{}]", text, detail)
    } else {
        text
    }
}

fn exit_description(exit: ExitState) -> String {
    match exit {
        ExitState::Exited(code) => format!("Process exited with code {}", code),
        ExitState::Signaled(signal) => match signal_reason(signal) {
            Some(reason) => format!("Process terminated by signal {} ({})", signal, reason),
            None => format!("Process terminated by signal {}", signal),
        },
        ExitState::TimedOut => "Process exceeded the time limit".to_string(),
    }
}

fn signal_reason(signal: i32) -> Option<&'static str> {
    match signal {
        6 => Some("aborted"),
        8 => Some("floating point exception"),
        9 => Some("killed"),
        11 => Some("segmentation fault"),
        _ => None,
    }
}

/// Rewrite compiler locations into `Line <n>: <message>` and drop workspace paths
pub fn format_diagnostics(raw: &str, source_path: &Path) -> String {
    raw.lines()
        .map(|line| format_line(line, source_path))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn format_line(line: &str, source_path: &Path) -> String {
    if let Some(caps) = LOCATED.captures(line) {
        if is_source(&caps["path"], source_path) {
            return format!("Line {}: {}", &caps["line"], &caps["msg"]);
        }
    }
    if let Some(caps) = SHELL_LOCATED.captures(line) {
        if is_source(&caps["path"], source_path) {
            return format!("Line {}: {}", &caps["line"], &caps["msg"]);
        }
    }

    let line = PY_LOCATED.replace_all(line, |caps: &regex::Captures| {
        if is_source(&caps["path"], source_path) {
            format!("Line {}", &caps["line"])
        } else {
            caps[0].to_string()
        }
    });

    strip_source_path(&line, source_path)
}

fn is_source(candidate: &str, source_path: &Path) -> bool {
    let candidate = Path::new(candidate);
    candidate == source_path
        || (candidate.file_name().is_some() && candidate.file_name() == source_path.file_name())
}

/// Replace the job's source path (full or bare file name) with a neutral name
fn strip_source_path(text: &str, source_path: &Path) -> String {
    let neutral = match source_path.extension() {
        Some(ext) => format!("solution.{}", ext.to_string_lossy()),
        None => "solution".to_string(),
    };

    let mut text = text.replace(source_path.to_string_lossy().as_ref(), &neutral);
    if let Some(name) = source_path.file_name() {
        text = text.replace(name.to_string_lossy().as_ref(), &neutral);
    }
    text
}
