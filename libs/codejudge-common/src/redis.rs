use crate::types::{SubmissionRecord, TestCase};
use redis::{AsyncCommands, RedisResult};

/// Redis key semantics shared by the API, the engine's collaborators and the CLI.
/// Keeps every writer and reader agreeing on the same deterministic keys.

pub const PROBLEM_PREFIX: &str = "codejudge:problem";
pub const SUBMISSIONS_KEY: &str = "codejudge:submissions";
pub const SOLVED_PREFIX: &str = "codejudge:solved";
pub const SESSION_PREFIX: &str = "codejudge:session";

/// Key holding a problem's ordered hidden test cases (JSON array)
pub fn problem_tests_key(problem_id: &str) -> String {
    format!("{}:{}:tests", PROBLEM_PREFIX, problem_id)
}

/// Per-submitter submission history list
pub fn submitter_history_key(submitter_id: &str) -> String {
    format!("{}:{}", SUBMISSIONS_KEY, submitter_id)
}

/// Set of problems a submitter has solved
pub fn solved_key(submitter_id: &str) -> String {
    format!("{}:{}", SOLVED_PREFIX, submitter_id)
}

/// Session token -> submitter id
pub fn session_key(token: &str) -> String {
    format!("{}:{}", SESSION_PREFIX, token)
}

fn encode_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "serialization error",
        e.to_string(),
    ))
}

fn decode_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "deserialization error",
        e.to_string(),
    ))
}

/// Fetch a problem's hidden test cases in stored order
pub async fn get_test_cases(
    conn: &mut redis::aio::ConnectionManager,
    problem_id: &str,
) -> RedisResult<Option<Vec<TestCase>>> {
    let payload: Option<String> = conn.get(problem_tests_key(problem_id)).await?;

    match payload {
        Some(data) => {
            let tests: Vec<TestCase> = serde_json::from_str(&data).map_err(decode_error)?;
            Ok(Some(tests))
        }
        None => Ok(None),
    }
}

/// Replace a problem's hidden test cases
pub async fn put_test_cases(
    conn: &mut redis::aio::ConnectionManager,
    problem_id: &str,
    tests: &[TestCase],
) -> RedisResult<()> {
    let payload = serde_json::to_string(tests).map_err(encode_error)?;
    conn.set(problem_tests_key(problem_id), payload).await
}

/// Append a submission to the global and per-submitter history.
/// Both pushes go out in one MULTI so the lists never disagree.
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    record: &SubmissionRecord,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(encode_error)?;

    redis::pipe()
        .atomic()
        .rpush(SUBMISSIONS_KEY, &payload)
        .ignore()
        .rpush(submitter_history_key(&record.submitter_id), &payload)
        .ignore()
        .query_async::<_, ()>(conn)
        .await
}

/// Add a problem to the submitter's solved set.
/// Returns true when the problem was not already present.
pub async fn mark_solved(
    conn: &mut redis::aio::ConnectionManager,
    submitter_id: &str,
    problem_id: &str,
) -> RedisResult<bool> {
    let added: i64 = conn.sadd(solved_key(submitter_id), problem_id).await?;
    Ok(added > 0)
}

pub async fn solved_problems(
    conn: &mut redis::aio::ConnectionManager,
    submitter_id: &str,
) -> RedisResult<Vec<String>> {
    conn.smembers(solved_key(submitter_id)).await
}

/// Resolve a session token to the submitter it belongs to
pub async fn get_session(
    conn: &mut redis::aio::ConnectionManager,
    token: &str,
) -> RedisResult<Option<String>> {
    conn.get(session_key(token)).await
}

/// Register a session token; expires after `ttl_seconds`
pub async fn put_session(
    conn: &mut redis::aio::ConnectionManager,
    token: &str,
    submitter_id: &str,
    ttl_seconds: u64,
) -> RedisResult<()> {
    redis::cmd("SET")
        .arg(session_key(token))
        .arg(submitter_id)
        .arg("EX")
        .arg(ttl_seconds)
        .query_async(conn)
        .await
}
