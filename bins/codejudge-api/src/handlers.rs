// HTTP route handlers for the CodeJudge API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use codejudge_common::types::{ErrorResponse, RunRequest, RunResponse, SubmitRequest, SubmitResponse};
use codejudge_engine::EngineError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

const SESSION_COOKIE: &str = "token";

/// Engine error turned into an HTTP response
struct ApiError {
    path: &'static str,
    error: EngineError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            EngineError::InvalidRequest(_) | EngineError::UnsupportedLanguage(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::ProblemNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Infrastructure(_) | EngineError::Collaborator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        metrics::REQUEST_ERRORS
            .with_label_values(&[self.path, status.as_str()])
            .inc();

        // Internal details stay in the logs
        let message = if self.error.is_internal() {
            error!(path = self.path, error = %self.error, "Request failed");
            "internal error".to_string()
        } else {
            warn!(path = self.path, error = %self.error, "Request rejected");
            self.error.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Body that could not be read or did not deserialize into the request type
fn rejected(path: &'static str, rejection: JsonRejection) -> Response {
    ApiError {
        path,
        error: EngineError::InvalidRequest(rejection.body_text()),
    }
    .into_response()
}

/// Session token from `Authorization: Bearer <token>` or the `token` cookie
pub fn credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

/// POST /run - Execute code against caller-supplied input
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected("run", rejection),
    };
    let started = Instant::now();
    let timer = metrics::JOB_SECONDS.with_label_values(&["run"]);

    match state.service.run(&payload).await {
        Ok(outcome) => {
            timer.observe(started.elapsed().as_secs_f64());
            metrics::RUN_OUTCOMES
                .with_label_values(&[outcome.label()])
                .inc();
            info!(
                language = %payload.language,
                outcome = outcome.label(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Run completed"
            );

            (
                StatusCode::OK,
                Json(RunResponse {
                    output: outcome.render(),
                }),
            )
                .into_response()
        }
        Err(e) => ApiError {
            path: "run",
            error: e,
        }
        .into_response(),
    }
}

/// POST /submit - Judge code against a problem's hidden test cases
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected("submit", rejection),
    };
    let started = Instant::now();
    let token = credential(&headers);

    match state.service.submit(token.as_deref(), &payload).await {
        Ok(report) => {
            metrics::JOB_SECONDS
                .with_label_values(&["submit"])
                .observe(started.elapsed().as_secs_f64());
            metrics::VERDICTS
                .with_label_values(&[report.verdict.kind()])
                .inc();

            (StatusCode::OK, Json(SubmitResponse::from(report))).into_response()
        }
        Err(e) => ApiError {
            path: "submit",
            error: e,
        }
        .into_response(),
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
