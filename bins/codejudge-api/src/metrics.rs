// Prometheus metrics for the run and submit paths
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref RUN_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "codejudge_run_requests_total",
        "Run requests by classified outcome",
        &["outcome"]
    )
    .expect("metric can be registered");
    pub static ref VERDICTS: IntCounterVec = register_int_counter_vec!(
        "codejudge_verdicts_total",
        "Submission verdicts by kind",
        &["verdict"]
    )
    .expect("metric can be registered");
    pub static ref REQUEST_ERRORS: IntCounterVec = register_int_counter_vec!(
        "codejudge_request_errors_total",
        "Requests that ended in an error response, by status code",
        &["path", "status"]
    )
    .expect("metric can be registered");
    pub static ref JOB_SECONDS: HistogramVec = register_histogram_vec!(
        "codejudge_job_duration_seconds",
        "Wall-clock time of run and submit requests",
        &["path"]
    )
    .expect("metric can be registered");
}

/// Render the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
