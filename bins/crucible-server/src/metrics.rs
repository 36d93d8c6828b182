// Prometheus metrics for the compile pipeline

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use crucible_common::types::RunReport;

lazy_static! {
    pub static ref JOBS_SUBMITTED: IntCounter = register_int_counter!(
        "crucible_jobs_submitted_total",
        "Compile requests accepted by the HTTP surface"
    )
    .unwrap();
    pub static ref JOBS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "crucible_jobs_in_flight",
        "Jobs currently between submission and report"
    )
    .unwrap();
    pub static ref JOB_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "crucible_job_outcomes_total",
        "Terminal job outcomes by kind",
        &["outcome"]
    )
    .unwrap();
}

pub fn record_outcome(report: &RunReport) {
    let outcome = match report.error {
        None => "completed".to_string(),
        Some(kind) => kind.to_string(),
    };
    JOB_OUTCOMES.with_label_values(&[outcome.as_str()]).inc();
}

pub fn render() -> prometheus::Result<String> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
