//! Prometheus metrics for the repair loop
//!
//! All metrics live in the default registry and are process-wide; counters
//! from concurrent sessions in one process are summed.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Generation collaborator calls, by operation (generate/fix) and outcome
    pub static ref CODE_GENERATIONS: IntCounterVec = register_int_counter_vec!(
        "simforge_code_generations_total",
        "Calls to the code generation service",
        &["operation", "outcome"]
    )
    .expect("failed to register CODE_GENERATIONS metric");

    /// Generation collaborator latency
    pub static ref GENERATION_DURATION: HistogramVec = register_histogram_vec!(
        "simforge_generation_duration_seconds",
        "Latency of code generation calls",
        &["operation"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("failed to register GENERATION_DURATION metric");

    /// Validation calls, by outcome (clean/issues/error)
    pub static ref VALIDATIONS: IntCounterVec = register_int_counter_vec!(
        "simforge_validations_total",
        "Calls to the validation engine",
        &["outcome"]
    )
    .expect("failed to register VALIDATIONS metric");

    /// Execution calls, by outcome (success/failure)
    pub static ref EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "simforge_executions_total",
        "Calls to the execution engine",
        &["outcome"]
    )
    .expect("failed to register EXECUTIONS metric");

    /// Repair attempts, by what triggered them
    pub static ref REPAIRS: IntCounterVec = register_int_counter_vec!(
        "simforge_repairs_total",
        "Repair attempts",
        &["trigger"]
    )
    .expect("failed to register REPAIRS metric");

    /// Errors seen by the learning pipeline, by category
    pub static ref ERRORS_CLASSIFIED: IntCounterVec = register_int_counter_vec!(
        "simforge_errors_classified_total",
        "Errors classified by the learning pipeline",
        &["category"]
    )
    .expect("failed to register ERRORS_CLASSIFIED metric");

    /// Prevention rules written into the prompt document
    pub static ref RULES_LEARNED: IntCounter = register_int_counter!(
        "simforge_rules_learned_total",
        "New prevention rules added to the prompt document"
    )
    .expect("failed to register RULES_LEARNED metric");

    /// Learning steps that could not be applied (persistence failures)
    pub static ref LEARNING_FAILURES: IntCounter = register_int_counter!(
        "simforge_learning_failures_total",
        "Learning steps skipped because of persistence failures"
    )
    .expect("failed to register LEARNING_FAILURES metric");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
