//! Logging setup with optional OpenTelemetry export
//!
//! Console logs always go to stderr so that generated code printed on stdout
//! stays clean. When an OTLP endpoint is supplied, spans are also exported:
//!
//! ```text
//! simforge → OTLP (gRPC) → OTel Collector → Tempo (traces)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::SessionConfig;

/// Service name reported to the collector
pub const SERVICE_NAME: &str = "simforge";

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `session` - Session flags; selects the default log level
/// * `otlp_endpoint` - OTLP collector URL; export is skipped when `None`
///
/// `RUST_LOG` takes precedence over the level derived from `session`.
pub fn init_tracing(
    session: &SessionConfig,
    otlp_endpoint: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(session.verbosity().filter_directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::debug!(
        service = SERVICE_NAME,
        otlp = otlp_endpoint.unwrap_or("disabled"),
        "Tracing initialized"
    );

    Ok(())
}

/// Flush pending spans; a no-op when export was never enabled
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
