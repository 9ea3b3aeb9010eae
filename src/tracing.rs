//! Structured logging with optional OpenTelemetry export
//!
//! Console output is always on (plain or JSON lines). When an OTLP endpoint
//! is configured, spans are additionally batched to the collector:
//!
//! ```text
//! cody → OTLP (gRPC) → OTel Collector → Tempo (traces)
//!                                    → Loki (logs)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,cody=debug";

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `service_name` - Name for the service in traces
/// * `otlp_endpoint` - OTLP collector URL; no export layer is installed when `None`
/// * `json` - Emit JSON log lines instead of the human-readable format
///
/// # Example
/// ```ignore
/// init_tracing("cody", None, false)?;
/// ```
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(
                    sdktrace::Config::default().with_resource(Resource::new(vec![
                        KeyValue::new("service.name", service_name.to_string()),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ])),
                )
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        otlp_endpoint = otlp_endpoint.unwrap_or("disabled"),
        json,
        "Tracing initialized"
    );

    Ok(())
}

/// Flush pending spans to the collector (no-op when export is disabled)
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Tracing shutdown complete");
}

/// Log with trace context
///
/// Automatically includes trace_id in structured log output
#[macro_export]
macro_rules! trace_log {
    ($level:ident, $trace_id:expr, $($arg:tt)*) => {
        ::tracing::$level!(trace_id = %$trace_id, $($arg)*)
    };
}
