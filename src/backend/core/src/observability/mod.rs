//! Observability: logging, distributed tracing and metrics.
//!
//! Installed by the server binary only; the library never touches globals.

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, ObservabilityConfig};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `observability.log_level`. When an OTLP endpoint is
/// configured, spans are exported through a batch pipeline as well.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    let telemetry_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::config().with_resource(
                        opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                            "service.name",
                            service_name.to_string(),
                        )]),
                    ),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(telemetry_layer)
        .try_init()?;

    Ok(())
}

/// Flush and shut down OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Metrics recorder and descriptions.
pub mod metrics {
    use ::metrics::{describe_counter, describe_histogram, Unit};
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

    /// Append latency buckets, in seconds.
    const APPEND_BUCKETS: &[f64] = &[
        0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
    ];

    /// Install the Prometheus recorder and describe the journal metrics.
    pub fn install() -> anyhow::Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("journal_append_duration_seconds".to_string()),
                APPEND_BUCKETS,
            )?
            .install_recorder()?;

        register_metrics();
        Ok(handle)
    }

    /// Register all metric descriptions.
    pub fn register_metrics() {
        describe_counter!(
            "journal_appends_total",
            "Append attempts by backend and outcome"
        );
        describe_histogram!(
            "journal_append_duration_seconds",
            Unit::Seconds,
            "Time spent in the backend's atomic append"
        );
        describe_counter!("journal_reads_total", "Stream reads by backend");
        describe_counter!(
            "journal_events_read_total",
            "Events returned by stream reads"
        );
        describe_counter!("journal_errors_total", "Errors by canonical code");
    }
}
