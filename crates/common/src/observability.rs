use std::borrow::Cow;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Flushes the global tracer provider when dropped. Only handed out when OTLP
/// export is actually active.
pub struct OtelGuard {
    _private: (),
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

struct ErrorCounterLayer;

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

/// Build the dashboard's `tracing` dispatcher:
/// - JSON logs to stdout
/// - `RUST_LOG` wins over `default_level`
/// - ERROR events counted in `tracing_error_events`
/// - OTLP span export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set
pub fn build_dispatch(
    service_name: impl Into<Cow<'static, str>>,
    default_level: &str,
) -> (tracing::Dispatch, Option<OtelGuard>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .json();

    let tracer = std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .and_then(|endpoint| otlp_tracer(service_name.into(), endpoint));
    let guard = tracer.as_ref().map(|_| OtelGuard { _private: () });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorCounterLayer)
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)));

    (tracing::Dispatch::new(subscriber), guard)
}

/// Install the dispatcher globally. The returned guard must outlive the server.
pub fn init(service_name: &'static str, default_level: &str) -> anyhow::Result<Option<OtelGuard>> {
    let (dispatch, guard) = build_dispatch(service_name, default_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;
    Ok(guard)
}

// Exporter build failures fall back to logs only.
fn otlp_tracer(
    service_name: Cow<'static, str>,
    endpoint: String,
) -> Option<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.into_owned())]);

    // Batch export needs a running Tokio runtime; the dashboard binary is `#[tokio::main]`.
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("affiliate_dashboard");
    let _ = opentelemetry::global::set_tracer_provider(provider);
    Some(tracer)
}
