//! Tracing subscriber and OpenTelemetry export for the host loop.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive
//! until the process exits.
//!
//! | Source | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter; wins over [`RuntimeConfig::log_filter`]. |
//! | [`RuntimeConfig::log_format`] | `compact` console lines or newline-delimited JSON. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | When set, spans (including each scheduler `tick`) are exported over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let config = robocmd_runtime::RuntimeConfig::default();
//! let _guard = robocmd_runtime::telemetry::init_tracing(&config);
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, RuntimeConfig};

/// Install the global subscriber described by `config`.
///
/// A second call leaves the first subscriber in place and reports the
/// conflict on stderr.
pub fn init_tracing(config: &RuntimeConfig) -> TracerProviderGuard {
    let directive = filter_directive(std::env::var("RUST_LOG").ok(), config);
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("[robocmd] invalid log filter {directive:?}: {e}; using \"info\"");
        EnvFilter::new("info")
    });

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let provider = endpoint.and_then(|e| build_provider(&config.service_name, e));
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("robocmd")));

    let installed = match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(otel_layer)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(otel_layer)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    };
    if let Err(e) = installed {
        eprintln!("[robocmd] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

/// Flushes and shuts down the OTLP provider when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[robocmd] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

fn filter_directive(rust_log: Option<String>, config: &RuntimeConfig) -> String {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.log_filter.clone())
}

fn build_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[robocmd] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // The simple exporter needs no async runtime, so tracing can be set up
    // before the tick loop's runtime starts.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
