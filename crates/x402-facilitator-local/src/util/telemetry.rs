//! OpenTelemetry tracing and metrics setup.
//!
//! OTLP export is switched on by the standard `OTEL_EXPORTER_OTLP_*` variables. Without
//! them only a local `fmt` subscriber is installed. Both honor `RUST_LOG`, defaulting to
//! `info`.

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use std::env;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnResponse, MakeSpan, TraceLayer};
use tracing::Level;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry protocol to use for OTLP export
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    HTTP,
    GRPC,
}

impl TelemetryProtocol {
    /// `None` unless any `OTEL_EXPORTER_OTLP_*` variable is set.
    fn from_env() -> Option<Self> {
        let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
        if !is_enabled {
            return None;
        }
        let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => TelemetryProtocol::GRPC,
            _ => TelemetryProtocol::HTTP,
        };
        Some(protocol)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Builder and shutdown guard for the global tracing subscriber.
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            tracer_provider: None,
            meter_provider: None,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    fn resource(&self) -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(self.name)
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, self.version),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_meter_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkMeterProvider, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter.with_http().build()?,
            TelemetryProtocol::GRPC => exporter.with_tonic().build()?,
        };
        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(meter_provider.clone());
        Ok(meter_provider)
    }

    fn init_tracer_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter.with_http().build()?,
            TelemetryProtocol::GRPC => exporter.with_tonic().build()?,
        };
        Ok(SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build())
    }

    /// Installs the global subscriber. Falls back to local logging when the OTLP exporters
    /// can not be built.
    pub fn register(mut self) -> Self {
        let providers = TelemetryProtocol::from_env().map(|protocol| {
            let tracer_provider = self.init_tracer_provider(protocol)?;
            let meter_provider = self.init_meter_provider(protocol)?;
            Ok::<_, opentelemetry_otlp::ExporterBuildError>((protocol, tracer_provider, meter_provider))
        });
        match providers {
            Some(Ok((protocol, tracer_provider, meter_provider))) => {
                let tracer = tracer_provider.tracer("tracing-otel-subscriber");
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(tracing_subscriber::fmt::layer())
                    .with(MetricsLayer::new(meter_provider.clone()))
                    .with(OpenTelemetryLayer::new(tracer))
                    .init();
                tracing::info!(
                    "OpenTelemetry tracing and metrics exporter is enabled via {:?}",
                    protocol
                );
                self.tracer_provider = Some(tracer_provider);
                self.meter_provider = Some(meter_provider);
            }
            Some(Err(error)) => {
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(tracing_subscriber::fmt::layer())
                    .init();
                tracing::warn!(error = %error, "OpenTelemetry exporter unavailable, logging locally");
            }
            None => {
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(tracing_subscriber::fmt::layer())
                    .init();
                tracing::info!("OpenTelemetry is not enabled");
            }
        }
        self
    }

    /// HTTP request spans for the axum router.
    pub fn http_tracing(&self) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan> {
        TraceLayer::new_for_http()
            .make_span_with(RequestSpan)
            .on_response(DefaultOnResponse::new().level(Level::INFO))
    }
}

/// Names request spans after method and path.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> tracing::Span {
        tracing::info_span!(
            "http_request",
            otel.name = %format!("{} {}", request.method(), request.uri().path()),
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref()
            && let Err(err) = tracer_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
        if let Some(meter_provider) = self.meter_provider.as_ref()
            && let Err(err) = meter_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}
