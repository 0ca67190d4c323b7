use anyhow::Context;
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use video_processor::{
    records_from_event, Config, DeadlineGuard, FrameExtractor, InvocationError, Orchestrator,
    S3ObjectStore,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        scratch_root = %config.processing.scratch_root.display(),
        decoder = %config.decoder.path.display(),
        "Starting video processor"
    );

    // Initialize metrics
    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let store = Arc::new(S3ObjectStore::new(&config.s3).await);
    let orchestrator = Orchestrator::new(
        store,
        FrameExtractor::from_config(&config.decoder),
        config.processing.clone(),
        config.s3.upload_concurrency,
    );
    let deadline_margin = config.deadline_margin();

    run(service_fn(|event: LambdaEvent<S3Event>| {
        handle_event(event, &orchestrator, deadline_margin)
    }))
    .await
}

/// Handle one invocation: every record of the S3 event, in order
async fn handle_event(
    event: LambdaEvent<S3Event>,
    orchestrator: &Orchestrator,
    deadline_margin: Duration,
) -> Result<String, Error> {
    let records = records_from_event(&event.payload);
    let deadline = DeadlineGuard::arm_from_epoch_millis(event.context.deadline, deadline_margin);

    info!(
        request_id = %event.context.request_id,
        record_count = records.len(),
        "Received S3 event"
    );

    let summary = orchestrator
        .handle_all(&records, deadline.token())
        .await
        .map_err(InvocationError::from)?;

    Ok(summary)
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_ansi(false))
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> anyhow::Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}
