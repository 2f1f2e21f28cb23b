// Rust guideline compliant 2026-10-18

//! Fraud-screening service entry point.
//!
//! Wires the in-process bus, one ingestion task per partition, the retry
//! loop, the velocity janitor, the demo producer, and the HTTP API, then
//! runs until CTRL+C.
//!
//! # Usage
//!
//! ```text
//! # Defaults: 3 partitions, SQLite file sink, scenario producer, port 3000
//! RUST_LOG=info cargo run
//!
//! # JSON logs, in-memory sink, random traffic
//! LOG_FORMAT=json SINK_URL=memory PRODUCER_MODE=random cargo run
//!
//! # Log files elsewhere, or off
//! LOG_FILE=/var/log/fraud/combined.log FRAUD_LOG_FILE= cargo run
//! ```

mod adapters;
mod http;
mod settings;
mod telemetry;

use std::sync::Arc;

use adapters::AnySink;
use adapters::in_memory_bus::InMemoryBus;
use adapters::log_alarm::LogAlarm;
use anyhow::Context as _;
use consumer::{Consumer, ConsumerConfig, Pipeline, PipelineMetrics};
use producer::{Producer, ProducerConfig};
use retry::{RetryConfig, RetryScheduler};
use rules::{RuleEngine, VELOCITY_WINDOW, VelocityStore};
use settings::{ProducerMode, Settings};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

type ServicePipeline = Pipeline<AnySink, LogAlarm>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();
    let settings = Settings::load().context("failed to load settings")?;
    telemetry::init(&settings).context("failed to initialise logging")?;
    tracing::info!(
        brokers = %settings.brokers,
        topic = %settings.topic,
        group = %settings.group_id,
        partitions = settings.partitions,
        "main.starting"
    );

    // -- Event source: subscription failure is fatal --
    let bus = InMemoryBus::new([settings.topic.clone()], settings.partitions);
    let sources =
        bus.subscribe(&settings.topic, &settings.group_id).context("failed to subscribe")?;

    // -- Screening pipeline --
    let sink = AnySink::open(&settings.sink_url)
        .await
        .with_context(|| format!("failed to open sink {}", settings.sink_url))?;
    let metrics = Arc::new(PipelineMetrics::new().context("failed to register metrics")?);
    let velocity = Arc::new(VelocityStore::new());
    let pipeline: Arc<ServicePipeline> = Arc::new(Pipeline::new(
        RuleEngine::new(Arc::clone(&velocity)),
        sink.clone(),
        LogAlarm::new(),
        Arc::clone(&metrics),
    ));

    let retry_config = RetryConfig::builder()
        .capacity(settings.retry_capacity)
        .overflow(settings.retry_overflow)
        .build()
        .context("failed to build retry config")?;
    let retry = Arc::new(RetryScheduler::new(retry_config));

    let consumer = Arc::new(Consumer::new(
        ConsumerConfig::builder(settings.group_id.clone())
            .build()
            .context("failed to build consumer config")?,
    ));

    let shutdown = CancellationToken::new();
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    // -- Ingestion: one task per partition --
    for source in sources {
        let partition = source.index();
        let consumer = Arc::clone(&consumer);
        let pipeline = Arc::clone(&pipeline);
        let retry = Arc::clone(&retry);
        let token = shutdown.clone();
        tasks.spawn(
            async move {
                consumer.run(source, &pipeline, &retry, token).await?;
                Ok(())
            }
            .instrument(tracing::info_span!("consumer", partition)),
        );
    }

    // -- Retry loop --
    {
        let pipeline = Arc::clone(&pipeline);
        let retry = Arc::clone(&retry);
        let token = shutdown.clone();
        tasks.spawn(
            async move {
                retry
                    .run(
                        |tx| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { pipeline.process(&tx).await.map(drop) }
                        },
                        token,
                    )
                    .await;
                Ok(())
            }
            .instrument(tracing::info_span!("retry")),
        );
    }

    // -- Velocity janitor --
    {
        let token = shutdown.clone();
        tasks.spawn(
            async move {
                let mut tick = tokio::time::interval(VELOCITY_WINDOW);
                loop {
                    tokio::select! {
                        () = token.cancelled() => return Ok(()),
                        now = tick.tick() => {
                            let purged = velocity.purge_idle(now, VELOCITY_WINDOW);
                            if purged > 0 {
                                tracing::debug!(purged, "janitor.velocity.purged");
                            }
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("janitor")),
        );
    }

    // -- Demo producer --
    if settings.producer_mode != ProducerMode::Off {
        let producer = Producer::new(
            ProducerConfig::builder(10)
                .topic(settings.topic.clone())
                .build()
                .context("failed to build producer config")?,
        );
        let bus = bus.clone();
        let token = shutdown.clone();
        let mode = settings.producer_mode;
        tasks.spawn(
            async move {
                if mode == ProducerMode::Scenario {
                    producer.publish_scenario(&bus).await?;
                } else {
                    producer.run(&bus, token).await?;
                }
                Ok(())
            }
            .instrument(tracing::info_span!("producer")),
        );
    }

    // -- HTTP API --
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("failed to bind port {}", settings.port))?;
    tracing::info!(port = settings.port, "http.listening");
    {
        let app = http::router(http::AppState { sink, metrics });
        let token = shutdown.clone();
        tasks.spawn(
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(token.cancelled_owned())
                    .await
                    .context("http server failed")
            }
            .instrument(tracing::info_span!("http")),
        );
    }

    // -- Shutdown on CTRL+C --
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "main.signal.failed");
            }
            tracing::info!("main.shutdown: ctrl_c received");
            token.cancel();
        });
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.context("task panicked").and_then(|r| r);
        if let Err(e) = result {
            tracing::error!(error = %format!("{e:#}"), "main.task.failed");
            shutdown.cancel();
            failure.get_or_insert(e);
        }
    }

    bus.close();
    let stats = retry.stats();
    tracing::info!(
        scheduled = stats.scheduled,
        recovered = stats.recovered,
        abandoned = stats.abandoned,
        overflowed = stats.overflowed,
        retained = bus.retained(&settings.topic),
        "main.stopped"
    );

    failure.map_or(Ok(()), Err)
}
