use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kafka_partition_checker::{
    backoff::BackoffConfig,
    checker::{scheduler, KafkaMetadataFetcher, Poller, TickOutcome, TracingSink},
    client::ClientBuilder,
    config::CheckerConfig,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_FINDINGS: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = CheckerConfig::parse();
    if let Err(e) = config.validate() {
        error!(e = %e, "Invalid configuration");
        return ExitCode::from(EXIT_ERROR);
    }

    #[cfg_attr(not(feature = "transport-tls"), allow(unused_mut))]
    let mut builder = ClientBuilder::new(config.bootstrap_servers())
        .client_id(config.client_id.as_str())
        .connect_timeout(config.request_timeout())
        .backoff_config(BackoffConfig {
            deadline: Some(config.request_timeout()),
            ..Default::default()
        });

    #[cfg(feature = "transport-tls")]
    match config.tls_config() {
        Ok(Some(tls_config)) => builder = builder.tls_config(tls_config),
        Ok(None) => {}
        Err(e) => {
            error!(e = %e, "Invalid TLS configuration");
            return ExitCode::from(EXIT_ERROR);
        }
    }

    let fetcher = KafkaMetadataFetcher::new(builder.build(), config.request_timeout());
    let poller = Poller::new(
        Arc::new(fetcher),
        config.allow_list(),
        Arc::new(TracingSink),
    );

    info!(
        bootstrap_servers = ?config.bootstrap_servers(),
        topics = ?config.allow_list(),
        "Kafka partition checker started",
    );

    if config.once {
        return match poller.tick().await {
            TickOutcome::Completed(report) if report.is_in_sync() => ExitCode::SUCCESS,
            TickOutcome::Completed(_) => ExitCode::from(EXIT_FINDINGS),
            TickOutcome::Aborted | TickOutcome::Overlapped => ExitCode::from(EXIT_ERROR),
        };
    }

    scheduler::run(&poller, config.poll_interval(), shutdown_signal()).await;

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(e = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
