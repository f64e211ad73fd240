mod config;

use common::domain::{
    CompanyDirectory, DeviceEventRepository, DeviceRepository, IdentityDirectory,
    MessagingGateway,
};
use common::nats::{
    NatsClient, NatsConsumer, NatsConsumerConfig, NatsMessagingGateway, StreamSettings,
};
use common::postgres::{
    PostgresClient, PostgresDeviceEventRepository, PostgresDeviceRepository, PostgresDirectory,
};
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use iot_api::{
    create_notification_processor, NotificationDispatcher, NotificationWorker, RetentionSweeper,
};
use iot_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const SERVICE_NAME: &str = "iot-all-in-one";

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: SERVICE_NAME.to_string(),
        log_level: config.log_level.clone(),
        json: config.log_json,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!("Starting {} service", SERVICE_NAME);
    debug!("Configuration: {:?}", config);

    let (repositories, nats_client) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let gateway: Arc<dyn MessagingGateway> = Arc::new(NatsMessagingGateway::new(
        nats_client.create_publisher_client(),
        config.notification_stream.clone(),
    ));

    let dispatcher = Arc::new(NotificationDispatcher::new(
        gateway,
        repositories.company_directory.clone(),
        repositories.identity_directory.clone(),
        repositories.device.clone(),
        repositories.device_event.clone(),
    ));
    let sweeper = match RetentionSweeper::with_retention_days(
        repositories.device_event.clone(),
        config.event_retention_days,
    ) {
        Ok(sweeper) => Arc::new(sweeper),
        Err(e) => {
            error!("Failed to initialize retention sweeper: {}", e);
            std::process::exit(1);
        }
    };

    let worker = Arc::new(NotificationWorker::new(dispatcher));
    let consumer = match NatsConsumer::new(
        nats_client.jetstream(),
        NatsConsumerConfig {
            stream_name: config.notification_stream.clone(),
            consumer_name: config.notification_consumer_name.clone(),
            subject_filter: format!("{}.send", config.notification_stream),
            batch_size: config.nats_batch_size,
            max_wait: Duration::from_secs(config.nats_batch_wait_secs),
            max_deliver: config.notification_max_deliver,
            retry_delay: Duration::from_secs(config.notification_retry_delay_secs),
        },
        create_notification_processor(worker),
    )
    .await
    {
        Ok(consumer) => consumer,
        Err(e) => {
            error!("Failed to initialize notification consumer: {:#}", e);
            std::process::exit(1);
        }
    };

    let runner = Runner::new()
        .with_app_process("notification_worker", move |ctx| async move {
            consumer.run(ctx).await
        })
        .with_periodic_job(
            "event_retention",
            config.retention_sweep_interval(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    sweeper.sweep().await?;
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
        .with_closer(move || async move {
            info!("Flushing NATS connection...");
            nats_client.flush().await?;
            info!("Cleanup complete");
            Ok::<(), anyhow::Error>(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if let Err(e) = runner.run().await {
        error!("Application exiting with error: {:#}", e);
        std::process::exit(1);
    }
}

struct Repositories {
    device: Arc<dyn DeviceRepository>,
    device_event: Arc<dyn DeviceEventRepository>,
    company_directory: Arc<dyn CompanyDirectory>,
    identity_directory: Arc<dyn IdentityDirectory>,
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Repositories, NatsClient)> {
    info!("Initializing PostgreSQL...");
    let postgres_config = config.postgres();
    let postgres_client = PostgresClient::from_config(&postgres_config)?;
    tokio::time::timeout(config.startup_timeout(), postgres_client.ping())
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to PostgreSQL"))??;
    if postgres_config.apply_schema {
        postgres_client.apply_schema().await?;
    }

    let directory = Arc::new(PostgresDirectory::new(postgres_client.clone()));
    let repositories = Repositories {
        device: Arc::new(PostgresDeviceRepository::new(postgres_client.clone())),
        device_event: Arc::new(PostgresDeviceEventRepository::new(postgres_client)),
        company_directory: directory.clone(),
        identity_directory: directory,
    };

    info!("Initializing NATS...");
    let nats_client = NatsClient::connect(&config.nats_url, config.startup_timeout()).await?;
    nats_client
        .ensure_stream(&StreamSettings::new(
            config.notification_stream.clone(),
            "IoT device event notifications",
        ))
        .await?;

    Ok((repositories, nats_client))
}
