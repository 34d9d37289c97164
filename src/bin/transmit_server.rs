//! The transmit service: resolves senders, publishes message envelopes and
//! returns fan-out target lists.

use breezechatd::bootstrap;
use breezechatd::broker::{Broker, BrokerPublisher};
use breezechatd::config::Config;
use breezechatd::db::Database;
use breezechatd::fabric::Discovery;
use breezechatd::rpc::UserClient;
use breezechatd::services::TransmitService;
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = bootstrap::load_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[database] section is required"))?;
    let db = Database::new(&db_config.path, db_config.pool_size).await?;

    let broker_config = config
        .broker
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[broker] section is required"))?;
    let broker = Arc::new(Broker::connect(&broker_config.url).await?);
    broker
        .declare(
            &broker_config.exchange,
            &broker_config.queue,
            Some(broker_config.routing_key()),
        )
        .await?;
    let publisher = BrokerPublisher::new(
        Arc::clone(&broker),
        &broker_config.exchange,
        broker_config.routing_key(),
    );
    info!(exchange = %broker_config.exchange, "broker ready");

    let manager = bootstrap::focused_manager(&config, &[&config.upstream.user_service]);
    let (coord, registry) = bootstrap::register_instance(&config).await?;
    let _discovery = {
        let online = Arc::clone(&manager);
        let offline = Arc::clone(&manager);
        Discovery::start(
            &config.upstream.user_service,
            coord,
            Arc::new(move |key, addr| online.online(key, addr)),
            Arc::new(move |key, addr| offline.offline(key, addr)),
        )
        .await?
    };

    bootstrap::spawn_metrics(&config);

    let service = Arc::new(TransmitService::new(
        db,
        Arc::new(UserClient::new(
            Arc::clone(&manager),
            &config.upstream.user_service,
        )),
        Arc::new(publisher),
    ));

    let server = tokio::spawn(breezechatd::http::serve_rpc(
        service.router(),
        config.server.port,
    ));

    tokio::select! {
        result = server => result??,
        _ = bootstrap::shutdown_signal() => {
            registry.shutdown().await;
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }
    Ok(())
}
