//! The storage service: drains the message queue into the relational store
//! and the search index, and serves history and search queries.

use breezechatd::bootstrap;
use breezechatd::broker::Broker;
use breezechatd::config::Config;
use breezechatd::db::Database;
use breezechatd::fabric::Discovery;
use breezechatd::rpc::{FileClient, UserClient};
use breezechatd::search::{EsClient, EsMessageIndex};
use breezechatd::services::StorageService;
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

    let search_config = config
        .search
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[search] section is required"))?;
    let es = EsClient::new(&search_config.url);
    let message_index = EsMessageIndex::new(es);
    message_index.ensure().await?;
    info!("message index ready");

    let broker_config = config
        .broker
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[broker] section is required"))?;
    let broker = Broker::connect(&broker_config.url).await?;
    broker
        .declare(
            &broker_config.exchange,
            &broker_config.queue,
            Some(broker_config.routing_key()),
        )
        .await?;

    let manager = bootstrap::focused_manager(
        &config,
        &[
            &config.upstream.user_service,
            &config.upstream.file_service,
        ],
    );
    let (coord, registry) = bootstrap::register_instance(&config).await?;
    let _user_discovery = {
        let online = Arc::clone(&manager);
        let offline = Arc::clone(&manager);
        Discovery::start(
            &config.upstream.user_service,
            coord.clone(),
            Arc::new(move |key, addr| online.online(key, addr)),
            Arc::new(move |key, addr| offline.offline(key, addr)),
        )
        .await?
    };
    let _file_discovery = {
        let online = Arc::clone(&manager);
        let offline = Arc::clone(&manager);
        Discovery::start(
            &config.upstream.file_service,
            coord,
            Arc::new(move |key, addr| online.online(key, addr)),
            Arc::new(move |key, addr| offline.offline(key, addr)),
        )
        .await?
    };

    bootstrap::spawn_metrics(&config);

    let service = Arc::new(StorageService::new(
        db,
        Arc::new(message_index),
        Arc::new(UserClient::new(
            Arc::clone(&manager),
            &config.upstream.user_service,
        )),
        Arc::new(FileClient::new(
            Arc::clone(&manager),
            &config.upstream.file_service,
        )),
    ));

    // The consumer loop runs beside the query surface; the queue's pace is
    // the handler's pace.
    let consumer: Arc<dyn breezechatd::broker::BrokerConsumer> =
        Arc::clone(&service) as Arc<dyn breezechatd::broker::BrokerConsumer>;
    broker.consume(&broker_config.queue, consumer).await?;

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
