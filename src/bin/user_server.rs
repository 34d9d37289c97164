//! The user service: identity lifecycle, login sessions, verification
//! codes and profile storage.

use breezechatd::bootstrap;
use breezechatd::cache::{SessionStore, StatusStore, VerifyCodeStore};
use breezechatd::config::Config;
use breezechatd::db::Database;
use breezechatd::fabric::Discovery;
use breezechatd::ports::{LlmClassifier, SendEmailCommand};
use breezechatd::rpc::FileClient;
use breezechatd::search::{EsClient, EsUserIndex};
use breezechatd::services::UserService;
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
    let user_index = EsUserIndex::new(es);
    // An index we cannot create is a deployment problem, not a runtime one.
    user_index.ensure().await?;
    info!("user index ready");

    let email_config = config
        .email
        .clone()
        .ok_or_else(|| anyhow::anyhow!("[email] section is required"))?;
    let classifier_config = config
        .classifier
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[classifier] section is required"))?;

    let manager = bootstrap::focused_manager(&config, &[&config.upstream.file_service]);
    let (coord, registry) = bootstrap::register_instance(&config).await?;
    let _discovery = {
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

    let verify_codes = Arc::new(VerifyCodeStore::new());
    {
        // Lazily-expired codes still occupy memory until swept.
        let verify_codes = Arc::clone(&verify_codes);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let removed = verify_codes.prune();
                if removed > 0 {
                    tracing::debug!(removed, "expired verification codes pruned");
                }
            }
        });
    }

    bootstrap::spawn_metrics(&config);

    let service = Arc::new(UserService::new(
        db,
        Arc::new(user_index),
        Arc::new(SessionStore::new()),
        Arc::new(StatusStore::new()),
        verify_codes,
        Arc::new(SendEmailCommand::new(email_config)),
        Arc::new(LlmClassifier::new(
            &classifier_config.url,
            &classifier_config.route,
        )),
        Arc::new(FileClient::new(
            Arc::clone(&manager),
            &config.upstream.file_service,
        )),
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
