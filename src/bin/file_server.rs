//! The file service: content-addressed blob storage.

use breezechatd::bootstrap;
use breezechatd::config::Config;
use breezechatd::services::FileService;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = bootstrap::load_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let blob_config = config
        .blob
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[blob] section is required"))?;
    let (_coord, registry) = bootstrap::register_instance(&config).await?;

    bootstrap::spawn_metrics(&config);

    let service = Arc::new(FileService::new(&blob_config.root));
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
