use anyhow::Context;
use audio_socket_bridge::audio::AlsaBackend;
use audio_socket_bridge::{BridgeServer, Config};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置，命令行第一个参数可覆盖 socket 路径
    let mut config = Config::new().unwrap_or_else(|e| {
        log::warn!("Invalid build-time config ({:#}), using defaults", e);
        Config::default()
    });
    if let Some(path) = std::env::args().nth(1) {
        config = config.with_socket_path(path);
    }

    // 绑定 socket 并打开音频设备，任何一步失败都直接退出
    let mut server = BridgeServer::start(&config, &AlsaBackend)
        .await
        .with_context(|| format!("Failed to start audio bridge at {}", config.socket_path))?;

    // 监听 Ctrl+C 信号
    let result = signal::ctrl_c().await;
    log::info!("Received Ctrl+C, shutting down...");
    server.stop().await;

    result.context("Failed to listen for Ctrl+C")
}
