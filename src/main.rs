//! ws-pty-bridge CLI 入口点
//!
//! 监听 HTTP 地址：`/pty` 上的每条 WebSocket 连接都会在新的伪终端中启动
//! 配置的命令，终端数据以 base64 文本消息双向传输。

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ws_pty_bridge::server::{BridgeConfig, BridgeServer, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = BridgeConfig::from_cli(Cli::parse())?;
    tracing::info!("ws-pty-bridge 启动");

    BridgeServer::new(config).run().await?;

    Ok(())
}
