//! 桥接服务
//!
//! 监听 TCP 地址并运行 HTTP 路由；收到 Ctrl-C 后停止接受新连接，
//! 并停止所有仍在运行的会话。

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::pty::manager::SessionRegistry;
use crate::utils::error::BridgeError;

use super::config::BridgeConfig;
use super::routes::{router, AppState};

/// 桥接服务
pub struct BridgeServer {
    config: Arc<BridgeConfig>,
    registry: SessionRegistry,
}

impl BridgeServer {
    /// 创建服务
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        }
    }

    /// 会话注册表
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// 绑定监听地址
    pub async fn bind(&self) -> Result<TcpListener, BridgeError> {
        TcpListener::bind(&self.config.listen_addr).await.map_err(|e| {
            BridgeError::InvalidConfig(format!("无法监听 {}: {}", self.config.listen_addr, e))
        })
    }

    /// 运行服务直到 Ctrl-C
    pub async fn run(self) -> Result<(), BridgeError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// 在给定的监听器上运行服务，`shutdown` 完成后优雅退出
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        tracing::info!(
            addr = ?local_addr,
            command = %self.config.command,
            args = ?self.config.args,
            static_root = %self.config.static_root.display(),
            "ws-pty-bridge 开始监听"
        );

        let app = router(AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
        });

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        self.registry.stop_all().await;
        tracing::info!("ws-pty-bridge 已停止");
        served.map_err(BridgeError::IoError)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号");
}
