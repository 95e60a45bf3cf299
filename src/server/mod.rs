//! HTTP / WebSocket 服务
//!
//! 接受 WebSocket 连接并为每条连接启动一个 PTY 会话。

pub mod bridge_server;
pub mod config;
pub mod routes;
pub mod ws;

pub use bridge_server::BridgeServer;
pub use config::{BridgeConfig, Cli};
pub use routes::{router, AppState};
