//! ws-pty-bridge 库
//!
//! 通过 WebSocket 驱动本地伪终端中的进程。

pub mod pty;
pub mod server;
pub mod transport;
pub mod utils;
