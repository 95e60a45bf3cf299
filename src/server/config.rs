//! 服务配置
//!
//! 命令行参数在启动时解析一次，之后只读共享。

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::pty::output::DEFAULT_READ_BUFFER_SIZE;
use crate::pty::session::SessionOptions;
use crate::utils::error::BridgeError;

/// 未设置 SHELL 时使用的命令
const FALLBACK_COMMAND: &str = "/bin/bash";

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ws-pty-bridge",
    about = "Serve a local command's terminal over WebSocket"
)]
pub struct Cli {
    /// Listen address; a bare `:PORT` binds all interfaces.
    #[arg(long, default_value = "0.0.0.0:9000")]
    pub addr: String,

    /// Command to run for each connection (default: $SHELL, then /bin/bash).
    #[arg(long)]
    pub cmd: Option<String>,

    /// Directory served for non-WebSocket requests (default: current directory).
    #[arg(long = "static")]
    pub static_root: Option<PathBuf>,

    /// PTY read buffer size in bytes.
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// How long to wait for the process after hangup.
    #[arg(long, default_value_t = 3000)]
    pub exit_grace_ms: u64,

    /// How long to wait for the process after a forced kill.
    #[arg(long, default_value_t = 2000)]
    pub kill_wait_ms: u64,

    /// Arguments passed to the command.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// 桥接服务配置
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_addr: String,
    pub command: String,
    pub args: Vec<String>,
    pub static_root: PathBuf,
    pub session: SessionOptions,
}

impl BridgeConfig {
    /// 由命令行参数构建配置并校验
    pub fn from_cli(cli: Cli) -> Result<Self, BridgeError> {
        if cli.buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "buffer size must be greater than zero".to_string(),
            ));
        }

        let command = match cli.cmd {
            Some(cmd) => cmd,
            None => detect_default_command(),
        };
        if command.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("command must not be empty".to_string()));
        }

        let static_root = match cli.static_root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        Ok(Self {
            listen_addr: normalize_addr(&cli.addr)?,
            command,
            args: cli.args,
            static_root,
            session: SessionOptions {
                read_buffer_size: cli.buffer_size,
                exit_grace: Duration::from_millis(cli.exit_grace_ms),
                kill_wait: Duration::from_millis(cli.kill_wait_ms),
                ..SessionOptions::default()
            },
        })
    }
}

/// 检测默认命令：优先使用 SHELL 环境变量
pub fn detect_default_command() -> String {
    env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_COMMAND.to_string())
}

/// `:PORT` 补全为监听所有网卡
fn normalize_addr(addr: &str) -> Result<String, BridgeError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(BridgeError::InvalidConfig("listen address must not be empty".to_string()));
    }
    if let Some(port) = addr.strip_prefix(':') {
        port.parse::<u16>()
            .map_err(|_| BridgeError::InvalidConfig(format!("invalid port: {}", port)))?;
        return Ok(format!("0.0.0.0:{}", port));
    }
    Ok(addr.to_string())
}
