//! 错误类型定义
//!
//! 定义桥接服务的错误类型，提供描述性错误消息。
//!
//! ## 功能
//! - 定义 BridgeError 枚举，覆盖会话创建、双向泵和关闭阶段的所有错误
//! - 区分致命错误与可跳过错误（仅 base64 解码失败可跳过）
//! - 映射到 WebSocket 关闭码，用于关闭前发送的诊断帧

use thiserror::Error;

/// WebSocket 正常关闭
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket 端点离开（会话被服务端停止）
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// WebSocket 不支持的数据类型
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// WebSocket 服务端内部错误
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// 桥接错误类型
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 进程启动失败
    #[error("进程启动失败: {0}")]
    Spawn(String),

    /// PTY 分配失败
    #[error("PTY 分配失败: {0}")]
    TerminalAlloc(String),

    /// 读取 PTY 失败
    #[error("读取 PTY 失败: {0}")]
    TerminalRead(#[source] std::io::Error),

    /// 写入 PTY 失败
    #[error("写入 PTY 失败: {0}")]
    TerminalWrite(#[source] std::io::Error),

    /// 发送消息失败
    #[error("发送消息失败: {0}")]
    TransportSend(String),

    /// 接收消息失败
    #[error("接收消息失败: {0}")]
    TransportReceive(String),

    /// 负载 base64 解码失败
    #[error("base64 解码失败: {0}")]
    PayloadDecode(#[from] base64::DecodeError),

    /// 意外的消息类型
    #[error("意外的消息类型: {0}")]
    ProtocolViolation(String),

    /// 会话已经桥接过连接
    #[error("会话已桥接: {0}")]
    AlreadyBridged(String),

    /// 进程退出等待超时
    #[error("会话关闭超时: {0}")]
    Teardown(String),

    /// 配置无效
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl BridgeError {
    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Spawn(_) => "spawn",
            BridgeError::TerminalAlloc(_) => "terminal_alloc",
            BridgeError::TerminalRead(_) => "terminal_read",
            BridgeError::TerminalWrite(_) => "terminal_write",
            BridgeError::TransportSend(_) => "transport_send",
            BridgeError::TransportReceive(_) => "transport_receive",
            BridgeError::PayloadDecode(_) => "payload_decode",
            BridgeError::ProtocolViolation(_) => "protocol_violation",
            BridgeError::AlreadyBridged(_) => "already_bridged",
            BridgeError::Teardown(_) => "teardown",
            BridgeError::InvalidConfig(_) => "invalid_config",
            BridgeError::IoError(_) => "io_error",
        }
    }

    /// 检查是否为致命错误
    ///
    /// 除负载解码失败外，桥接期间的所有错误都会终止所在的泵并触发整个会话关闭。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::PayloadDecode(_))
    }

    /// 检查是否在会话创建阶段发生（此时没有需要释放的资源）
    pub fn is_startup_error(&self) -> bool {
        matches!(self, BridgeError::Spawn(_) | BridgeError::TerminalAlloc(_))
    }

    /// 对应的 WebSocket 关闭码
    pub fn close_code(&self) -> u16 {
        match self {
            BridgeError::ProtocolViolation(_) => CLOSE_UNSUPPORTED_DATA,
            _ => CLOSE_INTERNAL_ERROR,
        }
    }

    /// 创建协议违规错误
    pub fn unexpected_frame(kind: &str) -> Self {
        BridgeError::ProtocolViolation(kind.to_string())
    }

    /// 创建关闭超时错误
    pub fn teardown_timeout(session_id: &str, waited_ms: u128) -> Self {
        BridgeError::Teardown(format!(
            "会话 {} 的进程在 {}ms 内未退出",
            session_id, waited_ms
        ))
    }
}
