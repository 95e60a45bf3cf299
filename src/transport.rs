//! 消息传输抽象
//!
//! 双向泵只依赖 `FrameSink` / `FrameSource` 两个接口，WebSocket 适配见
//! `server::ws`，内存通道实现见 [`memory`]。

use async_trait::async_trait;

use crate::utils::error::BridgeError;

/// WebSocket 关闭帧的原因字段最长 123 字节
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// 创建关闭原因，超长的原因文本按字符边界截断
    pub fn new(code: u16, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_CLOSE_REASON_BYTES);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            code,
            reason: reason[..end].to_string(),
        }
    }
}

/// 一条传输消息
///
/// 只有 `Text` 携带终端数据：一段 PTY 输出的标准 base64 编码。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseReason>),
}

impl Frame {
    /// 消息类型名称（用于日志和错误）
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Close(_) => "close",
        }
    }
}

/// 消息发送端
#[async_trait]
pub trait FrameSink: Send {
    /// 发送一条消息
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError>;

    /// 关闭连接（幂等）
    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), BridgeError>;
}

/// 消息接收端
#[async_trait]
pub trait FrameSource: Send {
    /// 接收下一条消息，连接结束时返回 None
    async fn recv(&mut self) -> Option<Result<Frame, BridgeError>>;
}

/// 基于 tokio 通道的内存传输，用于测试和进程内桥接
pub mod memory {
    use tokio::sync::mpsc;

    use super::*;

    /// 发送到通道的消息端
    pub struct MemorySink {
        tx: mpsc::UnboundedSender<Frame>,
        closed: bool,
    }

    impl MemorySink {
        /// 是否已关闭
        pub fn is_closed(&self) -> bool {
            self.closed
        }
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send(&mut self, frame: Frame) -> Result<(), BridgeError> {
            if self.closed {
                return Err(BridgeError::TransportSend("连接已关闭".to_string()));
            }
            self.tx
                .send(frame)
                .map_err(|_| BridgeError::TransportSend("对端已断开".to_string()))
        }

        async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), BridgeError> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            // 对端可能已经断开，关闭帧送达与否都算关闭成功
            let _ = self.tx.send(Frame::Close(reason));
            Ok(())
        }
    }

    /// 从通道读取消息的接收端
    pub struct MemorySource {
        rx: mpsc::UnboundedReceiver<Result<Frame, BridgeError>>,
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn recv(&mut self) -> Option<Result<Frame, BridgeError>> {
            self.rx.recv().await
        }
    }

    /// 创建服务端发送通道：返回 (服务端 sink, 客户端接收端)
    pub fn outbound_channel() -> (MemorySink, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemorySink { tx, closed: false }, rx)
    }

    /// 创建服务端接收通道：返回 (客户端发送端, 服务端 source)
    pub fn inbound_channel() -> (
        mpsc::UnboundedSender<Result<Frame, BridgeError>>,
        MemorySource,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, MemorySource { rx })
    }
}
