//! WebSocket 传输适配
//!
//! 把 axum 的 WebSocket 拆分为 `FrameSink` / `FrameSource`。
//! ping/pong 由底层自动应答，不会交给泵处理。

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::transport::{CloseReason, Frame, FrameSink, FrameSource};
use crate::utils::error::BridgeError;

/// 拆分 WebSocket 连接
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (tx, rx) = socket.split();
    (WsSink { tx, closed: false }, WsSource { rx })
}

/// WebSocket 发送端
pub struct WsSink {
    tx: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::TransportSend("连接已关闭".to_string()));
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close(reason) => {
                return self.close(reason).await;
            }
        };
        self.tx
            .send(message)
            .await
            .map_err(|e| BridgeError::TransportSend(e.to_string()))
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), BridgeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = reason.map(|r| CloseFrame {
            code: r.code,
            reason: Cow::Owned(r.reason),
        });
        // 对端先断开时关闭帧发不出去，仍视为已关闭
        if let Err(e) = self.tx.send(Message::Close(frame)).await {
            tracing::debug!("发送关闭帧失败: {}", e);
        }
        if let Err(e) = self.tx.close().await {
            tracing::debug!("关闭 WebSocket 失败: {}", e);
        }
        Ok(())
    }
}

/// WebSocket 接收端
pub struct WsSource {
    rx: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<Frame, BridgeError>> {
        loop {
            let message = match self.rx.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(BridgeError::TransportReceive(e.to_string()))),
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(data) => Frame::Binary(data),
                Message::Close(frame) => {
                    Frame::Close(frame.map(|f| CloseReason::new(f.code, &f.reason)))
                }
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}
