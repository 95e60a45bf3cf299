//! PTY 输入泵（客户端 -> 进程）
//!
//! 逐条接收客户端消息：文本消息按标准 base64 解码后完整写入 PTY，
//! 解码失败只上报并跳过；二进制等其他类型的消息视为协议违规，结束会话；
//! 关闭帧或连接结束视为正常退出。

use std::io::Write;

use base64::Engine;
use tokio_util::sync::CancellationToken;

use crate::transport::{Frame, FrameSource};
use crate::utils::error::BridgeError;
use crate::utils::reporter::ErrorReporter;

use super::types::PumpExit;

/// 解码一条文本消息的负载
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, BridgeError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

/// 在阻塞线程池上完整写入并刷新，写完把 writer 交还给调用方
async fn write_all(
    mut writer: Box<dyn Write + Send>,
    data: Vec<u8>,
) -> Result<Box<dyn Write + Send>, BridgeError> {
    let joined = tokio::task::spawn_blocking(move || {
        let result = writer.write_all(&data).and_then(|_| writer.flush());
        (writer, result)
    })
    .await;

    match joined {
        Ok((writer, Ok(()))) => Ok(writer),
        Ok((_, Err(e))) => Err(BridgeError::TerminalWrite(e)),
        Err(e) => Err(BridgeError::TerminalWrite(std::io::Error::other(
            e.to_string(),
        ))),
    }
}

/// 运行输入泵
pub async fn pump_input<S>(
    session_id: &str,
    source: &mut S,
    writer: Box<dyn Write + Send>,
    cancel: &CancellationToken,
    reporter: &dyn ErrorReporter,
) -> PumpExit
where
    S: FrameSource + ?Sized,
{
    let mut writer = writer;

    let exit = loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            received = source.recv() => received,
        };

        let payload = match received {
            None | Some(Ok(Frame::Close(_))) => break PumpExit::ClientClosed,
            Some(Err(e)) => break PumpExit::Failed(e),
            Some(Ok(Frame::Text(payload))) => payload,
            Some(Ok(other)) => {
                tracing::debug!("会话 {} 收到 {} 消息", session_id, other.kind());
                break PumpExit::Failed(BridgeError::unexpected_frame(other.kind()));
            }
        };

        let data = match decode_payload(&payload) {
            Ok(data) => data,
            Err(e) => {
                reporter.report(session_id, &e);
                continue;
            }
        };
        if data.is_empty() {
            continue;
        }

        let len = data.len();
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            written = write_all(writer, data) => written,
        };
        match written {
            Ok(w) => writer = w,
            Err(e) => break PumpExit::Failed(e),
        }
        tracing::trace!("写入 PTY: {} bytes", len);
    };

    tracing::debug!("输入泵退出: {} ({})", session_id, exit);
    exit
}
