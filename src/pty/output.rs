//! PTY 输出泵（进程 -> 客户端）
//!
//! 从 PTY 读取原始字节，编码为标准 base64 后作为一条文本消息发送。
//! 每次读取对应恰好一条消息，并且在该消息发送完成之后才发起下一次读取，
//! 因此消息顺序与终端输出顺序一致。
//!
//! 客户端消费慢时，发送会阻塞在这里，PTY 也随之不再被读取。
//! 除此之外没有额外的缓冲或背压机制。

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio_util::sync::CancellationToken;

use crate::transport::{Frame, FrameSink};
use crate::utils::error::BridgeError;

use super::types::PumpExit;

/// 默认读取缓冲区大小
pub const DEFAULT_READ_BUFFER_SIZE: usize = 128;

/// 连续多少次无数据读取后确认一次进程是否仍在运行
pub const EXIT_CHECK_INTERVAL: u32 = 50;

/// 无数据时的退避时间
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

/// Linux/macOS 上进程退出后读取 PTY master 返回 EIO
const EIO: i32 = 5;

/// 查询进程是否已经退出
///
/// 部分平台在进程退出后读取 PTY 只返回 0 字节而不报错，
/// 输出泵据此区分"暂无数据"和"进程已结束"。
pub trait ExitProbe: Send + Sync {
    fn has_exited(&self) -> bool;
}

/// 输出泵配置
#[derive(Clone)]
pub struct OutputPumpConfig {
    /// 读取缓冲区大小
    pub buffer_size: usize,
    /// 持续无数据时用于确认进程状态；为空时只依赖读取结果判断结束
    pub exit_probe: Option<Arc<dyn ExitProbe>>,
}

impl Default for OutputPumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_READ_BUFFER_SIZE,
            exit_probe: None,
        }
    }
}

/// 将一段终端输出编码为消息负载
pub fn encode_chunk(chunk: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(chunk)
}

/// 单次读取的结果
enum ReadOutcome {
    Data(Vec<u8>),
    NoData,
    Eof,
}

/// 在阻塞线程池上执行一次读取，读完把 reader 交还给调用方
async fn read_chunk(
    mut reader: Box<dyn Read + Send>,
    buffer_size: usize,
) -> Result<(Box<dyn Read + Send>, ReadOutcome), BridgeError> {
    let joined = tokio::task::spawn_blocking(move || {
        let mut buffer = vec![0u8; buffer_size];
        loop {
            let outcome = match reader.read(&mut buffer) {
                Ok(0) => Ok(ReadOutcome::NoData),
                Ok(n) => {
                    buffer.truncate(n);
                    Ok(ReadOutcome::Data(buffer))
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => Ok(ReadOutcome::NoData),
                Err(ref e) if e.raw_os_error() == Some(EIO) => Ok(ReadOutcome::Eof),
                Err(e) => Err(e),
            };
            return (reader, outcome);
        }
    })
    .await;

    match joined {
        Ok((reader, Ok(outcome))) => Ok((reader, outcome)),
        Ok((_, Err(e))) => Err(BridgeError::TerminalRead(e)),
        Err(e) => Err(BridgeError::TerminalRead(std::io::Error::other(
            e.to_string(),
        ))),
    }
}

/// 运行输出泵
///
/// 返回时交还 sink，由调用方负责关闭连接。
pub async fn pump_output<K>(
    session_id: String,
    reader: Box<dyn Read + Send>,
    mut sink: K,
    cancel: CancellationToken,
    config: OutputPumpConfig,
) -> (K, PumpExit)
where
    K: FrameSink,
{
    let buffer_size = config.buffer_size.max(1);
    let mut reader = reader;
    let mut empty_reads = 0u32;

    let exit = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            read = read_chunk(reader, buffer_size) => read,
        };

        let outcome = match read {
            Ok((r, outcome)) => {
                reader = r;
                outcome
            }
            Err(e) => break PumpExit::Failed(e),
        };

        match outcome {
            ReadOutcome::Data(chunk) => {
                empty_reads = 0;
                let encoded = encode_chunk(&chunk);
                tracing::trace!("读取 PTY 输出: {} bytes", chunk.len());

                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break PumpExit::Cancelled,
                    sent = sink.send(Frame::Text(encoded)) => sent,
                };
                if let Err(e) = sent {
                    tracing::debug!("发送 {} bytes 失败: {}", chunk.len(), e);
                    break PumpExit::Failed(e);
                }
            }
            ReadOutcome::NoData => {
                empty_reads += 1;
                if empty_reads >= EXIT_CHECK_INTERVAL {
                    empty_reads = 0;
                    if config.exit_probe.as_ref().is_some_and(|p| p.has_exited()) {
                        break PumpExit::ProcessExited;
                    }
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break PumpExit::Cancelled,
                    _ = tokio::time::sleep(EMPTY_READ_BACKOFF) => {}
                }
            }
            ReadOutcome::Eof => break PumpExit::ProcessExited,
        }
    };

    tracing::debug!("输出泵退出: {} ({})", session_id, exit);
    (sink, exit)
}
