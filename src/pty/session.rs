//! PTY 会话
//!
//! 一个会话拥有一个进程、它的 PTY，以及桥接期间的一条客户端连接。
//!
//! `run_bridge` 把输出泵放到独立任务中运行，输入泵占用调用方任务；两者共享
//! 同一个取消信号，任意一方结束都会让另一方停止，随后关闭连接并停止进程。
//! `stop` 幂等，可以与正在运行的 `run_bridge` 并发调用。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::transport::{FrameSink, FrameSource};
use crate::utils::error::BridgeError;
use crate::utils::reporter::{ErrorReporter, TracingReporter};
use crate::utils::state::SessionStateManager;

use super::input::pump_input;
use super::local::{ChildHandle, LocalPty};
use super::output::{pump_output, ExitProbe, OutputPumpConfig, DEFAULT_READ_BUFFER_SIZE};
use super::types::{PumpExit, SessionInfo, SessionStatus, StopReport, TermSize};

/// 轮询进程退出状态的间隔
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 会话选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// PTY 读取缓冲区大小
    pub read_buffer_size: usize,
    /// 挂断后等待进程退出的时间
    pub exit_grace: Duration,
    /// 强制终止后等待进程退出的时间
    pub kill_wait: Duration,
    /// 初始终端尺寸
    pub term_size: TermSize,
    /// 进程工作目录
    pub cwd: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            exit_grace: Duration::from_secs(3),
            kill_wait: Duration::from_secs(2),
            term_size: TermSize::default(),
            cwd: None,
        }
    }
}

/// 触发会话关闭的一方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// 输出泵（进程 -> 客户端）
    Outbound,
    /// 输入泵（客户端 -> 进程）
    Inbound,
    /// 外部调用 stop
    Stop,
}

/// 一次桥接的结果
#[derive(Debug)]
pub struct BridgeOutcome {
    pub session_id: String,
    pub trigger: Trigger,
    pub exit: PumpExit,
    pub stop: StopReport,
}

impl BridgeOutcome {
    /// 是否未因错误结束
    pub fn is_clean(&self) -> bool {
        !self.exit.is_failure()
    }
}

/// PTY 会话
pub struct PtySession {
    id: String,
    command: String,
    args: Vec<String>,
    pid: Option<u32>,
    created_at: DateTime<Utc>,
    options: SessionOptions,
    pty: Mutex<LocalPty>,
    state: Mutex<SessionStateManager>,
    cancel: CancellationToken,
    stopped: OnceCell<StopReport>,
    reporter: Arc<dyn ErrorReporter>,
}

impl PtySession {
    /// 在新的 PTY 上启动进程
    ///
    /// 失败时不会留下任何需要释放的资源。
    pub fn start(
        command: &str,
        args: &[String],
        options: SessionOptions,
    ) -> Result<Self, BridgeError> {
        let id = uuid::Uuid::new_v4().to_string();
        let pty = LocalPty::spawn(command, args, options.cwd.as_deref(), options.term_size)?;
        let pid = pty.process_id();

        let mut state = SessionStateManager::new(id.clone());
        state.transition_to(SessionStatus::Running);

        tracing::info!(
            session = %id,
            pid = ?pid,
            "启动会话: {} {:?}",
            command,
            args
        );

        Ok(Self {
            id,
            command: command.to_string(),
            args: args.to_vec(),
            pid,
            created_at: Utc::now(),
            options,
            pty: Mutex::new(pty),
            state: Mutex::new(state),
            cancel: CancellationToken::new(),
            stopped: OnceCell::new(),
            reporter: Arc::new(TracingReporter),
        })
    }

    /// 替换错误上报器
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// 获取会话 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 子进程 PID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 当前状态
    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status()
    }

    /// 会话信息快照
    pub async fn info(&self) -> SessionInfo {
        let (status, error) = {
            let state = self.state.lock().await;
            (state.status(), state.error_message().map(str::to_string))
        };
        SessionInfo {
            id: self.id.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            pid: self.pid,
            status,
            exit_code: self.stopped.get().and_then(|r| r.exit_code),
            error,
            created_at: self.created_at,
        }
    }

    /// 是否已经停止
    pub fn is_stopped(&self) -> bool {
        self.stopped.initialized()
    }

    /// 在会话和一条客户端连接之间双向转发，直到任意一个方向结束
    ///
    /// 返回前连接已关闭、进程已停止。
    pub async fn run_bridge<K, S>(&self, sink: K, mut source: S) -> BridgeOutcome
    where
        K: FrameSink + 'static,
        S: FrameSource,
    {
        if self.cancel.is_cancelled() {
            return self.refuse_stopped(sink).await;
        }

        let (reader, writer, child) = {
            let mut pty = self.pty.lock().await;
            (pty.take_reader(), pty.take_writer(), pty.child_handle())
        };
        let (reader, writer) = match (reader, writer) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ if self.cancel.is_cancelled() => return self.refuse_stopped(sink).await,
            _ => return self.reject_bridge(sink).await,
        };

        let cancel = self.cancel.child_token();
        let outbound = {
            let cancel = cancel.clone();
            let session_id = self.id.clone();
            let config = OutputPumpConfig {
                buffer_size: self.options.read_buffer_size,
                exit_probe: child.map(|c| Arc::new(c) as Arc<dyn ExitProbe>),
            };
            tokio::spawn(async move {
                let result = pump_output(session_id, reader, sink, cancel.clone(), config).await;
                cancel.cancel();
                result
            })
        };

        let inbound_exit =
            pump_input(&self.id, &mut source, writer, &cancel, self.reporter.as_ref()).await;
        cancel.cancel();

        let (sink, outbound_exit) = match outbound.await {
            Ok((sink, exit)) => (Some(sink), exit),
            Err(e) => {
                tracing::error!(session = %self.id, "输出泵任务异常: {}", e);
                (
                    None,
                    PumpExit::Failed(BridgeError::TerminalRead(std::io::Error::other(
                        e.to_string(),
                    ))),
                )
            }
        };

        let (trigger, exit) = if !inbound_exit.is_cancelled() {
            (Trigger::Inbound, inbound_exit)
        } else if !outbound_exit.is_cancelled() {
            (Trigger::Outbound, outbound_exit)
        } else {
            (Trigger::Stop, PumpExit::Cancelled)
        };

        match exit.error() {
            Some(e) => {
                self.reporter.report(&self.id, e);
                self.state.lock().await.transition_to_error(e);
            }
            None => tracing::info!(session = %self.id, trigger = ?trigger, "会话结束: {}", exit),
        }

        if let Some(mut sink) = sink {
            if let Err(e) = sink.close(Some(exit.close_reason())).await {
                tracing::debug!(session = %self.id, "关闭连接失败: {}", e);
            }
        }

        let stop = self.stop().await;

        BridgeOutcome {
            session_id: self.id.clone(),
            trigger,
            exit,
            stop,
        }
    }

    /// 会话已被停止：以 1001 关闭新连接并返回停止结果
    async fn refuse_stopped<K: FrameSink>(&self, mut sink: K) -> BridgeOutcome {
        tracing::info!(session = %self.id, "会话已停止，拒绝桥接");
        let exit = PumpExit::Cancelled;
        let _ = sink.close(Some(exit.close_reason())).await;
        let stop = self.stop().await;
        BridgeOutcome {
            session_id: self.id.clone(),
            trigger: Trigger::Stop,
            exit,
            stop,
        }
    }

    /// 会话不能再次桥接：关闭新连接并原样返回已有的停止结果
    async fn reject_bridge<K: FrameSink>(&self, mut sink: K) -> BridgeOutcome {
        let error = BridgeError::AlreadyBridged(self.id.clone());
        tracing::warn!(session = %self.id, "{}", error);
        let exit = PumpExit::Failed(error);
        let _ = sink.close(Some(exit.close_reason())).await;
        let stop = self.stopped.get().cloned().unwrap_or_default();
        BridgeOutcome {
            session_id: self.id.clone(),
            trigger: Trigger::Stop,
            exit,
            stop,
        }
    }

    /// 停止会话（幂等）
    ///
    /// 取消桥接、关闭终端并挂断进程，在宽限期内等待退出，超时后强制终止。
    /// 并发调用共享同一次关闭过程并得到相同的报告。
    pub async fn stop(&self) -> StopReport {
        self.stopped.get_or_init(|| self.shutdown()).await.clone()
    }

    async fn shutdown(&self) -> StopReport {
        self.cancel.cancel();
        {
            let mut state = self.state.lock().await;
            if !state.is_terminal() {
                state.transition_to(SessionStatus::Closing);
            }
        }

        let child = {
            let mut pty = self.pty.lock().await;
            pty.close_terminal();
            if let Err(e) = pty.hangup() {
                tracing::debug!(session = %self.id, "发送挂断信号失败: {}", e);
            }
            pty.take_child()
        };

        let report = match child {
            Some(child) => self.reap(child).await,
            None => StopReport::default(),
        };

        if let Some(error) = &report.error {
            tracing::warn!(session = %self.id, "{}", error);
        } else {
            tracing::info!(
                session = %self.id,
                exit_code = ?report.exit_code,
                forced = report.forced,
                "会话已停止"
            );
        }

        let mut state = self.state.lock().await;
        if state.status() == SessionStatus::Closing {
            state.transition_to(SessionStatus::Done);
        }
        report
    }

    /// 等待进程退出：宽限期内未退出则强制终止，再等待一段时间后放弃
    async fn reap(&self, child: ChildHandle) -> StopReport {
        if let Some(report) = wait_for_exit(&child, self.options.exit_grace).await {
            return report;
        }

        tracing::warn!(
            session = %self.id,
            "进程在 {:?} 内未退出，强制终止",
            self.options.exit_grace
        );

        let killer = child.clone();
        match tokio::task::spawn_blocking(move || killer.kill()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(session = %self.id, "强制终止失败: {}", e),
            Err(e) => {
                return StopReport {
                    forced: true,
                    error: Some(e.to_string()),
                    ..StopReport::default()
                };
            }
        }

        match wait_for_exit(&child, self.options.kill_wait).await {
            Some(report) => StopReport {
                forced: true,
                ..report
            },
            None => {
                let waited = self.options.exit_grace + self.options.kill_wait;
                StopReport {
                    exited: false,
                    exit_code: None,
                    forced: true,
                    error: Some(
                        BridgeError::teardown_timeout(&self.id, waited.as_millis()).to_string(),
                    ),
                }
            }
        }
    }
}

/// 在 `limit` 时间内轮询进程退出状态
async fn wait_for_exit(child: &ChildHandle, limit: Duration) -> Option<StopReport> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Some(StopReport {
                    exited: true,
                    exit_code: Some(status.exit_code()),
                    forced: false,
                    error: None,
                });
            }
            Ok(None) => {}
            Err(e) => {
                return Some(StopReport {
                    exited: false,
                    exit_code: None,
                    forced: false,
                    error: Some(e.to_string()),
                });
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}
