//! PTY 会话数据类型
//!
//! 定义会话状态、会话信息、泵的退出原因和关闭报告。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::CloseReason;
use crate::utils::error::{BridgeError, CLOSE_GOING_AWAY, CLOSE_NORMAL};

/// 终端尺寸
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 初始化中
    Init,
    /// 运行中
    Running,
    /// 关闭中
    Closing,
    /// 已完成
    Done,
    /// 错误
    Error,
}

impl SessionStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Error)
    }
}

/// 会话信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 泵的退出原因
#[derive(Debug)]
pub enum PumpExit {
    /// PTY 读到结束（进程已退出）
    ProcessExited,
    /// 客户端正常关闭连接
    ClientClosed,
    /// 收到取消信号
    Cancelled,
    /// 致命错误
    Failed(BridgeError),
}

impl PumpExit {
    /// 是否因错误退出
    pub fn is_failure(&self) -> bool {
        matches!(self, PumpExit::Failed(_))
    }

    /// 是否因取消信号退出
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PumpExit::Cancelled)
    }

    /// 获取错误（如果有）
    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            PumpExit::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// 关闭连接时发送给客户端的关闭原因
    pub fn close_reason(&self) -> CloseReason {
        match self {
            PumpExit::ProcessExited => CloseReason::new(CLOSE_NORMAL, "process exited"),
            PumpExit::ClientClosed => CloseReason::new(CLOSE_NORMAL, ""),
            PumpExit::Cancelled => CloseReason::new(CLOSE_GOING_AWAY, "session stopped"),
            PumpExit::Failed(e) => CloseReason::new(e.close_code(), &e.to_string()),
        }
    }
}

impl std::fmt::Display for PumpExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpExit::ProcessExited => write!(f, "进程已退出"),
            PumpExit::ClientClosed => write!(f, "客户端已关闭连接"),
            PumpExit::Cancelled => write!(f, "已取消"),
            PumpExit::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// 进程关闭报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// 是否确认进程已退出
    pub exited: bool,
    /// 退出码
    pub exit_code: Option<u32>,
    /// 是否在宽限期后强制终止
    pub forced: bool,
    /// 关闭过程中的错误
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_exit_close_reasons() {
        assert_eq!(PumpExit::ProcessExited.close_reason().code, CLOSE_NORMAL);
        assert_eq!(PumpExit::Cancelled.close_reason().code, CLOSE_GOING_AWAY);
        let violation = PumpExit::Failed(BridgeError::unexpected_frame("binary"));
        assert_eq!(violation.close_reason().code, 1003);
        assert!(violation.close_reason().reason.contains("binary"));
        assert!(violation.is_failure());
    }

    #[test]
    fn test_session_status_serialization() {
        let json = serde_json::to_string(&SessionStatus::Closing).unwrap();
        assert_eq!(json, "\"closing\"");
        assert!(SessionStatus::Done.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
    }
}
