//! 会话状态管理
//!
//! 提供会话生命周期的状态转换校验。
//!
//! 状态流转：`Init -> Running -> Closing -> Done`，任何状态都可以进入 `Error`。
//! `Done` 与 `Error` 为终态。

use crate::pty::types::SessionStatus;
use crate::utils::error::BridgeError;

/// 状态转换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionResult {
    /// 转换成功
    Success,
    /// 转换无效（当前状态不允许转换到目标状态）
    Invalid {
        from: SessionStatus,
        to: SessionStatus,
        reason: String,
    },
}

impl StateTransitionResult {
    /// 检查转换是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, StateTransitionResult::Success)
    }

    /// 检查转换是否失败
    pub fn is_invalid(&self) -> bool {
        matches!(self, StateTransitionResult::Invalid { .. })
    }
}

/// 会话状态管理器
#[derive(Debug, Clone)]
pub struct SessionStateManager {
    /// 当前状态
    current_status: SessionStatus,
    /// 会话 ID（用于日志）
    session_id: String,
    /// 错误消息（如果状态为 Error）
    error_message: Option<String>,
}

impl SessionStateManager {
    /// 创建新的状态管理器
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_status(session_id, SessionStatus::Init)
    }

    /// 创建带初始状态的状态管理器
    pub fn with_status(session_id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            current_status: status,
            session_id: session_id.into(),
            error_message: None,
        }
    }

    /// 获取当前状态
    pub fn status(&self) -> SessionStatus {
        self.current_status
    }

    /// 获取错误消息
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// 尝试转换到目标状态
    ///
    /// 转换无效时保持当前状态并返回 Invalid。
    pub fn transition_to(&mut self, target: SessionStatus) -> StateTransitionResult {
        if !Self::is_valid_transition(self.current_status, target) {
            let reason = Self::invalid_transition_reason(self.current_status, target);
            tracing::warn!(
                "会话 {} 无效状态转换: {:?} -> {:?}, 原因: {}",
                self.session_id,
                self.current_status,
                target,
                reason
            );
            return StateTransitionResult::Invalid {
                from: self.current_status,
                to: target,
                reason,
            };
        }

        let from = self.current_status;
        self.current_status = target;
        if target != SessionStatus::Error {
            self.error_message = None;
        }
        tracing::debug!(
            "会话 {} 状态转换: {:?} -> {:?}",
            self.session_id,
            from,
            target
        );
        StateTransitionResult::Success
    }

    /// 转换到错误状态并记录错误消息
    pub fn transition_to_error(&mut self, error: &BridgeError) {
        let from = self.current_status;
        self.current_status = SessionStatus::Error;
        self.error_message = Some(error.to_string());

        tracing::debug!(
            "会话 {} 进入错误状态: {:?} -> Error, 错误: {}",
            self.session_id,
            from,
            error
        );
    }

    /// 检查状态转换是否有效
    pub fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
        if from == to {
            return true;
        }
        if to == SessionStatus::Error {
            return true;
        }

        match from {
            SessionStatus::Init => matches!(to, SessionStatus::Running | SessionStatus::Done),
            SessionStatus::Running => matches!(to, SessionStatus::Closing),
            SessionStatus::Closing => matches!(to, SessionStatus::Done),
            SessionStatus::Done | SessionStatus::Error => false,
        }
    }

    fn invalid_transition_reason(from: SessionStatus, to: SessionStatus) -> String {
        match from {
            SessionStatus::Done => "会话已完成，不能再转换状态".to_string(),
            SessionStatus::Error => "会话处于错误状态，不能再转换状态".to_string(),
            _ => format!("不允许从 {:?} 转换到 {:?}", from, to),
        }
    }

    /// 检查会话是否处于终态
    pub fn is_terminal(&self) -> bool {
        self.current_status.is_terminal()
    }
}
