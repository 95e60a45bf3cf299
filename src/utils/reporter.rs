//! 错误上报
//!
//! 会话在桥接期间遇到的错误（包括可跳过的解码错误）统一交给 `ErrorReporter`，
//! 生产环境写入 tracing 日志，测试中可以换成 `RecordingReporter` 断言上报内容。

use std::sync::{Arc, Mutex};

use super::error::BridgeError;

/// 错误上报接口
pub trait ErrorReporter: Send + Sync {
    /// 上报一个错误
    fn report(&self, session_id: &str, error: &BridgeError);
}

/// 写入 tracing 日志的上报器
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, session_id: &str, error: &BridgeError) {
        if error.is_fatal() {
            tracing::error!(
                session = %session_id,
                error_type = error.error_type(),
                "会话错误: {}",
                error
            );
        } else {
            tracing::warn!(
                session = %session_id,
                error_type = error.error_type(),
                "跳过无效消息: {}",
                error
            );
        }
    }
}

/// 一条上报记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub session_id: String,
    pub error_type: &'static str,
    pub fatal: bool,
    pub message: String,
}

/// 记录所有上报的错误，供测试断言
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    entries: Arc<Mutex<Vec<ReportedError>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有记录
    pub fn entries(&self) -> Vec<ReportedError> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 统计指定类型的记录数
    pub fn count_of(&self, error_type: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.error_type == error_type)
            .count()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, session_id: &str, error: &BridgeError) {
        let entry = ReportedError {
            session_id: session_id.to_string(),
            error_type: error.error_type(),
            fatal: error.is_fatal(),
            message: error.to_string(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_collects_entries() {
        let reporter = RecordingReporter::new();
        let shared = reporter.clone();

        shared.report("s1", &BridgeError::unexpected_frame("binary"));
        shared.report("s1", &BridgeError::TransportReceive("reset".to_string()));

        let entries = reporter.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].session_id, "s1");
        assert_eq!(entries[0].error_type, "protocol_violation");
        assert!(entries[0].fatal);
        assert_eq!(reporter.count_of("transport_receive"), 1);
        assert_eq!(reporter.count_of("payload_decode"), 0);
    }

    #[test]
    fn test_tracing_reporter_accepts_any_error() {
        let reporter = TracingReporter;
        reporter.report("s1", &BridgeError::Spawn("missing".to_string()));
    }
}
