//! 工具模块
//!
//! 提供错误类型、错误上报和会话状态管理。

pub mod error;
pub mod reporter;
pub mod state;

pub use error::BridgeError;
pub use reporter::{ErrorReporter, RecordingReporter, TracingReporter};
pub use state::{SessionStateManager, StateTransitionResult};
