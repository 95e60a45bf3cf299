//! PTY 会话模块
//!
//! 负责本地伪终端的创建、双向数据泵以及会话生命周期。

pub mod input;
pub mod local;
pub mod manager;
pub mod output;
pub mod session;
pub mod types;

pub use input::{decode_payload, pump_input};
pub use local::{ChildHandle, LocalPty};
pub use manager::SessionRegistry;
pub use output::{encode_chunk, pump_output, ExitProbe, OutputPumpConfig};
pub use session::{BridgeOutcome, PtySession, SessionOptions, Trigger};
pub use types::{PumpExit, SessionInfo, SessionStatus, StopReport, TermSize};
