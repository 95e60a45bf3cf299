//! 本地 PTY 实现
//!
//! 使用 portable-pty 分配伪终端并在其上启动进程。
//! 读端、写端和子进程句柄可以分别取出，交给不同的任务使用。

use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize,
};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::utils::error::BridgeError;

use super::output::ExitProbe;
use super::types::TermSize;

/// 可在输出泵与关闭流程之间共享的子进程句柄
#[derive(Clone)]
pub struct ChildHandle {
    inner: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
}

impl ChildHandle {
    fn new(child: Box<dyn Child + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(child)),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Box<dyn Child + Send + Sync>>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("子进程句柄锁已损坏"))
    }

    /// 非阻塞地查询退出状态
    pub fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        self.lock()?.try_wait()
    }

    /// 阻塞等待进程退出
    pub fn wait(&self) -> io::Result<ExitStatus> {
        self.lock()?.wait()
    }

    /// 发送挂断信号
    pub fn hangup(&self) -> io::Result<()> {
        self.lock()?.clone_killer().kill()
    }

    /// 强制终止（可能阻塞数百毫秒）
    pub fn kill(&self) -> io::Result<()> {
        self.lock()?.kill()
    }
}

impl ExitProbe for ChildHandle {
    fn has_exited(&self) -> bool {
        // 关闭流程正持有句柄时视为仍在运行，由关闭流程负责结束
        let mut child = match self.inner.try_lock() {
            Ok(child) => child,
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(_)) => return true,
        };
        !matches!(child.try_wait(), Ok(None))
    }
}

/// 本地 PTY 实例
pub struct LocalPty {
    /// PTY master
    master: Option<Box<dyn MasterPty + Send>>,
    /// PTY reader（桥接时取走）
    reader: Option<Box<dyn Read + Send>>,
    /// PTY writer（桥接时取走）
    writer: Option<Box<dyn Write + Send>>,
    /// 子进程
    child: Option<ChildHandle>,
    /// 子进程 PID
    pid: Option<u32>,
}

impl LocalPty {
    /// 在新的 PTY 上启动 `command args...`
    ///
    /// 读写端在启动进程之前获取，因此失败时不会留下需要清理的进程。
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
        term_size: TermSize,
    ) -> Result<Self, BridgeError> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows: term_size.rows,
            cols: term_size.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| BridgeError::TerminalAlloc(e.to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::TerminalAlloc(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::TerminalAlloc(e.to_string()))?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Spawn(format!("{}: {}", command, e)))?;
        let pid = child.process_id();

        // slave 端只应由子进程持有，否则子进程退出后读端收不到结束信号
        drop(pair.slave);

        Ok(Self {
            master: Some(pair.master),
            reader: Some(reader),
            writer: Some(writer),
            child: Some(ChildHandle::new(child)),
            pid,
        })
    }

    /// 子进程 PID
    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// 取出 PTY reader
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// 取出 PTY writer
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    /// 取出子进程句柄
    pub fn take_child(&mut self) -> Option<ChildHandle> {
        self.child.take()
    }

    /// 获取子进程句柄的共享副本
    pub fn child_handle(&self) -> Option<ChildHandle> {
        self.child.clone()
    }

    /// 关闭终端句柄
    ///
    /// 释放 master 以及尚未被取走的读写端，返回此前是否仍处于打开状态。
    pub fn close_terminal(&mut self) -> bool {
        let was_open = self.master.is_some();
        self.master = None;
        self.reader = None;
        self.writer = None;
        was_open
    }

    /// 终端句柄是否仍然打开
    pub fn is_open(&self) -> bool {
        self.master.is_some()
    }

    /// 向子进程发送挂断信号
    pub fn hangup(&self) -> Result<(), BridgeError> {
        match &self.child {
            Some(child) => child.hangup().map_err(BridgeError::IoError),
            None => Ok(()),
        }
    }
}

impl Drop for LocalPty {
    fn drop(&mut self) {
        // 未经 stop 就被丢弃时，至少通知子进程挂断
        if let Some(child) = &self.child {
            let _ = child.hangup();
        }
    }
}
