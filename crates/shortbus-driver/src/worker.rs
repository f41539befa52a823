//! 工作器生命周期状态
//!
//! 两个总线工作器共用同一套状态机：
//! `STOPPED → RUNNING → STOPPING → STOPPED`。
//! 停止是协作式的：`stop()` 只置 STOPPING 标志，循环在每轮迭代
//! 顶部观察到后自行退出；最坏停止时延为一次读超时加一次空转等待。

use std::sync::atomic::{AtomicU8, Ordering};

/// 工作器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WorkerState {
    /// 未运行（初始与终止状态）
    #[default]
    Stopped = 0,
    /// 循环运行中
    Running = 1,
    /// 已请求停止，等待循环观察标志
    Stopping = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 工作器状态（原子版本，线程间共享）
#[derive(Debug)]
pub struct AtomicWorkerState {
    inner: AtomicU8,
}

impl AtomicWorkerState {
    pub fn new(state: WorkerState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> WorkerState {
        // Acquire: 看到 Stopping 时必须看到请求方之前的全部写入
        WorkerState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: WorkerState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 仅当当前状态等于 `current` 时切换到 `new`
    pub fn transition(&self, current: WorkerState, new: WorkerState) -> bool {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for AtomicWorkerState {
    fn default() -> Self {
        Self::new(WorkerState::Stopped)
    }
}
