//! Monitor 工作器
//!
//! 被动旁听总线：读帧、解码、写入状态缓存，解码失败直接丢弃。
//! 订阅开启时把解码出的帧发布到订阅队列，供外部（如实时面板）
//! 消费。主要用于开发观测，也负责在冒充开始前预热缓存。

use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use shortbus_protocol::{Frame, Registry, decode};
use shortbus_serial::BusLine;
use tracing::{debug, error, trace};

use crate::cache::StateCache;
use crate::error::DriverError;
use crate::worker::{AtomicWorkerState, WorkerState};

/// 无读取时的空转等待
const IDLE_DELAY: Duration = Duration::from_millis(5);

/// 订阅队列：已解码帧的无界 FIFO
///
/// 发送端在工作器手里，接收端由外部消费者持有。队列寿命比单个
/// 工作器长，工作器启动（以及 Spoofer 停止）时会清掉积压的帧。
#[derive(Clone)]
pub struct SubscriberQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl SubscriberQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// 非阻塞取一帧
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// 限时等待一帧
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// 清空积压的帧
    pub fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn publish(&self, frame: Frame) {
        // 接收端与发送端同寿命，send 不会失败
        let _ = self.tx.send(frame);
    }
}

impl Default for SubscriberQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Monitor 工作器句柄
///
/// 线程在 `spawn` 时启动；`stop()` 置协作停止标志，`join()`
/// 等待线程退出。复用总线前必须先 join。
pub struct Monitor {
    state: Arc<AtomicWorkerState>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// 启动监视线程
    ///
    /// # 参数
    /// - `bus`: 总线句柄（移动进工作线程，独占）
    /// - `registry`: 地址/命令注册表
    /// - `cache`: 共享状态缓存
    /// - `queue`: 订阅队列；`None` 表示不发布
    pub fn spawn(
        bus: impl BusLine + Send + 'static,
        registry: Arc<Registry>,
        cache: Arc<StateCache>,
        queue: Option<SubscriberQueue>,
    ) -> Self {
        let state = Arc::new(AtomicWorkerState::new(WorkerState::Running));
        let loop_state = state.clone();
        let handle = spawn(move || {
            monitor_loop(bus, &registry, &cache, queue.as_ref(), &loop_state);
            loop_state.set(WorkerState::Stopped);
        });
        Self {
            state,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// 请求停止；循环在下一轮迭代顶部退出
    pub fn stop(&self) {
        self.state
            .transition(WorkerState::Running, WorkerState::Stopping);
    }

    /// 等待线程终止
    pub fn join(mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| DriverError::ThreadPanic),
            None => Ok(()),
        }
    }
}

fn monitor_loop(
    mut bus: impl BusLine,
    registry: &Registry,
    cache: &StateCache,
    queue: Option<&SubscriberQueue>,
    state: &AtomicWorkerState,
) {
    // 启动时清掉上一个工作器留下的积压
    if let Some(queue) = queue {
        queue.drain();
    }

    loop {
        if state.get() == WorkerState::Stopping {
            trace!("monitor: stop flag observed, exiting");
            break;
        }

        let bytes = match bus.read_frame_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("monitor: bus read error: {e}");
                spin_sleep::sleep(IDLE_DELAY);
                continue;
            },
        };

        if !bytes.is_empty() {
            match decode(&bytes, registry) {
                Ok(frame) => {
                    trace!("monitor: {} {} = {}", frame.address, frame.command_code, frame.data);
                    cache.write(frame.clone());
                    if let Some(queue) = queue {
                        queue.publish(frame);
                    }
                },
                // 解码失败只丢弃这一帧，不碰缓存
                Err(e) => debug!("monitor: discarding frame: {e}"),
            }
        }

        spin_sleep::sleep(IDLE_DELAY);
    }
}
