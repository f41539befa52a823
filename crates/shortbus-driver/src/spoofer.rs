//! Spoofer 工作器
//!
//! 主动冒充外设：读主控发出的请求帧，查/写状态缓存，合成响应
//! 并发回总线。
//!
//! - READ 请求：用缓存值应答；缓存未命中不是错误，记一条警告并
//!   跳过（多半是冒充开始得太晚，没赶上外设建立真实状态）。
//! - WRITE 请求：把请求帧本身写入缓存（不是合成的响应），回一条
//!   回显数据的确认，并执行协议规定的副作用：坡度/阻力家族的
//!   写入要镜像到对应的"当前值"命令码。
//! - 其他命令类型：视为总线失步，致命停机并向控制器上报。

use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;

use shortbus_protocol::{
    CommandType, Registry, decode, mirror_write, read_response, write_response,
};
use shortbus_serial::BusLine;
use tracing::{debug, error, info, warn};

use crate::cache::StateCache;
use crate::error::DriverError;
use crate::monitor::SubscriberQueue;
use crate::worker::{AtomicWorkerState, WorkerState};

/// 空读/每轮响应后的空转等待
const IDLE_DELAY: Duration = Duration::from_millis(10);

/// Spoofer 工作器句柄
///
/// 与 [`crate::Monitor`] 互斥使用：两者都独占总线时序，外部控制器
/// 必须保证同一时刻只有一个在运行。`join()` 返回循环的终止结果，
/// 致命错误（未定义的命令类型）从这里浮出。
pub struct Spoofer {
    state: Arc<AtomicWorkerState>,
    handle: Option<JoinHandle<Result<(), DriverError>>>,
    queue: Option<SubscriberQueue>,
}

impl Spoofer {
    /// 启动冒充线程
    pub fn spawn(
        bus: impl BusLine + Send + 'static,
        registry: Arc<Registry>,
        cache: Arc<StateCache>,
        queue: Option<SubscriberQueue>,
    ) -> Self {
        let state = Arc::new(AtomicWorkerState::new(WorkerState::Running));
        let loop_state = state.clone();
        let handle = spawn(move || {
            let result = spoofer_loop(bus, &registry, &cache, &loop_state);
            if let Err(e) = &result {
                error!("spoofer terminated: {e}");
            }
            loop_state.set(WorkerState::Stopped);
            result
        });
        Self {
            state,
            handle: Some(handle),
            queue,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// 请求停止，并清掉订阅队列里积压的帧
    pub fn stop(&self) {
        self.state
            .transition(WorkerState::Running, WorkerState::Stopping);
        if let Some(queue) = &self.queue {
            queue.drain();
        }
    }

    /// 等待线程终止并取回循环结果
    ///
    /// 循环因致命错误退出时从这里拿到 `Err`，控制器据此决定是否
    /// 重启；总线本身仍可供新工作器使用。
    pub fn join(mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| DriverError::ThreadPanic)?,
            None => Ok(()),
        }
    }
}

fn spoofer_loop(
    mut bus: impl BusLine,
    registry: &Registry,
    cache: &StateCache,
    state: &AtomicWorkerState,
) -> Result<(), DriverError> {
    loop {
        if state.get() == WorkerState::Stopping {
            debug!("spoofer: stop flag observed, exiting");
            return Ok(());
        }

        let bytes = bus.read_frame_bytes()?;
        if bytes.is_empty() {
            spin_sleep::sleep(IDLE_DELAY);
            continue;
        }

        // 解码失败静默重试：冒充中途的坏帧不值得停机
        let request = match decode(&bytes, registry) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("spoofer: ignoring undecodable request: {e}");
                spin_sleep::sleep(IDLE_DELAY);
                continue;
            },
        };
        let key = request.cache_key();

        let response = match &request.command_type {
            CommandType::Read => {
                let Some(cached) = cache.read(&key) else {
                    warn!(
                        "spoofer: no cached value to answer READ {key} \
                        ({} / {}); was spoofing started after the machine \
                        established its state?",
                        request.address_name, request.command_name
                    );
                    continue;
                };
                let value = match cached.value() {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("spoofer: cached entry for {key} has no numeric data: {e}");
                        continue;
                    },
                };
                read_response(&request, value)
            },
            CommandType::Write => {
                info!(
                    "spoofer: write {} {}: {}",
                    request.address_name, request.command_name, request.data
                );
                cache.write(request.clone());
                // 协议副作用：镜像写不单独应答，走同一条缓存写入路径
                if let Some(mirror) = mirror_write(&request, registry) {
                    cache.write(mirror);
                }
                write_response(&request)
            },
            CommandType::Other(code) => {
                error!(
                    "spoofer: request for address {} carries unsupported command type {}; \
                    the bus is probably desynchronized, stopping",
                    request.address, code
                );
                return Err(DriverError::UnsupportedCommandType {
                    address: request.address.clone(),
                    code: code.clone(),
                });
            },
        };

        let wire = response.to_wire()?;
        bus.write_frame_bytes(&wire)?;
        spin_sleep::sleep(IDLE_DELAY);
    }
}
