//! # Shortbus Driver
//!
//! 总线工作器与共享状态层，提供：
//! - 状态缓存：(地址, 命令码) 到最近一次观测帧的互斥映射
//! - Monitor 工作器：被动解码线上流量并更新缓存，可选地发布到订阅队列
//! - Spoofer 工作器：读请求、查/写缓存、合成响应冒充外设应答
//!
//! # 互斥约束
//!
//! Monitor 与 Spoofer 都假定自己独占总线的读写时序，绝不能同时
//! 运行。互斥由外部控制器仲裁，本层只在该前提下保证正确性。
//! 缓存是唯一跨工作器重启存活的共享资源。

pub mod cache;
mod error;
pub mod monitor;
pub mod spoofer;
pub mod worker;

pub use cache::StateCache;
pub use error::DriverError;
pub use monitor::{Monitor, SubscriberQueue};
pub use spoofer::Spoofer;
pub use worker::{AtomicWorkerState, WorkerState};
