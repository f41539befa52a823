//! 工作器层错误类型定义

use shortbus_protocol::ProtocolError;
use shortbus_serial::BusError;
use thiserror::Error;

/// 工作器层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线硬件错误
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 请求的命令类型既不是 READ 也不是 WRITE
    ///
    /// 视为总线失步的证据，工作器循环无法安全恢复，直接停机。
    #[error("Unsupported command type {code} in request for address {address}")]
    UnsupportedCommandType { address: String, code: String },

    /// 工作器线程 panic
    #[error("Worker thread panicked")]
    ThreadPanic,
}
