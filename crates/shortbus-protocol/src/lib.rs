//! # Shortbus Protocol
//!
//! 健身器材控制台总线（半双工 RS-485）协议的编解码（无硬件依赖）
//!
//! ## 模块
//!
//! - `checksum`: 校验和计算（十六进制字节对求和的二补数）
//! - `frame`: 帧解析与构建（报文方向、命令类型、按帧长选择的字段偏移）
//! - `registry`: 外设地址与命令码的静态注册表
//!
//! ## 报文格式
//!
//! 报文为 ASCII 十六进制文本，以 `:` 开头、`\r\n` 结尾：
//!
//! ```text
//! :AATTLLCCCCDD..DDSS\r\n    (READ 响应，带显式数据长度 LL)
//! :AATTCCCCDD..DDSS\r\n      (WRITE 响应，无长度字段)
//! ```
//!
//! 总长 17 字节的帧归类为 PRIMARY，其余为 SECONDARY；
//! 两类帧的命令字段与数据字段偏移不同，解码时必须按类区分。

pub mod checksum;
pub mod frame;
pub mod registry;

pub use checksum::checksum;
pub use frame::{
    CacheKey, CommandType, Direction, Frame, LengthClass, decode, mirror_write,
    preset_read_response, read_response, write_response,
};
pub use registry::Registry;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 外层帧格式损坏（缺分隔符、非十六进制字符、长度不足）
    #[error("Framing error: {0}")]
    Framing(&'static str),

    /// 校验和不匹配
    #[error("Checksum mismatch: declared {declared}, computed {computed}")]
    Checksum { declared: String, computed: String },

    /// 注册表中不存在该外设地址
    #[error("Unknown peripheral address: {0}")]
    UnknownAddress(String),

    /// 该地址（或地址组）的命令表中不存在该命令码
    #[error("Unknown command {command} for address {address}")]
    UnknownCommand { address: String, command: String },

    /// 命令字段高字节不是合法的方向标记（`00` 请求 / `01` 响应）
    #[error("Invalid direction marker: {0}")]
    InvalidDirection(String),

    /// 命令类型不是 READ/WRITE，无法为其构建响应
    #[error("Unsupported command type: {0}")]
    UnsupportedCommandType(String),

    /// 请求帧没有编码形式（本系统只作为被冒充的外设发出响应）
    #[error("Encoding {0} frames is not supported")]
    EncodeUnsupported(&'static str),

    /// 数据字段不是合法的十六进制数值
    #[error("Invalid hex value: {0:?}")]
    Value(String),
}
