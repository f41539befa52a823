//! # Shortbus Serial
//!
//! 半双工总线的硬件抽象层。
//!
//! 总线只有一条物理串行线，方向由一个数字输出控制：收发切换后
//! 必须等一小段稳定时间再传输字节。[`BusDriver`] 在字节流之上
//! 实现按帧读写；具体的串口与方向脚实现通过 [`SerialTransport`]
//! 和 [`DirectionControl`] 注入，测试用脚本化替身即可。

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub mod rs485;

pub use rs485::Rs485Transport;
#[cfg(target_os = "linux")]
pub use rs485::SysfsGpio;
#[cfg(target_os = "linux")]
pub use rs485::open_rs485;

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("GPIO error: {0}")]
    Gpio(String),
}

/// 单帧读入的硬上限（字节）。实测报文多在 15-30 字节。
pub const MAX_FRAME_BYTES: usize = 256;

/// 方向切换后的稳定等待
pub const DIRECTION_SETTLE: Duration = Duration::from_millis(5);

/// 字节级串行传输
///
/// 每次读一个字节，带传输自身的超时（实测约 200 ms）。
pub trait SerialTransport {
    /// 读一个字节；超时窗口内无数据返回 `BusError::Timeout`
    fn read_byte(&mut self) -> Result<u8, BusError>;
    /// 写出全部字节
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BusError>;
}

/// 方向控制输出（RS-485 收发使能脚）
pub trait DirectionControl {
    fn set_high(&mut self) -> Result<(), BusError>;
    fn set_low(&mut self) -> Result<(), BusError>;
}

/// 帧级总线访问
///
/// Monitor 与 Spoofer 工作器只依赖这个 trait；同一时刻只能有一个
/// 工作器占有总线，互斥由外部控制器保证。
pub trait BusLine {
    /// 读一帧的原始字节；总线安静时返回空
    fn read_frame_bytes(&mut self) -> Result<Vec<u8>, BusError>;
    /// 发送一帧的原始字节
    fn write_frame_bytes(&mut self, bytes: &[u8]) -> Result<(), BusError>;
}

/// 半双工总线驱动
///
/// 独占一条物理线：收发前先切方向脚并等稳定时间，然后逐字节
/// 读到换行终止符或硬上限为止。缓冲区中段出现前导冒号时丢弃
/// 它之前的字节（对残帧/杂讯重新同步）；完全没有冒号时把原始
/// 杂讯原样返回，交给编解码层拒绝。
pub struct BusDriver<T, D> {
    transport: T,
    direction: D,
}

impl<T: SerialTransport, D: DirectionControl> BusDriver<T, D> {
    pub fn new(transport: T, direction: D) -> Self {
        Self { transport, direction }
    }

    /// 切换收/发方向，随后等待稳定时间
    pub fn set_transmit_enabled(&mut self, enabled: bool) -> Result<(), BusError> {
        if enabled {
            self.direction.set_high()?;
        } else {
            self.direction.set_low()?;
        }
        spin_sleep::sleep(DIRECTION_SETTLE);
        Ok(())
    }
}

impl<T: SerialTransport, D: DirectionControl> BusLine for BusDriver<T, D> {
    fn read_frame_bytes(&mut self) -> Result<Vec<u8>, BusError> {
        self.set_transmit_enabled(false)?;

        let mut buf = Vec::new();
        match self.transport.read_byte() {
            Ok(byte) => buf.push(byte),
            // 总线安静：空读不是错误
            Err(BusError::Timeout) => return Ok(buf),
            Err(e) => return Err(e),
        }

        for _ in 0..MAX_FRAME_BYTES {
            match self.transport.read_byte() {
                Ok(byte) => {
                    buf.push(byte);
                    if byte == b'\n' {
                        break;
                    }
                },
                Err(BusError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }

        match buf.iter().position(|&b| b == b':') {
            Some(0) => {},
            Some(idx) => {
                // 帧头前挂着上一帧的尾巴或杂讯，重新同步到冒号
                buf.drain(..idx);
            },
            None => {
                warn!(
                    "read {} bytes with no start-of-frame colon; returning them anyway",
                    buf.len()
                );
            },
        }

        Ok(buf)
    }

    fn write_frame_bytes(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.set_transmit_enabled(true)?;
        self.transport.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// 脚本化传输：预先排好的字节序列，耗尽后一直超时
    struct ScriptedTransport {
        incoming: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(bytes: &[u8]) -> Self {
            Self {
                incoming: bytes.iter().copied().collect(),
                written: Vec::new(),
            }
        }
    }

    impl SerialTransport for ScriptedTransport {
        fn read_byte(&mut self) -> Result<u8, BusError> {
            self.incoming.pop_front().ok_or(BusError::Timeout)
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), BusError> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }
    }

    /// 记录电平变化的假方向脚
    #[derive(Clone, Default)]
    struct RecordingPin {
        levels: Arc<Mutex<Vec<bool>>>,
    }

    impl DirectionControl for RecordingPin {
        fn set_high(&mut self) -> Result<(), BusError> {
            self.levels.lock().unwrap().push(true);
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), BusError> {
            self.levels.lock().unwrap().push(false);
            Ok(())
        }
    }

    #[test]
    fn test_read_complete_frame() {
        let pin = RecordingPin::default();
        let mut bus = BusDriver::new(ScriptedTransport::new(b":510300020000AA\r\n"), pin.clone());
        let frame = bus.read_frame_bytes().unwrap();
        assert_eq!(frame, b":510300020000AA\r\n");
        // 读之前必须先把方向脚拉低
        assert_eq!(pin.levels.lock().unwrap().as_slice(), &[false]);
    }

    /// 帧头前的杂讯被丢弃，从冒号重新同步
    #[test]
    fn test_resync_to_colon() {
        let mut bus = BusDriver::new(
            ScriptedTransport::new(b"\x00\xff:510300020000AA\r\n"),
            RecordingPin::default(),
        );
        let frame = bus.read_frame_bytes().unwrap();
        assert_eq!(frame, b":510300020000AA\r\n");
    }

    /// 没有冒号的纯杂讯原样返回，由编解码层拒绝
    #[test]
    fn test_noise_passed_through() {
        let mut bus = BusDriver::new(
            ScriptedTransport::new(b"garbage\n"),
            RecordingPin::default(),
        );
        let frame = bus.read_frame_bytes().unwrap();
        assert_eq!(frame, b"garbage\n");
    }

    /// 安静的总线返回空读
    #[test]
    fn test_quiet_bus_reads_empty() {
        let mut bus = BusDriver::new(ScriptedTransport::new(b""), RecordingPin::default());
        assert!(bus.read_frame_bytes().unwrap().is_empty());
    }

    /// 读到换行就停，不吞下一帧
    #[test]
    fn test_stops_at_newline() {
        let mut bus = BusDriver::new(
            ScriptedTransport::new(b":510300020000AA\r\n:41"),
            RecordingPin::default(),
        );
        let frame = bus.read_frame_bytes().unwrap();
        assert_eq!(frame, b":510300020000AA\r\n");
    }

    /// 无终止符的洪流止步于硬上限
    #[test]
    fn test_read_cap() {
        let flood = vec![b'A'; MAX_FRAME_BYTES * 2];
        let mut bus = BusDriver::new(ScriptedTransport::new(&flood), RecordingPin::default());
        let frame = bus.read_frame_bytes().unwrap();
        assert_eq!(frame.len(), MAX_FRAME_BYTES + 1);
    }

    #[test]
    fn test_write_raises_direction_first() {
        let pin = RecordingPin::default();
        let mut bus = BusDriver::new(ScriptedTransport::new(b""), pin.clone());
        bus.write_frame_bytes(b":4106010100642F\r\n").unwrap();
        assert_eq!(pin.levels.lock().unwrap().as_slice(), &[true]);
    }
}
