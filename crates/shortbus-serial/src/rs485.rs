//! RS-485 后端：`serialport` 串口传输 + sysfs GPIO 方向脚
//!
//! 实机参数：38400 波特、7 数据位、无校验、2 停止位，
//! 单字节读超时 200 ms。方向脚在 Linux 上通过 sysfs 文件接口
//! 直接写入，不经过任何外部命令。

use std::io;
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::info;

use crate::{BusError, SerialTransport};

/// 总线波特率
pub const BAUD_RATE: u32 = 38_400;
/// 单字节读超时
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// `serialport` 实现的字节级传输
pub struct Rs485Transport {
    port: Box<dyn SerialPort>,
}

impl Rs485Transport {
    /// 按实机参数打开串口（如 `/dev/ttyS0`）
    pub fn open(path: &str) -> Result<Self, BusError> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Seven)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| BusError::Io(io::Error::from(e)))?;
        info!("opened {} at {} baud 7N2", path, BAUD_RATE);
        Ok(Self { port })
    }
}

impl SerialTransport for Rs485Transport {
    fn read_byte(&mut self) -> Result<u8, BusError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Err(BusError::Timeout),
            Ok(_) => Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(BusError::Timeout),
            Err(e) => Err(BusError::Io(e)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// sysfs GPIO 输出脚（仅 Linux）
///
/// 初始化时导出引脚并设为输出方向；之后 `set_high`/`set_low`
/// 只写 value 文件。
#[cfg(target_os = "linux")]
pub struct SysfsGpio {
    pin: u32,
    value_path: std::path::PathBuf,
}

#[cfg(target_os = "linux")]
impl SysfsGpio {
    pub fn export(pin: u32) -> Result<Self, BusError> {
        use std::fs;
        use std::path::Path;

        let base = Path::new("/sys/class/gpio");
        let dir = base.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(base.join("export"), pin.to_string())
                .map_err(|e| BusError::Gpio(format!("export gpio{pin}: {e}")))?;
        }
        fs::write(dir.join("direction"), "out")
            .map_err(|e| BusError::Gpio(format!("gpio{pin} direction: {e}")))?;
        info!("exported gpio{} as direction-control output", pin);
        Ok(Self {
            pin,
            value_path: dir.join("value"),
        })
    }

    fn write_value(&self, value: &str) -> Result<(), BusError> {
        std::fs::write(&self.value_path, value)
            .map_err(|e| BusError::Gpio(format!("gpio{}: {e}", self.pin)))
    }
}

#[cfg(target_os = "linux")]
impl crate::DirectionControl for SysfsGpio {
    fn set_high(&mut self) -> Result<(), BusError> {
        self.write_value("1")
    }

    fn set_low(&mut self) -> Result<(), BusError> {
        self.write_value("0")
    }
}

/// 打开实机总线：串口 + 方向脚
#[cfg(target_os = "linux")]
pub fn open_rs485(
    path: &str,
    gpio_pin: u32,
) -> Result<crate::BusDriver<Rs485Transport, SysfsGpio>, BusError> {
    let transport = Rs485Transport::open(path)?;
    let direction = SysfsGpio::export(gpio_pin)?;
    Ok(crate::BusDriver::new(transport, direction))
}
