//! 外设地址与命令码注册表
//!
//! 总线采用单主多从寻址：每个外设有一个两位十六进制地址，
//! 每个地址（或地址族）有自己的一张命令表。
//!
//! 地址族：`3x`/`4x`/`5x`/`6x`/`7x` 五个三字符宽的家族
//! （接近传感器、坡度电机、速度、阻力电机、风扇）共享同一张命令表，
//! 查表时只取地址的首位数字。
//!
//! 注册表在进程启动时构建一次，之后只读。查找失败一律报错，
//! 绝不静默回退到默认值。

use std::collections::HashMap;

use crate::ProtocolError;

/// 坡度电机地址族的首位数字（`41`..`49`）
pub const INCLINE_FAMILY: char = '4';
/// 阻力电机地址族的首位数字（`61`..`69`）
pub const RESISTANCE_FAMILY: char = '6';

/// 坡度族"当前坡度"命令码。对期望坡度的写入要镜像到这里。
pub const CMD_CURRENT_INCLINE: &str = "02";
/// 阻力族"当前电位器值"命令码。对期望阻力的写入要镜像到这里。
pub const CMD_CURRENT_RESISTANCE: &str = "06";

/// 共享命令表的地址族首位数字
const GROUPED_FAMILIES: [char; 5] = ['3', '4', '5', '6', '7'];

const ADDRESS_NAMES: &[(&str, &str)] = &[
    ("21", "Motor Controller"),
    ("22", "Upright Low Voltage Motor Controller"),
    ("23", "Crawler"),
    ("24", "Console Tilt"),
    ("25", "Torque Sensor"),
    ("26", "Strider (!!DEPRECATED!!)"),
    ("27", "Accelerometer"),
    ("28", "Drive Motor PWM"),
    ("29", "Vibration Motor"),
    ("30", "Proximity Sensor (Reserved)"),
    ("31", "Proximity Sensor #1"),
    ("32", "Proximity Sensor #2"),
    ("33", "Proximity Sensor #3"),
    ("34", "Proximity Sensor #4"),
    ("35", "Proximity Sensor #5"),
    ("36", "Proximity Sensor #6"),
    ("37", "Proximity Sensor #7"),
    ("38", "Proximity Sensor #8"),
    ("39", "Proximity Sensor #9"),
    ("40", "Incline (Reserved)"),
    ("41", "Incline Motor #1"),
    ("42", "Incline Motor #2"),
    ("43", "Incline Motor #3"),
    ("44", "Incline Motor #4"),
    ("45", "Incline Motor #5"),
    ("46", "Incline Motor #6"),
    ("47", "Incline Motor #7"),
    ("48", "Incline Motor #8"),
    ("49", "Incline Motor #9"),
    ("50", "Speed (Reserved)"),
    ("51", "Speed #1"),
    ("52", "Speed #2"),
    ("53", "Speed #3"),
    ("54", "Speed #4"),
    ("55", "Speed #5"),
    ("56", "Speed #6"),
    ("57", "Speed #7"),
    ("58", "Speed #8"),
    ("59", "Speed #9"),
    ("60", "Resistance (Reserved)"),
    ("61", "Resistance Motor #1"),
    ("62", "Resistance Motor #2"),
    ("63", "Resistance Motor #3"),
    ("64", "Resistance Motor #4"),
    ("65", "Resistance Motor #5"),
    ("66", "Resistance Motor #6"),
    ("67", "Resistance Motor #7"),
    ("68", "Resistance Motor #8"),
    ("69", "Resistance Motor #9"),
    ("70", "Fan (Reserved)"),
    ("71", "Fan Motor #1"),
    ("72", "Fan Motor #2"),
    ("73", "Fan Motor #3"),
    ("74", "Fan Motor #4"),
    ("75", "Fan Motor #5"),
    ("76", "Fan Motor #6"),
    ("77", "Fan Motor #7"),
    ("78", "Fan Motor #8"),
    ("79", "Fan Motor #9"),
    ("E1", "Heart Rate"),
    ("E2", "BLE Speed Ring"),
    ("E3", "BLE Radio (!!DEPRECATED!!)"),
    ("E4", "BLE Radio (!!DEPRECATED!!)"),
    ("E5", "BLE Radio (!!DEPRECATED!!)"),
    ("E6", "BLE Radio (!!DEPRECATED!!)"),
];

// Motor Controller (21)
const ADDR_21_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Desired Speed"),
    ("02", "Current Speed"),
    ("03", "Stride Current"),
    ("04", "Speed Slope"),
    ("05", "Speed Intercept"),
    ("06", "Volts 2 PWM"),
    ("07", "Max Speed"),
    ("08", "Min Speed"),
    ("09", "Current Limit"),
    ("0A", "Error Codes"),
    ("0B", "Motor Volts"),
    ("0C", "HV Bus Volts"),
    ("0D", "Motor Current"),
    ("0E", "Calibrate Speed"),
    ("0F", "Roller Size"),
    ("10", "Roller Pulley Size"),
    ("11", "Motor Pulley Size"),
    ("12", "AC Input"),
    ("13", "Acceleration Rate"),
    ("14", "Deceleration Rate"),
];

// Upright Low Voltage Motor Controller (22)
const ADDR_22_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Move Motors #1 and #2 UP"),
    ("02", "Move Motors #1 and #2 DOWN"),
    ("03", "Brake to Vcc"),
    ("04", "Brake to GND"),
    ("05", "Desired Position"),
    ("06", "Current Position"),
    ("07", "Move Motor #1 UP"),
    ("08", "Move Motor #1 DOWN"),
    ("09", "Move Motor #2 UP"),
    ("0A", "Move Motor #2 DOWN"),
    ("0B", "Stop ALL Motors"),
    ("0C", "Zero Motors"),
    ("0D", "Get Motor #1 Pot Value"),
    ("0E", "Get Motor #2 Pot Value"),
    ("0F", "Get Non-Volatile data (16 bytes)"),
    ("10", "Hall FX Sensor"),
];

// Crawler (23)
const ADDR_23_COMMANDS: &[(&str, &str)] =
    &[("00", "RESERVED"), ("01", "Command #1"), ("02", "Command #2")];

// Console Tilt (24)
const ADDR_24_COMMANDS: &[(&str, &str)] =
    &[("00", "RESERVED"), ("01", "Command #1"), ("02", "Command #2")];

// Torque Sensor (25)
const ADDR_25_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Current Watts"),
    ("02", "Desired Watts"),
    ("03", "Torque Magnet Offset"),
    ("04", "Spring Constant #1"),
    ("05", "Spring Constant #2"),
];

// Strider (26)
const ADDR_26_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Stride Direction"),
    ("02", "Total Stride Length"),
    ("03", "Current Stride Position"),
    ("04", "Stride Speed"),
];

// Accelerometer (27)
const ADDR_27_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Device ID"),
    ("02", "Axis Data"),
    ("03", "Get Slope Data (%)"),
    ("04", "XYZ Axis Configuration"),
    ("05", "Get Device State"),
    ("06", "Arm Length (mm)"),
    ("07", "Arc Total Distance (m)"),
    ("08", "Arc Speed (kph*100)"),
    ("C0", "Control Registers"),
    ("C1", "Control Registers #1"),
    ("C2", "Control Registers #2"),
    ("C3", "Control Registers #3"),
    ("C4", "Control Registers #4"),
    ("C5", "Control Registers #5"),
];

// Drive Motor PWM (28)
const ADDR_28_COMMANDS: &[(&str, &str)] = &[("00", "RESERVED"), ("01", "PWM Out")];

// Vibration Motor (29)
const ADDR_29_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Frequency"),
    ("02", "Amplitude"),
    ("03", "Timer"),
];

// Proximity Sensor (3x)
const ADDR_3X_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Get Sensor Reading"),
    ("02", "Set Sensor Sensitivity"),
    ("03", "Enable/Disable Sensor"),
];

// Incline (4x)
const ADDR_4X_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Desired Incline"),
    ("02", "Current Incline"),
    ("03", "Calibrate Incline"),
    ("04", "Stop Incline"),
    ("05", "Trans Max"),
    ("06", "Min Incline"),
    ("07", "Max Incline"),
    ("08", "Actual Incline"),
    ("09", "Negative Incline Offset"),
    ("0A", "Incline UP"),
    ("0B", "Incline DOWN"),
    ("0C", "Trans Zero"),
    ("0D", "Incline Use"),
    ("0E", "Max Incline Up PWM"),
    ("0F", "Max Incline Down PWM"),
    ("10", "Desired Trans Value"),
    ("11", "Current Trans Value"),
    ("12", "Trans Offset Up"),
    ("13", "Trans Offset Down"),
    ("14", "Trans Reposition Limit"),
    ("15", "Feedback Timeout"),
    ("16", "Open Loop PWM"),
    ("17", "Trans Max Reduction"),
];

// Speed (5x)
const ADDR_5X_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Get/Set Speed (MPH)"),
    ("02", "Get/Set Speed (RPM)"),
    ("03", "Get/Set Precise Speed (RPM)"),
    ("04", "Cadence"),
    ("05", "Pedal Position"),
];

// Resistance (6x)
const ADDR_6X_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Move Motor UP"),
    ("02", "Move Motor DOWN"),
    ("03", "Stop Motor"),
    ("04", "Calibrate Motor"),
    ("05", "Desired Pot Value"),
    ("06", "Current Pot Value"),
    ("07", "Min Pot Value"),
    ("08", "Max Pot Value"),
    ("09", "Target Voltage"),
    ("0A", "Step Loss"),
];

// Fan (7x)
const ADDR_7X_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Frequency"),
    ("02", "PWM"),
    ("03", "Min PWM"),
    ("04", "Max PWM"),
];

// Heart Rate (E1)
const ADDR_E1_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Heart Rate Measurement"),
    ("02", "HR Monitor Battery Level"),
    ("03", "Get Transciever State"),
    ("04", "Scan for Devices"),
    ("05", "Get # of Device Found"),
    ("06", "Connect to Device"),
    ("07", "Get Device ID#"),
    ("08", "Get Device Name"),
    ("09", "Get Signal Strength"),
];

// BLE Speed Ring (E2)
const ADDR_E2_COMMANDS: &[(&str, &str)] = &[
    ("00", "RESERVED"),
    ("01", "Remote Keys"),
    ("02", "Ring Remote Battery Level"),
    ("03", "Get Transciever State"),
    ("04", "Scan for Devices"),
    ("05", "Get # of Devices Found"),
    ("06", "Connect to Device"),
    ("07", "Get Device ID#"),
    ("08", "Get Device Name"),
    ("09", "Get Signal Strength"),
];

/// 命令表索引：独立地址用完整两位地址作键，地址族用首位数字作键
const COMMAND_TABLES: &[(&str, &[(&str, &str)])] = &[
    ("21", ADDR_21_COMMANDS),
    ("22", ADDR_22_COMMANDS),
    ("23", ADDR_23_COMMANDS),
    ("24", ADDR_24_COMMANDS),
    ("25", ADDR_25_COMMANDS),
    ("26", ADDR_26_COMMANDS),
    ("27", ADDR_27_COMMANDS),
    ("28", ADDR_28_COMMANDS),
    ("29", ADDR_29_COMMANDS),
    ("3", ADDR_3X_COMMANDS),
    ("4", ADDR_4X_COMMANDS),
    ("5", ADDR_5X_COMMANDS),
    ("6", ADDR_6X_COMMANDS),
    ("7", ADDR_7X_COMMANDS),
    ("E1", ADDR_E1_COMMANDS),
    ("E2", ADDR_E2_COMMANDS),
];

/// 地址/命令注册表
///
/// 构建一次后只读，可安全地在线程间通过 `Arc` 共享。
#[derive(Debug)]
pub struct Registry {
    addresses: HashMap<&'static str, &'static str>,
    commands: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl Registry {
    /// 从内置的静态表构建注册表
    pub fn new() -> Self {
        let addresses = ADDRESS_NAMES.iter().copied().collect();
        let commands = COMMAND_TABLES
            .iter()
            .map(|(key, table)| (*key, table.iter().copied().collect()))
            .collect();
        Self { addresses, commands }
    }

    /// 查外设地址的可读名称
    pub fn address_name(&self, address: &str) -> Result<&'static str, ProtocolError> {
        self.addresses
            .get(address)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownAddress(address.to_string()))
    }

    /// 查命令码的可读名称
    ///
    /// 地址落在共享命令表的地址族里时，按地址的首位数字选表。
    pub fn command_name(
        &self,
        address: &str,
        command_code: &str,
    ) -> Result<&'static str, ProtocolError> {
        let table = self
            .commands
            .get(Self::table_key(address))
            .ok_or_else(|| ProtocolError::UnknownCommand {
                address: address.to_string(),
                command: command_code.to_string(),
            })?;
        table
            .get(command_code)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownCommand {
                address: address.to_string(),
                command: command_code.to_string(),
            })
    }

    /// 地址是否属于共享命令表的地址族
    pub fn is_grouped(address: &str) -> bool {
        address
            .chars()
            .next()
            .is_some_and(|c| GROUPED_FAMILIES.contains(&c))
    }

    fn table_key(address: &str) -> &str {
        if Self::is_grouped(address) {
            &address[..1]
        } else {
            address
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_lookup() {
        let registry = Registry::new();
        assert_eq!(registry.address_name("21").unwrap(), "Motor Controller");
        assert_eq!(registry.address_name("51").unwrap(), "Speed #1");
        assert_eq!(registry.address_name("E1").unwrap(), "Heart Rate");
    }

    #[test]
    fn test_unknown_address() {
        let registry = Registry::new();
        let err = registry.address_name("99").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAddress(a) if a == "99"));
    }

    /// 地址族共享命令表，按首位数字选表
    #[test]
    fn test_grouped_family_lookup() {
        let registry = Registry::new();
        // 任意一台坡度电机都落在 4x 表里
        assert_eq!(registry.command_name("41", "01").unwrap(), "Desired Incline");
        assert_eq!(registry.command_name("49", "02").unwrap(), "Current Incline");
        // 速度族
        assert_eq!(
            registry.command_name("51", "02").unwrap(),
            "Get/Set Speed (RPM)"
        );
        // 阻力族
        assert_eq!(
            registry.command_name("65", CMD_CURRENT_RESISTANCE).unwrap(),
            "Current Pot Value"
        );
    }

    /// 独立地址用自己的表
    #[test]
    fn test_dedicated_table_lookup() {
        let registry = Registry::new();
        assert_eq!(registry.command_name("21", "0A").unwrap(), "Error Codes");
        assert_eq!(registry.command_name("27", "C0").unwrap(), "Control Registers");
    }

    #[test]
    fn test_unknown_command() {
        let registry = Registry::new();
        let err = registry.command_name("21", "FF").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand { .. }));
    }

    /// E3-E6 有地址名但没有命令表：地址可查，命令查找报错
    #[test]
    fn test_deprecated_radio_has_no_commands() {
        let registry = Registry::new();
        assert!(registry.address_name("E3").is_ok());
        assert!(registry.command_name("E3", "01").is_err());
    }

    #[test]
    fn test_is_grouped() {
        assert!(Registry::is_grouped("41"));
        assert!(Registry::is_grouped("79"));
        assert!(!Registry::is_grouped("21"));
        assert!(!Registry::is_grouped("E1"));
    }
}
