//! 帧解析与构建
//!
//! 一帧就是主控与外设之间的一条完整报文。字段偏移不是固定的：
//! 命令字段与数据字段的位置同时取决于帧长分类（PRIMARY/SECONDARY）、
//! 命令类型（READ/WRITE）和报文方向（REQUEST/RESPONSE），
//! 解码时必须逐项判定。请求帧不携带显式数据长度字段。

use std::fmt;

use crate::ProtocolError;
use crate::checksum::checksum;
use crate::registry::{CMD_CURRENT_INCLINE, CMD_CURRENT_RESISTANCE, INCLINE_FAMILY,
    RESISTANCE_FAMILY, Registry};

/// PRIMARY 帧的固定总长（字节）
pub const PRIMARY_FRAME_LEN: usize = 17;

/// 帧长分类
///
/// 仅由帧的总字节数决定：17 字节为 PRIMARY，其余为 SECONDARY。
/// 分类决定命令字段与数据字段的偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    Primary,
    Secondary,
}

impl LengthClass {
    fn classify(total_len: usize) -> Self {
        if total_len == PRIMARY_FRAME_LEN {
            Self::Primary
        } else {
            Self::Secondary
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
        }
    }
}

/// 命令类型
///
/// 协议定义了 READ（`03`）和 WRITE（`06`）。其余取值在解码时保留
/// 原始码而不判为解码失败：冒充器需要看到这种帧并把它当作总线
/// 失步的证据作致命停机处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandType {
    Read,
    Write,
    /// 未定义的命令类型，保留线上的两位原始码
    Other(String),
}

impl CommandType {
    fn from_code(code: &str) -> Self {
        match code {
            "03" => Self::Read,
            "06" => Self::Write,
            other => Self::Other(other.to_string()),
        }
    }

    /// 线上的两位命令类型码
    pub fn code(&self) -> &str {
        match self {
            Self::Read => "03",
            Self::Write => "06",
            Self::Other(code) => code,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Other(_) => "ERROR",
        }
    }
}

/// 报文方向，编码在 4 位命令字段的高两位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    fn from_marker(marker: &str) -> Result<Self, ProtocolError> {
        match marker {
            "00" => Ok(Self::Request),
            "01" => Ok(Self::Response),
            other => Err(ProtocolError::InvalidDirection(other.to_string())),
        }
    }

    /// 线上的两位方向标记
    pub fn marker(self) -> &'static str {
        match self {
            Self::Request => "00",
            Self::Response => "01",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
        }
    }
}

/// 状态缓存键：地址 ++ 命令码，共 4 个十六进制字符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// 从地址与命令码拼出缓存键
    pub fn new(address: &str, command_code: &str) -> Self {
        Self(format!("{address}{command_code}"))
    }

    /// 从外部输入（如控制面板的 "5102"）解析缓存键
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::Framing("cache key must be 4 hex characters"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 键的地址部分
    pub fn address(&self) -> &str {
        &self.0[..2]
    }

    /// 键的命令码部分
    pub fn command_code(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一条已解码（或待编码）的总线报文
///
/// 解码成功后各字段只读；校验和在编码发送前的最后一刻才计算，
/// 构建出的响应帧在 [`Frame::to_wire`] 之前 `checksum` 为空。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 收到的原始字节（自行构建的帧为空）
    pub raw: Vec<u8>,
    pub length_class: LengthClass,
    /// 两位十六进制外设地址
    pub address: String,
    pub address_name: &'static str,
    pub command_type: CommandType,
    pub direction: Direction,
    /// 4 位命令字段的低两位：外设命令码
    pub command_code: String,
    pub command_name: &'static str,
    /// 声明的负载字节数。请求帧没有这个字段（None 即哨兵值）
    pub data_len: Option<u8>,
    /// ASCII 十六进制负载
    pub data: String,
    /// 帧上携带的校验和（构建出的帧在编码前为空）
    pub checksum: String,
}

impl Frame {
    /// 派生状态缓存键
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.address, &self.command_code)
    }

    /// 负载的数值（十六进制解码）
    pub fn value(&self) -> Result<u64, ProtocolError> {
        u64::from_str_radix(&self.data, 16).map_err(|_| ProtocolError::Value(self.data.clone()))
    }

    /// 负载的原始字节
    pub fn data_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        hex::decode(&self.data).map_err(|_| ProtocolError::Value(self.data.clone()))
    }

    /// 编码为线上字节
    ///
    /// 只有响应帧可编码（本系统只以被冒充外设的身份发响应）。
    /// 两种响应的成形规则不同：
    /// - READ 响应携带显式数据长度：`地址 ++ 03 ++ 长度 ++ 01|命令码 ++ 数据`
    /// - WRITE 响应没有长度字段：`地址 ++ 06 ++ 01|命令码 ++ 数据`
    ///
    /// 校验和在这里计算并追加，最终为 `:` + 报文体 + 校验和 + `\r\n`。
    pub fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.direction != Direction::Response {
            return Err(ProtocolError::EncodeUnsupported(self.direction.as_str()));
        }

        let body = match &self.command_type {
            CommandType::Read => {
                let declared = self
                    .data_len
                    .unwrap_or_else(|| (self.data.len() / 2) as u8);
                format!(
                    "{}03{:02X}01{}{}",
                    self.address, declared, self.command_code, self.data
                )
            },
            CommandType::Write => {
                format!("{}0601{}{}", self.address, self.command_code, self.data)
            },
            CommandType::Other(code) => {
                return Err(ProtocolError::UnsupportedCommandType(code.clone()));
            },
        };

        let sum = checksum(body.as_bytes())?;
        Ok(format!(":{body}{sum}\r\n").into_bytes())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[Frame] {} ({} bytes)",
            self.length_class.as_str(),
            self.raw.len()
        )?;
        writeln!(f, "  Address: ({}) {}", self.address, self.address_name)?;
        writeln!(
            f,
            "  Command type: ({}) {}",
            self.command_type.code(),
            self.command_type.as_str()
        )?;
        writeln!(
            f,
            "  Command: ({}{}) {} {}",
            self.direction.marker(),
            self.command_code,
            self.direction.as_str(),
            self.command_name
        )?;
        match self.value() {
            Ok(value) => writeln!(f, "  Data: ({}) {}", self.data, value)?,
            Err(_) => writeln!(f, "  Data: ({}) <not a number>", self.data)?,
        }
        write!(f, "  Checksum: {}", self.checksum)
    }
}

/// 解码一帧
///
/// 先校验外层帧格式（前导冒号、`\r\n` 终止符、报文体全为十六进制、
/// 校验和一致），再按帧长分类与命令类型确定各字段偏移。
/// 地址与命令码都要能在注册表里查到，查不到即解码失败。
pub fn decode(raw: &[u8], registry: &Registry) -> Result<Frame, ProtocolError> {
    if !raw.starts_with(b":") {
        return Err(ProtocolError::Framing("message does not start with ':'"));
    }
    if !raw.ends_with(b"\r\n") {
        return Err(ProtocolError::Framing("message does not end with CRLF"));
    }
    // 最短的可解析帧：地址(2) + 类型(2) + 命令(4) + 校验和(2) + 定界符(3)
    if raw.len() < 13 {
        return Err(ProtocolError::Framing("message too short"));
    }
    let body = &raw[1..raw.len() - 2];
    if body.iter().any(|b| !b.is_ascii_hexdigit()) {
        return Err(ProtocolError::Framing("message contains invalid hex characters"));
    }

    // 报文体已验证为 ASCII，转 str 后用字符偏移切片
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProtocolError::Framing("message is not valid ASCII"))?;
    let len = text.len();

    let declared_checksum = &text[len - 4..len - 2];
    let computed = checksum(raw)?;
    if declared_checksum != computed {
        return Err(ProtocolError::Checksum {
            declared: declared_checksum.to_string(),
            computed,
        });
    }

    let length_class = LengthClass::classify(len);
    let address = &text[1..3];
    let command_type = CommandType::from_code(&text[3..5]);

    // 命令字段偏移：PRIMARY 固定 5..9；SECONDARY 的 READ 帧在长度
    // 字段之后（7..11），其余仍在 5..9
    let command_field = match (length_class, &command_type) {
        (LengthClass::Secondary, CommandType::Read) => {
            if len < 15 {
                return Err(ProtocolError::Framing("message too short"));
            }
            &text[7..11]
        },
        _ => &text[5..9],
    };

    let direction = Direction::from_marker(&command_field[..2])?;
    let command_code = &command_field[2..4];

    // 请求帧不声明负载长度
    let data_len = match direction {
        Direction::Request => None,
        Direction::Response => Some(
            u8::from_str_radix(&text[5..7], 16)
                .map_err(|_| ProtocolError::Value(text[5..7].to_string()))?,
        ),
    };

    // 数据字段：PRIMARY 帧与请求帧从 9 起，SECONDARY 响应帧从 11 起
    let data_start = match (length_class, direction) {
        (LengthClass::Primary, _) | (_, Direction::Request) => 9,
        (LengthClass::Secondary, Direction::Response) => 11,
    };
    if data_start > len - 4 {
        return Err(ProtocolError::Framing("message too short"));
    }
    let data = &text[data_start..len - 4];

    let address_name = registry.address_name(address)?;
    let command_name = registry.command_name(address, command_code)?;

    Ok(Frame {
        raw: raw.to_vec(),
        length_class,
        address: address.to_string(),
        address_name,
        command_type,
        direction,
        command_code: command_code.to_string(),
        command_name,
        data_len,
        data: data.to_string(),
        checksum: declared_checksum.to_string(),
    })
}

/// 为 READ 请求构建响应帧，携带给定的数值
///
/// 数值按最少 2 字节（4 个十六进制字符）渲染，放不下时向上扩展，
/// 声明长度随实际渲染宽度走。校验和留待编码时计算。
pub fn read_response(request: &Frame, value: u64) -> Frame {
    let data = format!("{value:04X}");
    let data_len = (data.len() / 2) as u8;
    let total_len = 15 + data.len();
    Frame {
        raw: Vec::new(),
        length_class: LengthClass::classify(total_len),
        address: request.address.clone(),
        address_name: request.address_name,
        command_type: CommandType::Read,
        direction: Direction::Response,
        command_code: request.command_code.clone(),
        command_name: request.command_name,
        data_len: Some(data_len),
        data,
        checksum: String::new(),
    }
}

/// 为 WRITE 请求构建确认响应，回显刚写入的数据
pub fn write_response(request: &Frame) -> Frame {
    let total_len = 13 + request.data.len();
    Frame {
        raw: Vec::new(),
        length_class: LengthClass::classify(total_len),
        address: request.address.clone(),
        address_name: request.address_name,
        command_type: CommandType::Write,
        direction: Direction::Response,
        command_code: request.command_code.clone(),
        command_name: request.command_name,
        data_len: None,
        data: request.data.clone(),
        checksum: String::new(),
    }
}

/// WRITE 请求的协议规定副作用：坡度族的写入要同时镜像到
/// "当前坡度"，阻力族的写入要同时镜像到"当前电位器值"。
/// 真实硬件期望对期望值的写入也更新当前值的读取位置。
///
/// 返回应当额外写入缓存的镜像帧；地址不在这两个家族时返回 `None`。
pub fn mirror_write(request: &Frame, registry: &Registry) -> Option<Frame> {
    let mirrored_code = match request.address.chars().next()? {
        INCLINE_FAMILY => CMD_CURRENT_INCLINE,
        RESISTANCE_FAMILY => CMD_CURRENT_RESISTANCE,
        _ => return None,
    };
    let command_name = registry.command_name(&request.address, mirrored_code).ok()?;
    Some(Frame {
        command_code: mirrored_code.to_string(),
        command_name,
        ..request.clone()
    })
}

/// 为手工设值合成一条可入缓存的 READ 响应帧
///
/// 控制面板直接把 (地址, 命令码, 数值) 写进状态缓存时走这条路：
/// 数值按 2 字节渲染，拼出完整线上字节后经正常解码路径返回帧，
/// 保证入缓存的内容与真实流量完全同构。
pub fn preset_read_response(
    address: &str,
    command_code: &str,
    value: u64,
    registry: &Registry,
) -> Result<Frame, ProtocolError> {
    let body = format!("{address}030201{command_code}{value:04X}");
    let sum = checksum(body.as_bytes())?;
    let wire = format!(":{body}{sum}\r\n");
    decode(wire.as_bytes(), registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new()
    }

    /// 文档样例帧：PRIMARY READ 请求
    #[test]
    fn test_decode_documented_request() {
        let frame = decode(b":510300020000AA\r\n", &registry()).unwrap();
        assert_eq!(frame.length_class, LengthClass::Primary);
        assert_eq!(frame.address, "51");
        assert_eq!(frame.address_name, "Speed #1");
        assert_eq!(frame.command_type, CommandType::Read);
        assert_eq!(frame.direction, Direction::Request);
        assert_eq!(frame.command_code, "02");
        assert_eq!(frame.command_name, "Get/Set Speed (RPM)");
        assert_eq!(frame.data_len, None);
        assert_eq!(frame.data, "0000");
        assert_eq!(frame.checksum, "AA");
        assert_eq!(frame.cache_key().as_str(), "5102");
    }

    /// SECONDARY READ 响应：命令字段在长度字段之后（7..11），数据从 11 起
    #[test]
    fn test_decode_secondary_read_response() {
        let frame = preset_read_response("51", "02", 0x1234, &registry()).unwrap();
        assert_eq!(frame.raw.len(), 19);
        assert_eq!(frame.length_class, LengthClass::Secondary);
        assert_eq!(frame.command_type, CommandType::Read);
        assert_eq!(frame.direction, Direction::Response);
        assert_eq!(frame.command_code, "02");
        assert_eq!(frame.data_len, Some(2));
        assert_eq!(frame.data, "1234");
        assert_eq!(frame.value().unwrap(), 0x1234);
    }

    /// READ 响应编码后再解码，字段不变
    #[test]
    fn test_read_response_round_trip() {
        let reg = registry();
        let request = decode(b":510300020000AA\r\n", &reg).unwrap();
        let response = read_response(&request, 16);
        let wire = response.to_wire().unwrap();
        let reparsed = decode(&wire, &reg).unwrap();
        assert_eq!(reparsed.address, "51");
        assert_eq!(reparsed.command_type, CommandType::Read);
        assert_eq!(reparsed.direction, Direction::Response);
        assert_eq!(reparsed.command_code, "02");
        assert_eq!(reparsed.data, "0010");
        assert_eq!(reparsed.data_len, Some(2));
    }

    /// WRITE 响应是 17 字节（PRIMARY），没有长度字段
    #[test]
    fn test_write_response_round_trip() {
        let reg = registry();
        // 对坡度电机 #1 写期望坡度 0x0064
        let body = "410600010064";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let request = decode(wire.as_bytes(), &reg).unwrap();
        assert_eq!(request.direction, Direction::Request);

        let response = write_response(&request);
        let bytes = response.to_wire().unwrap();
        assert_eq!(bytes.len(), 17);

        let reparsed = decode(&bytes, &reg).unwrap();
        assert_eq!(reparsed.length_class, LengthClass::Primary);
        assert_eq!(reparsed.command_type, CommandType::Write);
        assert_eq!(reparsed.direction, Direction::Response);
        assert_eq!(reparsed.command_code, "01");
        assert_eq!(reparsed.data, "0064");
    }

    /// 请求帧不可编码
    #[test]
    fn test_encode_request_unsupported() {
        let frame = decode(b":510300020000AA\r\n", &registry()).unwrap();
        let err = frame.to_wire().unwrap_err();
        assert!(matches!(err, ProtocolError::EncodeUnsupported(_)));
    }

    /// 未定义的命令类型保留原始码解码成功，编码报错
    #[test]
    fn test_unknown_command_type_survives_decode() {
        let body = "219900010000";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let frame = decode(wire.as_bytes(), &registry()).unwrap();
        assert_eq!(frame.command_type, CommandType::Other("99".to_string()));
        assert_eq!(frame.command_type.as_str(), "ERROR");
    }

    #[test]
    fn test_framing_errors() {
        let reg = registry();
        assert!(matches!(
            decode(b"510300020000AA\r\n", &reg).unwrap_err(),
            ProtocolError::Framing(_)
        ));
        assert!(matches!(
            decode(b":510300020000AA", &reg).unwrap_err(),
            ProtocolError::Framing(_)
        ));
        assert!(matches!(
            decode(b":5103000Z0000AA\r\n", &reg).unwrap_err(),
            ProtocolError::Framing(_)
        ));
        assert!(matches!(
            decode(b":51\r\n", &reg).unwrap_err(),
            ProtocolError::Framing(_)
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let err = decode(b":510300020000AB\r\n", &registry()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Checksum { declared, computed }
                if declared == "AB" && computed == "AA"
        ));
    }

    /// 方向标记既不是 00 也不是 01 时解码失败
    #[test]
    fn test_invalid_direction() {
        let body = "510302020000";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let err = decode(wire.as_bytes(), &registry()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidDirection(m) if m == "02"));
    }

    /// 注册表查不到的地址/命令都是解码错误
    #[test]
    fn test_unknown_address_and_command() {
        let reg = registry();
        let body = "990300020000";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        assert!(matches!(
            decode(wire.as_bytes(), &reg).unwrap_err(),
            ProtocolError::UnknownAddress(_)
        ));

        let body = "210300FF0000";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        assert!(matches!(
            decode(wire.as_bytes(), &reg).unwrap_err(),
            ProtocolError::UnknownCommand { .. }
        ));
    }

    /// 坡度族 WRITE 的镜像：期望坡度 -> 当前坡度，数据不变
    #[test]
    fn test_mirror_write_incline() {
        let reg = registry();
        let body = "410600010064";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let request = decode(wire.as_bytes(), &reg).unwrap();

        let mirror = mirror_write(&request, &reg).unwrap();
        assert_eq!(mirror.command_code, "02");
        assert_eq!(mirror.command_name, "Current Incline");
        assert_eq!(mirror.data, request.data);
        assert_eq!(mirror.cache_key().as_str(), "4102");
    }

    /// 阻力族镜像到 "Current Pot Value"，其他地址没有镜像
    #[test]
    fn test_mirror_write_resistance_and_none() {
        let reg = registry();
        let body = "610600050010";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let request = decode(wire.as_bytes(), &reg).unwrap();
        let mirror = mirror_write(&request, &reg).unwrap();
        assert_eq!(mirror.command_name, "Current Pot Value");
        assert_eq!(mirror.cache_key().as_str(), "6106");

        let body = "210600010064";
        let wire = format!(":{}{}\r\n", body, checksum(body.as_bytes()).unwrap());
        let request = decode(wire.as_bytes(), &reg).unwrap();
        assert!(mirror_write(&request, &reg).is_none());
    }

    #[test]
    fn test_cache_key_parse() {
        let key = CacheKey::parse("5102").unwrap();
        assert_eq!(key.address(), "51");
        assert_eq!(key.command_code(), "02");
        assert!(CacheKey::parse("51").is_err());
        assert!(CacheKey::parse("51XX").is_err());
    }

    /// 负载为空或非法时 value() 报错而不是 panic
    #[test]
    fn test_value_of_empty_data() {
        let reg = registry();
        let mut frame = decode(b":510300020000AA\r\n", &reg).unwrap();
        frame.data = String::new();
        assert!(matches!(frame.value(), Err(ProtocolError::Value(_))));
    }
}
