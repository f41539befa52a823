//! 校验和计算
//!
//! 协议校验和：把报文体按 2 个字符一组拆成十六进制字节对，
//! 求和后取二补数（模 256），以两位大写十六进制呈现。
//!
//! 已知样例报文 `:510300020000AA\r\n` 的校验和为 `AA`
//! （0x51 + 0x03 + 0x00 + 0x02 + 0x00 + 0x00 = 0x56，-0x56 & 0xFF = 0xAA）。

use crate::ProtocolError;

/// 计算校验和
///
/// 输入既可以是完整帧（`b":510300020000AA\r\n"`），也可以是裸报文体
/// （`b"510300020000"`）。完整帧会先剥掉前导 `:`、结尾的 `\r\n`
/// 以及帧上自带的两位校验和，再对剩余字节求和。
///
/// # 错误
/// - `ProtocolError::Value`: 报文体含非十六进制字符
/// - `ProtocolError::Framing`: 帧太短，剥掉定界符后没有报文体
pub fn checksum(msg: &[u8]) -> Result<String, ProtocolError> {
    let mut body = msg;
    if body.first() == Some(&b':') {
        body = &body[1..];
    }
    if body.ends_with(b"\r\n") {
        // 结尾是 终止符(2) + 其前面的校验和(2)
        if body.len() < 4 {
            return Err(ProtocolError::Framing("message too short for a checksum"));
        }
        body = &body[..body.len() - 4];
    }

    let mut sum: u32 = 0;
    for pair in body.chunks(2) {
        let digits = std::str::from_utf8(pair)
            .map_err(|_| ProtocolError::Value(String::from_utf8_lossy(pair).into_owned()))?;
        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| ProtocolError::Value(digits.to_string()))?;
        sum += value;
    }

    // 二补数，截断到一个字节
    Ok(format!("{:02X}", (sum as u8).wrapping_neg()))
}
