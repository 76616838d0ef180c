//! 设备日志行
//!
//! 行格式：`<hostTime> <deviceTime> [pion.<category>] <value...>`。

use crate::error::LogLineError;
use crate::packet::{PacketDir, PacketMeta};
use std::fmt;

const CATEGORY_PREFIX: &str = "[pion.";
const CATEGORY_SUFFIX: &str = "]";

/// 一条已解析的设备日志事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLogEvent {
    pub host_time: i64,
    pub device_time: i64,
    pub category: String,
    pub value: String,
}

impl DeviceLogEvent {
    pub fn parse(line: &str) -> Result<Self, LogLineError> {
        let tokens: Vec<&str> = line.splitn(4, ' ').collect();
        let [host, device, category, value] = tokens[..] else {
            return Err(LogLineError::Malformed(line.to_string()));
        };

        let parse_time = |s: &str| {
            s.parse::<i64>()
                .map_err(|_| LogLineError::Malformed(line.to_string()))
        };
        let category = category.strip_prefix(CATEGORY_PREFIX).unwrap_or(category);
        let category = category.strip_suffix(CATEGORY_SUFFIX).unwrap_or(category);

        Ok(Self {
            host_time: parse_time(host)?,
            device_time: parse_time(device)?,
            category: category.to_string(),
            value: value.to_string(),
        })
    }

    /// 把 value 当作十进制整数
    pub fn int(&self) -> Option<i64> {
        self.value.trim().parse().ok()
    }

    /// 把 value 当作包轨迹条目：`<dir> len=<digits>`
    pub fn packet(&self) -> Result<PacketMeta, LogLineError> {
        let bad = || LogLineError::BadPacketTrace(self.value.clone());
        let (glyph, len) = self.value.trim().split_once(' ').ok_or_else(bad)?;
        let dir: PacketDir = glyph.parse().map_err(|_| bad())?;
        let digits = len.strip_prefix("len=").ok_or_else(bad)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let len = digits.parse().map_err(|_| bad())?;

        Ok(PacketMeta {
            ts: self.host_time,
            device_time: Some(self.device_time),
            dir,
            len,
        })
    }
}

impl fmt::Display for DeviceLogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}{} {}",
            self.host_time,
            self.device_time,
            CATEGORY_PREFIX,
            self.category,
            CATEGORY_SUFFIX,
            self.value
        )
    }
}
