//! 包元信息类型
//!
//! 只记录方向与长度，不关心内容。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 包方向。`<` 表示设备发出，`>` 表示发往设备。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketDir {
    #[serde(rename = "<")]
    Outbound,
    #[serde(rename = ">")]
    Inbound,
}

impl PacketDir {
    pub fn glyph(self) -> &'static str {
        match self {
            PacketDir::Outbound => "<",
            PacketDir::Inbound => ">",
        }
    }
}

impl fmt::Display for PacketDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

impl FromStr for PacketDir {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(PacketDir::Outbound),
            ">" => Ok(PacketDir::Inbound),
            _ => Err(()),
        }
    }
}

/// 一个被观察到的包（毫秒时间戳）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketMeta {
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<i64>,
    pub dir: PacketDir,
    pub len: u32,
}

impl PacketMeta {
    pub fn new(ts: i64, dir: PacketDir, len: u32) -> Self {
        Self {
            ts,
            device_time: None,
            dir,
            len,
        }
    }
}

/// 同一逻辑包在两侧的观测合并后的收发记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketTxRx {
    pub dir: PacketDir,
    pub len: u32,
    pub tx_time: i64,
    pub rx_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<i64>,
}
