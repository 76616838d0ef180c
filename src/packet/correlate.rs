//! 包序列关联
//!
//! 按下标同步遍历设备自报序列与抓包序列，两侧在方向和长度上必须逐点一致。

use super::meta::{PacketDir, PacketMeta, PacketTxRx};
use crate::error::PacketError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 逐点不一致时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationPolicy {
    /// 数量或任一位置不一致即失败
    #[default]
    Strict,
    /// 只遍历两侧共有的长度，跳过不一致的位置
    Lenient,
}

/// 关联两侧观测。
///
/// 设备发出的包以设备侧时间为发送时间、抓包时间为接收时间；发往设备的包相反。
pub fn correlate(
    device: &[PacketMeta],
    capture: &[PacketMeta],
    policy: CorrelationPolicy,
) -> Result<Vec<PacketTxRx>, PacketError> {
    if policy == CorrelationPolicy::Strict && device.len() != capture.len() {
        return Err(PacketError::CountMismatch {
            device: device.len(),
            capture: capture.len(),
        });
    }

    let mut out = Vec::with_capacity(device.len().min(capture.len()));
    for (index, (d, c)) in device.iter().zip(capture).enumerate() {
        if d.dir != c.dir || d.len != c.len {
            match policy {
                CorrelationPolicy::Strict => return Err(PacketError::UnmatchedPacket { index }),
                CorrelationPolicy::Lenient => {
                    warn!(index, device = ?d, capture = ?c, "跳过不一致的包");
                    continue;
                }
            }
        }

        let (tx_time, rx_time) = match d.dir {
            PacketDir::Outbound => (d.ts, c.ts),
            PacketDir::Inbound => (c.ts, d.ts),
        };
        out.push(PacketTxRx {
            dir: d.dir,
            len: d.len,
            tx_time,
            rx_time,
            device_time: d.device_time,
        });
    }

    debug!(matched = out.len(), device = device.len(), capture = capture.len(), "关联完成");
    Ok(out)
}
