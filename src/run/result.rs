//! 实验结果记录
//!
//! 每次实验一条，序列化为一行 JSON。

use crate::auth::AuthenticatorReport;
use crate::capture::PacketCapture;
use crate::device::DeviceReport;
use crate::error::CaptureError;
use crate::packet::{
    CorrelationPolicy, Link, PacketMeta, ProtocolSequence, ProtocolStep, correlate, label_steps,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 单条链路的抓包与分析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpResult {
    pub link: Link,
    /// base64 编码的 pcap
    pub pcap: String,
    pub device_packets: Vec<PacketMeta>,
    pub captured_packets: Vec<PacketMeta>,
    pub exchanges: Vec<ProtocolStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub program: Vec<String>,
    pub device: DeviceReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<AuthenticatorReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_dump: Option<DumpResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_dump: Option<DumpResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.device.success
    }
}

/// 提取、关联并标注一条链路。任何一步失败只写入该链路的 `error`。
pub(crate) async fn analyze_dump(
    link: Link,
    capture: &dyn PacketCapture,
    device_packets: &[PacketMeta],
    extract_args: Result<Vec<String>, CaptureError>,
    policy: CorrelationPolicy,
) -> DumpResult {
    let mut dump = DumpResult {
        link,
        pcap: STANDARD.encode(capture.pcap()),
        device_packets: device_packets.to_vec(),
        captured_packets: Vec::new(),
        exchanges: Vec::new(),
        error: None,
    };

    let extracted = match extract_args {
        Ok(args) => capture.extract(&args).await,
        Err(e) => Err(e),
    };
    match extracted {
        Ok(pkts) => dump.captured_packets = pkts,
        Err(e) => {
            warn!(%link, error = %e, "提取失败");
            dump.error = Some(e.to_string());
            return dump;
        }
    }

    let labeled = correlate(device_packets, &dump.captured_packets, policy)
        .and_then(|pairs| label_steps(ProtocolSequence::for_link(link), &pairs));
    match labeled {
        Ok(exchanges) => {
            info!(%link, steps = exchanges.len(), "协议序列已标注");
            dump.exchanges = exchanges;
        }
        Err(e) => {
            warn!(%link, error = %e, "协议序列不匹配");
            dump.error = Some(e.to_string());
        }
    }
    dump
}
