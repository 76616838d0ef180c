//! 协议步骤声明
//!
//! 每种链路一条固定的期望交换序列；观测到的包必须被它完整解释。

use super::meta::PacketDir;
use super::meta::PacketDir::{Inbound as TO, Outbound as FROM};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 实验中被抓包的两条链路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    Direct,
    Infra,
}

impl Link {
    /// 设备日志中该链路包轨迹的类别名
    pub fn trace_category(self) -> &'static str {
        match self {
            Link::Direct => "P.direct",
            Link::Infra => "P.infra",
        }
    }

    pub fn from_trace_category(category: &str) -> Option<Link> {
        [Link::Direct, Link::Infra]
            .into_iter()
            .find(|l| l.trace_category() == category)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Direct => f.write_str("direct"),
            Link::Infra => f.write_str("infra"),
        }
    }
}

/// 序列中的一步：方向、名称、是否可缺省
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStep {
    pub dir: PacketDir,
    pub step: &'static str,
    pub optional: bool,
}

impl SequenceStep {
    pub const fn required(dir: PacketDir, step: &'static str) -> Self {
        Self {
            dir,
            step,
            optional: false,
        }
    }

    pub const fn optional(dir: PacketDir, step: &'static str) -> Self {
        Self {
            dir,
            step,
            optional: true,
        }
    }
}

/// 各链路的期望序列
pub struct ProtocolSequence;

impl ProtocolSequence {
    /// 直连链路：PAKE 与凭据下发。
    ///
    /// 设备发出 credential-response 后立即断开直连链路，最后一步可能来不及被抓到。
    pub const DIRECT: &'static [SequenceStep] = &[
        SequenceStep::required(TO, "pake-request"),
        SequenceStep::required(FROM, "pake-response"),
        SequenceStep::required(TO, "confirm-request"),
        SequenceStep::required(FROM, "ca-profile-interest"),
        SequenceStep::required(TO, "ca-profile-data"),
        SequenceStep::required(FROM, "authenticator-cert-interest"),
        SequenceStep::required(TO, "authenticator-cert-data"),
        SequenceStep::required(FROM, "confirm-response"),
        SequenceStep::required(TO, "credential-request"),
        SequenceStep::required(FROM, "temp-cert-interest"),
        SequenceStep::required(TO, "temp-cert-data"),
        SequenceStep::optional(FROM, "credential-response"),
    ];

    /// 基础设施链路：NDNCERT 签发。
    pub const INFRA: &'static [SequenceStep] = &[
        SequenceStep::required(FROM, "NEW-request"),
        SequenceStep::required(TO, "NEW-response"),
        SequenceStep::required(FROM, "CHALLENGE-start-request"),
        SequenceStep::required(TO, "CHALLENGE-start-response"),
        SequenceStep::required(FROM, "CHALLENGE-finish-request"),
        SequenceStep::required(TO, "CHALLENGE-finish-response"),
        SequenceStep::required(FROM, "device-cert-interest"),
        SequenceStep::required(TO, "device-cert-data"),
    ];

    pub fn for_link(link: Link) -> &'static [SequenceStep] {
        match link {
            Link::Direct => Self::DIRECT,
            Link::Infra => Self::INFRA,
        }
    }
}
