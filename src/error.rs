//! 错误类型
//!
//! 按传播范围划分：单行日志错误只跳过该行；单条链路的分析错误写入该链路的结果；
//! 只有 `RunError` 会终止整个实验。

use thiserror::Error;

/// 设备日志行解析错误（调用方跳过该行）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogLineError {
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("bad packet trace: {0}")]
    BadPacketTrace(String),
}

/// 包序列关联与协议标注错误（只影响对应链路）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet count mismatch: device reported {device}, capture has {capture}")]
    CountMismatch { device: usize, capture: usize },
    #[error("unmatched packet at {index}")]
    UnmatchedPacket { index: usize },
    #[error("missing packet for step {step}")]
    MissingStepPacket { step: String },
    #[error("unexpected packet after {index}")]
    UnexpectedTrailingPacket { index: usize },
}

/// 抓包与提取错误（只影响对应链路）
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("capture i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad extractor output: {line:?}")]
    BadExtractorOutput { line: String },
    #[error("extractor exited with {status}")]
    ExtractorFailed { status: std::process::ExitStatus },
    #[error("{0}")]
    Packet(#[from] PacketError),
    #[error("infra interface address unavailable: {0}")]
    InfraMac(String),
}

/// 直连链路建立错误
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} {args:?} failed: {detail}")]
    Command {
        program: String,
        args: Vec<String>,
        detail: String,
    },
    #[error("waitLinkUp timeout on {netif}")]
    LinkUpTimeout { netif: String },
}

/// 终止整个实验的错误
#[derive(Debug, Error)]
pub enum RunError {
    #[error("device: {0}")]
    Device(String),
    #[error("authenticator: {0}")]
    Authenticator(String),
    #[error("unknown direct connection method")]
    UnknownDirectMethod,
    #[error("direct connection not established")]
    MissingDirectLink,
    #[error("{0}")]
    Conn(#[from] ConnError),
    #[error("timeout")]
    Timeout,
}
