//! 抓包模块
//!
//! 在接口上抓取原始帧，结束后交给外部提取程序转成包元信息。

mod dumpcap;
mod extract;

pub use dumpcap::Dumpcap;
pub use extract::{ExtractMode, parse_extractor_output};

use crate::error::CaptureError;
use crate::packet::PacketMeta;
use async_trait::async_trait;

/// 一条链路上的抓包
#[async_trait]
pub trait PacketCapture: Send + Sync {
    /// 停止抓包并保留已抓到的字节；可重复调用。
    async fn close(&mut self);

    /// 已保留的原始抓包（`close` 之前或从未成功启动时为空）
    fn pcap(&self) -> &[u8];

    /// 用外部提取程序解析已保留的抓包
    async fn extract(&self, args: &[String]) -> Result<Vec<PacketMeta>, CaptureError>;
}
