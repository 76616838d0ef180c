//! 直连链路
//!
//! 设备入网前与认证器之间的带外链路，两种实现：Wi-Fi 站点与 BLE 桥。

mod ble_bridge;
mod memo;
mod wifi_station;

pub use ble_bridge::{BLE_BRIDGE_IP, BLE_BRIDGE_PORT, BleBridge, BridgeCommand};
pub use memo::StationMemo;
pub use wifi_station::{StationTools, WifiStation, WifiStationOptions};

use crate::error::ConnError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// 直连方式，由设备上报的 program 标签决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectKind {
    Wifi,
    Ble,
}

impl DirectKind {
    pub const WIFI_TAG: &'static str = "direct-wifi";
    pub const BLE_TAG: &'static str = "direct-ble";

    /// 按 program 标签选择；两者都有时优先 Wi-Fi。
    pub fn from_program(program: &[String]) -> Option<DirectKind> {
        let has = |tag: &str| program.iter().any(|p| p == tag);
        if has(Self::WIFI_TAG) {
            Some(DirectKind::Wifi)
        } else if has(Self::BLE_TAG) {
            Some(DirectKind::Ble)
        } else {
            None
        }
    }
}

/// 直连链路能力
#[async_trait]
pub trait DirectConnection: Send {
    fn kind(&self) -> DirectKind;

    /// 返回时链路已可用于后续通信
    async fn connect(&mut self) -> Result<(), ConnError>;

    /// 尽力拆除；即使从未连接也可安全调用
    async fn disconnect(&mut self);
}

/// 运行一条外部命令并返回 stdout；非零退出视为错误。
pub(crate) async fn run_command(program: &str, args: &[String]) -> Result<String, ConnError> {
    let output = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|source| ConnError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ConnError::Command {
            program: program.to_string(),
            args: args.to_vec(),
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
