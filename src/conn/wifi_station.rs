//! Wi-Fi 站点
//!
//! 通过 `wpa_cli` 连接设备开出的热点，等待接口 UP 后设置本地地址。

use super::memo::StationMemo;
use super::{DirectConnection, DirectKind, run_command};
use crate::error::ConnError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

const LINK_UP_ATTEMPTS: u32 = 100;
const LINK_UP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct WifiStationOptions {
    /// wpa_supplicant 控制目录
    pub ctrl: String,
    pub netif: String,
    pub ssid: String,
    pub passphrase: String,
    /// `ip/prefix`
    pub local_ip: String,
    pub tools: StationTools,
}

/// 站点配置用到的外部程序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationTools {
    pub wpa_cli: String,
    pub ip: String,
    pub sudo: String,
}

impl Default for StationTools {
    fn default() -> Self {
        Self {
            wpa_cli: "wpa_cli".to_string(),
            ip: "ip".to_string(),
            sudo: "sudo".to_string(),
        }
    }
}

pub struct WifiStation {
    opts: WifiStationOptions,
    memo: StationMemo,
    network: Option<String>,
}

impl WifiStation {
    pub fn new(opts: WifiStationOptions, memo: StationMemo) -> Self {
        Self {
            opts,
            memo,
            network: None,
        }
    }

    async fn wpa_cli(&self, args: &[&str]) -> Result<String, ConnError> {
        let mut argv = vec![format!("-p{}", self.opts.ctrl), format!("-i{}", self.opts.netif)];
        argv.extend(args.iter().map(|a| a.to_string()));
        run_command(&self.opts.tools.wpa_cli, &argv).await
    }

    async fn bring_up(&mut self) -> Result<(), ConnError> {
        let network = self.wpa_cli(&["add_network"]).await?;
        self.network = Some(network.clone());

        let ssid = format!("\"{}\"", self.opts.ssid);
        let psk = format!("\"{}\"", self.opts.passphrase);
        self.wpa_cli(&["set_network", network.as_str(), "ssid", ssid.as_str()]).await?;
        self.wpa_cli(&["set_network", network.as_str(), "psk", psk.as_str()]).await?;
        self.wpa_cli(&["select_network", network.as_str()]).await?;

        wait_link_up(&self.opts.tools.ip, &self.opts.netif).await?;
        self.disable_power_save().await?;
        self.set_local_ip().await
    }

    async fn disable_power_save(&self) -> Result<(), ConnError> {
        let netif = self.opts.netif.as_str();
        if self.memo.power_save_disabled(netif) {
            return Ok(());
        }
        let args = ["iw", "dev", netif, "set", "power_save", "off"].map(String::from);
        run_command(&self.opts.tools.sudo, &args).await?;
        self.memo.mark_power_save_disabled(netif);
        Ok(())
    }

    async fn set_local_ip(&self) -> Result<(), ConnError> {
        let (netif, addr) = (self.opts.netif.as_str(), self.opts.local_ip.as_str());
        if self.memo.has_local_ip(netif, addr) {
            return Ok(());
        }
        let ip = self.opts.tools.ip.as_str();
        let args = [ip, "addr", "replace", addr, "dev", netif].map(String::from);
        run_command(&self.opts.tools.sudo, &args).await?;
        self.memo.mark_local_ip(netif, addr);
        Ok(())
    }
}

/// 轮询 `ip -j link show` 直到 operstate 为 UP
async fn wait_link_up(ip: &str, netif: &str) -> Result<(), ConnError> {
    let args = ["-j", "link", "show", netif].map(String::from);
    for attempt in 0..LINK_UP_ATTEMPTS {
        let stdout = run_command(ip, &args).await?;
        let operstate = serde_json::from_str::<serde_json::Value>(&stdout)
            .ok()
            .and_then(|j| j[0]["operstate"].as_str().map(str::to_string));
        if operstate.as_deref() == Some("UP") {
            debug!(netif, attempt, "链路已 UP");
            return Ok(());
        }
        tokio::time::sleep(LINK_UP_INTERVAL).await;
    }
    Err(ConnError::LinkUpTimeout {
        netif: netif.to_string(),
    })
}

#[async_trait]
impl DirectConnection for WifiStation {
    fn kind(&self) -> DirectKind {
        DirectKind::Wifi
    }

    async fn connect(&mut self) -> Result<(), ConnError> {
        info!(netif = %self.opts.netif, ssid = %self.opts.ssid, "连接直连 Wi-Fi");
        let res = self.bring_up().await;
        if let Err(e) = &res {
            warn!(error = %e, "直连 Wi-Fi 失败，拆除网络配置");
            self.disconnect().await;
        }
        res
    }

    async fn disconnect(&mut self) {
        let Some(network) = self.network.take() else {
            return;
        };
        if let Err(e) = self.wpa_cli(&["remove_network", network.as_str()]).await {
            debug!(error = %e, "remove_network 失败（忽略）");
        }
    }
}
