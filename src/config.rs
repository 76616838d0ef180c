//! 实验配置
//!
//! 所有选项都可以用命令行给出，也可以回退到对应的 `PION_*` 环境变量。

use crate::auth::AuthenticatorOptions;
use crate::capture::ExtractMode;
use crate::conn::{
    BLE_BRIDGE_IP, BLE_BRIDGE_PORT, BridgeCommand, DirectKind, StationTools, WifiStationOptions,
};
use crate::error::CaptureError;
use crate::packet::CorrelationPolicy;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// 设备在 Wi-Fi AP 模式下监听的 UDP 端口
pub const DIRECT_WIFI_DEVICE_PORT: u16 = 6363;

#[derive(Debug, Clone, clap::Args)]
pub struct ExpConfig {
    /// Serial port of the device under test
    #[arg(long, env = "PION_DEVICE_SERIAL")]
    pub device_serial: String,

    /// Device bridge command; `--port <serial>` is appended
    #[arg(long, default_value = "pipenv run python -u device_conn.py")]
    pub device_cmd: String,

    #[arg(long, default_value = "ndnob-authenticator")]
    pub authenticator_cmd: String,

    #[arg(long, default_value = "dumpcap")]
    pub dumpcap_cmd: String,

    /// Program that turns a pcap on stdin into `<ts> <dir> <len>` lines
    #[arg(long, default_value = "pion-pcapparse")]
    pub extractor_cmd: String,

    /// Whether extractor lines carry a leading timestamp
    #[arg(long, value_enum, default_value_t = ExtractMode::Timestamped)]
    pub extract_mode: ExtractMode,

    #[arg(long, default_value = "wpa_cli")]
    pub wpa_cli_cmd: String,

    #[arg(long, default_value = "ip")]
    pub ip_cmd: String,

    #[arg(long, default_value = "sudo")]
    pub sudo_cmd: String,

    #[arg(long, env = "PION_CA_PROFILE")]
    pub ca_profile: String,

    #[arg(long, env = "PION_AUTH_KEYCHAIN")]
    pub keychain: String,

    #[arg(long, env = "PION_NETWORK_PREFIX")]
    pub network_prefix: String,

    #[arg(long, env = "PION_DIRECT_WIFI_WPA_CTRL")]
    pub direct_wifi_wpa_ctrl: String,

    #[arg(long, env = "PION_DIRECT_WIFI_NETIF")]
    pub direct_wifi_netif: String,

    #[arg(long, env = "PION_DIRECT_WIFI_SSID")]
    pub direct_wifi_ssid: String,

    #[arg(long, env = "PION_DIRECT_WIFI_PASS")]
    pub direct_wifi_passphrase: String,

    #[arg(long, env = "PION_DIRECT_WIFI_DEVICE_IP")]
    pub direct_wifi_device_ip: IpAddr,

    #[arg(long, env = "PION_DIRECT_WIFI_AUTH_IP")]
    pub direct_wifi_auth_ip: IpAddr,

    /// Prefix length of the direct Wi-Fi subnet
    #[arg(long, env = "PION_DIRECT_WIFI_SUBNET", value_parser = clap::value_parser!(u8).range(1..=32))]
    pub direct_wifi_subnet: u8,

    #[arg(long, env = "PION_DIRECT_BLE_BRIDGE_PATH")]
    pub direct_ble_bridge_path: PathBuf,

    /// BLE bridge command, run inside the bridge path
    #[arg(long, default_value = "pipenv run python BleUdpBridge.py")]
    pub direct_ble_bridge_cmd: String,

    #[arg(long, env = "PION_INFRA_WIFI_NETIF")]
    pub infra_wifi_netif: String,

    #[arg(long, env = "PION_INFRA_WIFI_SSID")]
    pub infra_wifi_ssid: String,

    #[arg(long, env = "PION_INFRA_WIFI_PASS")]
    pub infra_wifi_passphrase: String,

    #[arg(long, env = "PION_INFRA_WIFI_GW_IP")]
    pub infra_wifi_gateway_ip: IpAddr,

    /// MAC of the infra interface; read from sysfs when absent
    #[arg(long, env = "PION_INFRA_WIFI_MAC")]
    pub infra_wifi_mac: Option<String>,

    /// Give up on a run after this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = CorrelationPolicy::Strict)]
    pub correlation: CorrelationPolicy,

    #[arg(long, default_value_t = 1000)]
    pub connect_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub capture_warmup_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub disconnect_delay_ms: u64,
}

/// 编排器的等待与超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    pub timeout: Duration,
    /// 设备进入 WaitDirectConnect 后、开始抓包前
    pub connect_delay: Duration,
    /// 抓包启动后、建立直连前
    pub capture_warmup: Duration,
    /// 设备进入 WaitDirectDisconnect 后、拆除直连前
    pub disconnect_delay: Duration,
}

/// 一条链路的抓包位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    pub netif: String,
    pub filter: Option<String>,
}

/// 直连方式确定后的抓包与认证器上行端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPlan {
    pub kind: DirectKind,
    pub capture: CaptureSpec,
    pub extract_args: Vec<String>,
    pub device_ip: IpAddr,
    pub device_port: u16,
    pub mtu: Option<u32>,
}

impl ExpConfig {
    pub fn timing(&self) -> RunTiming {
        RunTiming {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            capture_warmup: Duration::from_millis(self.capture_warmup_ms),
            disconnect_delay: Duration::from_millis(self.disconnect_delay_ms),
        }
    }

    /// 设备桥接命令：程序名与参数
    pub fn device_command(&self) -> (String, Vec<String>) {
        let (program, mut args) = split_command(&self.device_cmd);
        args.extend(["--port".to_string(), self.device_serial.clone()]);
        (program, args)
    }

    pub fn ble_bridge_command(&self) -> BridgeCommand {
        let (program, args) = split_command(&self.direct_ble_bridge_cmd);
        BridgeCommand {
            program,
            args,
            dir: self.direct_ble_bridge_path.clone(),
        }
    }

    pub fn direct_plan(&self, kind: DirectKind, ble_mtu: u32) -> DirectPlan {
        match kind {
            DirectKind::Wifi => DirectPlan {
                kind,
                capture: CaptureSpec {
                    netif: self.direct_wifi_netif.clone(),
                    filter: None,
                },
                extract_args: vec!["--ap".to_string()],
                device_ip: self.direct_wifi_device_ip,
                device_port: DIRECT_WIFI_DEVICE_PORT,
                mtu: None,
            },
            DirectKind::Ble => DirectPlan {
                kind,
                capture: CaptureSpec {
                    netif: "lo".to_string(),
                    filter: Some(format!("host {BLE_BRIDGE_IP}")),
                },
                extract_args: vec!["--ble".to_string()],
                device_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                device_port: BLE_BRIDGE_PORT,
                mtu: Some(ble_mtu),
            },
        }
    }

    pub fn infra_capture(&self) -> CaptureSpec {
        CaptureSpec {
            netif: self.infra_wifi_netif.clone(),
            filter: None,
        }
    }

    /// 基础设施链路的提取参数：`--sta <infra 接口 MAC>`
    pub fn infra_extract_args(&self) -> Result<Vec<String>, CaptureError> {
        let mac = match &self.infra_wifi_mac {
            Some(mac) => mac.clone(),
            None => {
                let path = format!("/sys/class/net/{}/address", self.infra_wifi_netif);
                std::fs::read_to_string(&path)
                    .map_err(|e| CaptureError::InfraMac(format!("{path}: {e}")))?
                    .trim()
                    .to_string()
            }
        };
        Ok(vec!["--sta".to_string(), mac])
    }

    pub fn wifi_station_options(&self) -> WifiStationOptions {
        WifiStationOptions {
            ctrl: self.direct_wifi_wpa_ctrl.clone(),
            netif: self.direct_wifi_netif.clone(),
            ssid: self.direct_wifi_ssid.clone(),
            passphrase: self.direct_wifi_passphrase.clone(),
            local_ip: format!("{}/{}", self.direct_wifi_auth_ip, self.direct_wifi_subnet),
            tools: StationTools {
                wpa_cli: self.wpa_cli_cmd.clone(),
                ip: self.ip_cmd.clone(),
                sudo: self.sudo_cmd.clone(),
            },
        }
    }

    /// 下发给设备的基础设施网络凭据
    pub fn network_credential(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.infra_wifi_ssid, self.infra_wifi_passphrase, self.infra_wifi_gateway_ip
        )
    }

    pub fn authenticator_options(
        &self,
        plan: &DirectPlan,
        password: &str,
        now_ms: u128,
    ) -> AuthenticatorOptions {
        AuthenticatorOptions {
            device_ip: plan.device_ip,
            device_port: plan.device_port,
            mtu: plan.mtu,
            keychain: self.keychain.clone(),
            ca_profile: self.ca_profile.clone(),
            device_name: format!("{}/d{}", self.network_prefix, now_ms),
            network_credential: self.network_credential(),
            pake_password: password.to_string(),
        }
    }
}

/// 按空白拆成程序名与参数
fn split_command(cmd: &str) -> (String, Vec<String>) {
    let mut parts = cmd.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}
