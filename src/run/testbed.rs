//! 实验台：为一次实验创建各个外部组件
//!
//! 编排器只通过这里拿到设备会话、抓包、直连与认证器，因此可以换成假实现。

use crate::auth::{Authenticator, AuthenticatorOptions};
use crate::capture::{Dumpcap, PacketCapture};
use crate::config::{CaptureSpec, ExpConfig};
use crate::conn::{BleBridge, DirectConnection, DirectKind, StationMemo, WifiStation};
use crate::device::{DeviceRecord, DeviceSession};
use std::sync::Arc;

pub trait Testbed: Send {
    fn open_device(&mut self) -> DeviceSession;

    fn start_capture(&mut self, spec: &CaptureSpec) -> Box<dyn PacketCapture>;

    fn direct_connection(
        &mut self,
        kind: DirectKind,
        device: &DeviceRecord,
    ) -> Box<dyn DirectConnection>;

    fn start_authenticator(&mut self, opts: &AuthenticatorOptions) -> Authenticator;
}

/// 真实实验台：所有组件都是外部进程
pub struct SystemTestbed {
    config: Arc<ExpConfig>,
    memo: StationMemo,
}

impl SystemTestbed {
    /// `memo` 应在进程内共享，跨实验保留已完成的接口配置。
    pub fn new(config: Arc<ExpConfig>, memo: StationMemo) -> Self {
        Self { config, memo }
    }
}

impl Testbed for SystemTestbed {
    fn open_device(&mut self) -> DeviceSession {
        let (program, args) = self.config.device_command();
        DeviceSession::spawn(&program, &args)
    }

    fn start_capture(&mut self, spec: &CaptureSpec) -> Box<dyn PacketCapture> {
        Box::new(
            Dumpcap::start(
                &self.config.dumpcap_cmd,
                &spec.netif,
                spec.filter.as_deref(),
                &self.config.extractor_cmd,
            )
            .with_mode(self.config.extract_mode),
        )
    }

    fn direct_connection(
        &mut self,
        kind: DirectKind,
        device: &DeviceRecord,
    ) -> Box<dyn DirectConnection> {
        match kind {
            DirectKind::Wifi => Box::new(WifiStation::new(
                self.config.wifi_station_options(),
                self.memo.clone(),
            )),
            DirectKind::Ble => Box::new(BleBridge::new(
                device.ble_mac(),
                self.config.ble_bridge_command(),
            )),
        }
    }

    fn start_authenticator(&mut self, opts: &AuthenticatorOptions) -> Authenticator {
        Authenticator::spawn(&self.config.authenticator_cmd, opts)
    }
}
