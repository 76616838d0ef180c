use crate::config::ExpConfig;
use crate::packet::{PacketDir, PacketMeta, SequenceStep};
use clap::Parser;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    exp: ExpConfig,
}

pub(crate) fn test_config(extra: &[&str]) -> ExpConfig {
    let base = [
        "pion-exp",
        "--device-serial",
        "/dev/ttyUSB9",
        "--ca-profile",
        "/tmp/profile.data",
        "--keychain",
        "/tmp/keychain",
        "--network-prefix",
        "/net",
        "--direct-wifi-wpa-ctrl",
        "/run/wpa_supplicant",
        "--direct-wifi-netif",
        "wlan-direct",
        "--direct-wifi-ssid",
        "pion-ap",
        "--direct-wifi-passphrase",
        "ap-pass",
        "--direct-wifi-device-ip",
        "192.168.4.1",
        "--direct-wifi-auth-ip",
        "192.168.4.2",
        "--direct-wifi-subnet",
        "24",
        "--direct-ble-bridge-path",
        "/opt/ble-bridge",
        "--infra-wifi-netif",
        "wlan-infra",
        "--infra-wifi-ssid",
        "infra",
        "--infra-wifi-passphrase",
        "infra-pass",
        "--infra-wifi-gateway-ip",
        "172.16.0.1",
        "--infra-wifi-mac",
        "02:00:00:00:00:01",
    ];
    Cli::try_parse_from(base.iter().chain(extra).copied())
        .expect("test config")
        .exp
}

/// 每个声明步骤一个包，时间戳从 `t0` 起每包加 10
pub(crate) fn trace_for(seq: &[SequenceStep], t0: i64) -> Vec<PacketMeta> {
    seq.iter()
        .enumerate()
        .map(|(i, s)| PacketMeta::new(t0 + 10 * i as i64, s.dir, 100 + i as u32))
        .collect()
}

pub(crate) fn pkt(ts: i64, dir: PacketDir, len: u32) -> PacketMeta {
    PacketMeta::new(ts, dir, len)
}
