//! 编排器测试：所有外部组件由假实验台替换

use super::support::{test_config, trace_for};
use crate::auth::{Authenticator, AuthenticatorOptions};
use crate::capture::PacketCapture;
use crate::config::CaptureSpec;
use crate::conn::{DirectConnection, DirectKind};
use crate::device::{AppState, DeviceRecord, DeviceSession};
use crate::error::{CaptureError, ConnError};
use crate::packet::{Link, PacketMeta, ProtocolSequence};
use crate::run::{Run, RunResult, Testbed};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

type Journal = Arc<Mutex<Vec<String>>>;

fn note(journal: &Journal, entry: String) {
    journal.lock().expect("journal").push(entry);
}

struct FakeCapture {
    netif: String,
    packets: Vec<PacketMeta>,
    journal: Journal,
}

#[async_trait]
impl PacketCapture for FakeCapture {
    async fn close(&mut self) {
        note(&self.journal, format!("close {}", self.netif));
    }

    fn pcap(&self) -> &[u8] {
        b"fake"
    }

    async fn extract(&self, args: &[String]) -> Result<Vec<PacketMeta>, CaptureError> {
        note(&self.journal, format!("extract {} {}", self.netif, args.join(" ")));
        Ok(self.packets.clone())
    }
}

struct FakeConn {
    kind: DirectKind,
    hang: bool,
    journal: Journal,
}

#[async_trait]
impl DirectConnection for FakeConn {
    fn kind(&self) -> DirectKind {
        self.kind
    }

    async fn connect(&mut self) -> Result<(), ConnError> {
        note(&self.journal, format!("connect {:?}", self.kind));
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        note(&self.journal, format!("disconnect {:?}", self.kind));
    }
}

#[derive(Default)]
struct FakeTestbed {
    /// `None` 表示设备进程无法启动
    device: Option<String>,
    authenticator: Option<String>,
    captures: HashMap<String, Vec<PacketMeta>>,
    hang_connect: bool,
    journal: Journal,
}

impl Testbed for FakeTestbed {
    fn open_device(&mut self) -> DeviceSession {
        match self.device.take() {
            Some(lines) => DeviceSession::from_reader(Cursor::new(lines.into_bytes())),
            None => DeviceSession::spawn("/nonexistent/device_conn", &[]),
        }
    }

    fn start_capture(&mut self, spec: &CaptureSpec) -> Box<dyn PacketCapture> {
        note(
            &self.journal,
            format!("start {} {}", spec.netif, spec.filter.as_deref().unwrap_or("-")),
        );
        Box::new(FakeCapture {
            netif: spec.netif.clone(),
            packets: self.captures.get(&spec.netif).cloned().unwrap_or_default(),
            journal: Arc::clone(&self.journal),
        })
    }

    fn direct_connection(
        &mut self,
        kind: DirectKind,
        device: &DeviceRecord,
    ) -> Box<dyn DirectConnection> {
        note(&self.journal, format!("conn {kind:?} {}", device.ble_mac()));
        Box::new(FakeConn {
            kind,
            hang: self.hang_connect,
            journal: Arc::clone(&self.journal),
        })
    }

    fn start_authenticator(&mut self, opts: &AuthenticatorOptions) -> Authenticator {
        note(
            &self.journal,
            format!(
                "auth {}:{} mtu={:?} pw={}",
                opts.device_ip, opts.device_port, opts.mtu, opts.pake_password
            ),
        );
        match self.authenticator.take() {
            Some(lines) => Authenticator::from_reader(Cursor::new(lines.into_bytes())),
            None => Authenticator::spawn("/nonexistent/ndnob-authenticator", opts),
        }
    }
}

/// 组装设备输出；每行自动加时间戳
struct DeviceScript {
    t: i64,
    lines: Vec<String>,
}

impl DeviceScript {
    fn new() -> Self {
        Self {
            t: 1000,
            lines: Vec::new(),
        }
    }

    fn line(mut self, category: &str, value: &str) -> Self {
        self.t += 1;
        self.lines
            .push(format!("{} {} [pion.{category}] {value}", self.t, self.t - 900));
        self
    }

    fn state(self, state: AppState) -> Self {
        let v = state.index().to_string();
        self.line("S.app", &v)
    }

    fn packets(mut self, link: Link, pkts: &[PacketMeta]) -> Self {
        for p in pkts {
            self.lines.push(format!(
                "{} {} [pion.{}] {} len={}",
                p.ts,
                p.ts - 900,
                link.trace_category(),
                p.dir,
                p.len
            ));
        }
        self
    }

    fn build(self) -> String {
        self.lines.join("\n") + "\n"
    }
}

fn shifted(pkts: &[PacketMeta], by: i64) -> Vec<PacketMeta> {
    pkts.iter()
        .map(|p| PacketMeta::new(p.ts + by, p.dir, p.len))
        .collect()
}

async fn run_with(testbed: FakeTestbed, extra: &[&str]) -> RunResult {
    let config = Arc::new(test_config(extra));
    Run::new(config, Box::new(testbed)).run().await
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal").clone()
}

#[tokio::test(start_paused = true)]
async fn full_wifi_run_labels_both_links() {
    let direct = trace_for(ProtocolSequence::DIRECT, 2000);
    let infra = trace_for(ProtocolSequence::INFRA, 5000);
    let device = DeviceScript::new()
        .line("O.program", "direct-wifi direct-ble infra")
        .line("H.total", "300000")
        .line("H.free-initial", "200000")
        .state(AppState::Idle)
        .line("O.password", "hunter2")
        .state(AppState::MakePassword)
        .state(AppState::WaitDirectConnect)
        .line("O.WiFi-BSSID", "02:11:22:33:44:55")
        .state(AppState::WaitPake)
        .packets(Link::Direct, &direct)
        .state(AppState::WaitDirectDisconnect)
        .state(AppState::WaitInfraConnect)
        .state(AppState::WaitNdncert)
        .packets(Link::Infra, &infra)
        .line("O.cert", "/net/d1/KEY/1")
        .state(AppState::Success)
        .line("H.free-final", "190000")
        .state(AppState::Final)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        authenticator: Some("pake done\ncredential sent\n".to_string()),
        captures: HashMap::from([
            ("wlan-direct".to_string(), shifted(&direct, 3)),
            ("wlan-infra".to_string(), shifted(&infra, 2)),
        ]),
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &[]).await;
    assert_eq!(result.error, None);
    assert!(result.success());
    assert_eq!(result.program, vec!["direct-wifi", "direct-ble", "infra"]);
    assert_eq!(result.device.wifi_bssid, "02:11:22:33:44:55");
    assert_eq!(result.device.cert_name, "/net/d1/KEY/1");
    assert_eq!(result.device.heap_free_final, 190000);
    assert_eq!(result.device.states.last(), Some(&AppState::Final));
    assert!(result.authenticator.is_some());

    let direct_dump = result.direct_dump.as_ref().expect("direct dump");
    assert_eq!(direct_dump.error, None);
    assert_eq!(direct_dump.link, Link::Direct);
    assert_eq!(direct_dump.pcap, "ZmFrZQ==");
    assert_eq!(direct_dump.exchanges.len(), ProtocolSequence::DIRECT.len());
    assert_eq!(direct_dump.exchanges[0].step, "pake-request");
    // 发往设备：抓包先于设备
    let first = &direct_dump.exchanges[0].fragments[0];
    assert_eq!((first.tx_time, first.rx_time), (2003, 2000));

    let infra_dump = result.infra_dump.as_ref().expect("infra dump");
    assert_eq!(infra_dump.error, None);
    assert_eq!(infra_dump.exchanges.len(), ProtocolSequence::INFRA.len());

    let log = entries(&journal);
    assert!(log.contains(&"start wlan-direct -".to_string()), "{log:?}");
    assert!(log.contains(&"conn Wifi ".to_string()), "{log:?}");
    assert!(log.contains(&"auth 192.168.4.1:6363 mtu=None pw=hunter2".to_string()), "{log:?}");
    assert!(log.contains(&"extract wlan-direct --ap".to_string()), "{log:?}");
    assert!(
        log.contains(&"extract wlan-infra --sta 02:00:00:00:00:01".to_string()),
        "{log:?}"
    );
    for netif in ["wlan-direct", "wlan-infra"] {
        let closes = log.iter().filter(|e| **e == format!("close {netif}")).count();
        assert_eq!(closes, 1, "{netif}");
    }

    // 直连抓包在连接之前开始
    let pos = |e: &str| log.iter().position(|x| x == e).expect(e);
    assert!(pos("start wlan-direct -") < pos("connect Wifi"));
    assert!(pos("connect Wifi") < pos("auth 192.168.4.1:6363 mtu=None pw=hunter2"));
    assert!(pos("disconnect Wifi") < pos("start wlan-infra -"));
}

#[tokio::test(start_paused = true)]
async fn stalled_device_times_out_with_partial_telemetry() {
    let device = DeviceScript::new()
        .line("O.program", "direct-wifi infra")
        .state(AppState::Idle)
        .state(AppState::MakePassword)
        .state(AppState::WaitDirectConnect)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &["--timeout-secs", "30"]).await;
    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert!(!result.success());
    assert_eq!(
        result.device.states,
        vec![AppState::Idle, AppState::MakePassword, AppState::WaitDirectConnect]
    );
    assert_eq!(result.device.logs.len(), 4);
    assert!(result.authenticator.is_none());
    assert!(result.infra_dump.is_none());

    // 抓包为空，分析失败只写进该链路
    let direct_dump = result.direct_dump.as_ref().expect("direct dump");
    assert!(direct_dump.error.is_some());

    let log = entries(&journal);
    assert!(log.contains(&"connect Wifi".to_string()), "{log:?}");
    assert!(!log.iter().any(|e| e.contains("Ble")), "{log:?}");
    assert!(log.contains(&"disconnect Wifi".to_string()), "{log:?}");
    assert!(log.contains(&"close wlan-direct".to_string()), "{log:?}");
}

#[tokio::test(start_paused = true)]
async fn hanging_connect_is_cut_by_timeout() {
    let device = DeviceScript::new()
        .line("O.program", "direct-wifi")
        .state(AppState::WaitDirectConnect)
        .state(AppState::WaitPake)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        hang_connect: true,
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &["--timeout-secs", "10"]).await;
    assert_eq!(result.error.as_deref(), Some("timeout"));
    // 超时发生在处理 WaitDirectConnect 期间，WaitPake 还没被读到
    assert_eq!(result.device.states, vec![AppState::WaitDirectConnect]);

    let log = entries(&journal);
    assert!(log.contains(&"disconnect Wifi".to_string()), "{log:?}");
    assert_eq!(
        log.iter().filter(|e| *e == "close wlan-direct").count(),
        1,
        "{log:?}"
    );
    assert!(!log.iter().any(|e| e.starts_with("auth ")), "{log:?}");
}

#[tokio::test(start_paused = true)]
async fn ble_run_uses_loopback_bridge() {
    let device = DeviceScript::new()
        .line("O.program", "direct-ble infra")
        .line("O.BLE-MAC", "AA:BB:CC:DD:EE:FF")
        .line("O.BLE-MTU", "244")
        .line("O.password", "pw")
        .state(AppState::WaitDirectConnect)
        .state(AppState::WaitPake)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        authenticator: Some(String::new()),
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &["--timeout-secs", "5"]).await;
    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert_eq!(result.device.ble_mac, "AA:BB:CC:DD:EE:FF");
    assert_eq!(result.device.ble_mtu, 244);
    let auth = result.authenticator.as_ref().expect("authenticator");
    assert!(auth.finished);

    let log = entries(&journal);
    assert!(log.contains(&"start lo host 127.0.0.1".to_string()), "{log:?}");
    assert!(log.contains(&"conn Ble AA:BB:CC:DD:EE:FF".to_string()), "{log:?}");
    assert!(log.contains(&"auth 127.0.0.1:6362 mtu=Some(244) pw=pw".to_string()), "{log:?}");
    assert!(log.contains(&"extract lo --ble".to_string()), "{log:?}");
}

#[tokio::test(start_paused = true)]
async fn unknown_direct_method_fails_run() {
    let device = DeviceScript::new()
        .line("O.program", "infra")
        .state(AppState::Idle)
        .state(AppState::WaitDirectConnect)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &[]).await;
    assert_eq!(
        result.error.as_deref(),
        Some("unknown direct connection method")
    );
    assert!(result.direct_dump.is_none());
    assert!(entries(&journal).is_empty());
}

#[tokio::test(start_paused = true)]
async fn pake_without_direct_link_fails_run() {
    let device = DeviceScript::new()
        .line("O.program", "direct-wifi")
        .state(AppState::Idle)
        .state(AppState::WaitPake)
        .build();

    let result = run_with(
        FakeTestbed {
            device: Some(device),
            ..Default::default()
        },
        &[],
    )
    .await;
    assert_eq!(
        result.error.as_deref(),
        Some("direct connection not established")
    );
    assert!(result.authenticator.is_none());
}

#[tokio::test(start_paused = true)]
async fn device_spawn_failure_fails_run() {
    let result = run_with(FakeTestbed::default(), &[]).await;
    let error = result.error.as_deref().expect("error");
    assert!(error.starts_with("device: cannot start"), "{error}");
    assert!(result.device.states.is_empty());
    assert!(result.direct_dump.is_none());
    assert!(result.infra_dump.is_none());
}

#[tokio::test(start_paused = true)]
async fn authenticator_spawn_failure_fails_run() {
    let device = DeviceScript::new()
        .line("O.program", "direct-wifi")
        .state(AppState::WaitDirectConnect)
        .state(AppState::WaitPake)
        .build();

    let journal = Journal::default();
    let testbed = FakeTestbed {
        device: Some(device),
        journal: Arc::clone(&journal),
        ..Default::default()
    };

    let result = run_with(testbed, &[]).await;
    let error = result.error.as_deref().expect("error");
    assert!(error.starts_with("authenticator: cannot start"), "{error}");
    let log = entries(&journal);
    assert!(log.contains(&"disconnect Wifi".to_string()), "{log:?}");
    assert!(log.contains(&"close wlan-direct".to_string()), "{log:?}");
}

#[test]
fn result_serializes_to_one_json_line() {
    let result = RunResult {
        program: vec!["direct-wifi".to_string()],
        device: Default::default(),
        authenticator: None,
        direct_dump: None,
        infra_dump: None,
        error: Some("timeout".to_string()),
    };
    let json = serde_json::to_string(&result).expect("json");
    assert!(!json.contains('\n'));
    let back: RunResult = serde_json::from_str(&json).expect("parse");
    assert_eq!(back, result);
    assert!(!json.contains("direct_dump"));
}
