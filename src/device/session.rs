//! 设备会话
//!
//! 持有设备桥接进程，把它的标准输出变成类型化事件流，并累积会话变量。

use super::app_state::AppState;
use super::log_line::DeviceLogEvent;
use crate::packet::{Link, PacketMeta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const FEED_CAPACITY: usize = 1024;

/// 会话向编排器发出的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Line(String),
    State(AppState),
    Error(String),
}

/// 读取任务送来的原始输入
#[derive(Debug)]
pub(crate) enum Feed {
    Line(String),
    Error(String),
}

/// 逐行读取，直到 EOF 或出错；出错时只上报一次。
pub(crate) async fn pump_lines<R>(reader: R, tx: mpsc::Sender<Feed>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(Feed::Line(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Feed::Error(e.to_string())).await;
                break;
            }
        }
    }
}

/// 从日志中累积的设备侧变量
#[derive(Debug, Default)]
pub struct DeviceRecord {
    logs: Vec<String>,
    states: Vec<AppState>,
    program: Vec<String>,
    password: String,
    wifi_bssid: String,
    ble_mac: String,
    ble_mtu: u32,
    cert_name: String,
    heap_total: i64,
    heap_free_initial: i64,
    heap_free_final: i64,
    heap_free_state: BTreeMap<AppState, i64>,
    direct_packets: Vec<PacketMeta>,
    infra_packets: Vec<PacketMeta>,
    errors: Vec<String>,
}

impl DeviceRecord {
    /// 当前状态：最后一个观测到的状态
    pub fn state(&self) -> AppState {
        self.states.last().copied().unwrap_or(AppState::Idle)
    }

    pub fn states(&self) -> &[AppState] {
        &self.states
    }

    pub fn program(&self) -> &[String] {
        &self.program
    }

    pub fn has_program(&self, tag: &str) -> bool {
        self.program.iter().any(|p| p == tag)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn ble_mac(&self) -> &str {
        &self.ble_mac
    }

    pub fn ble_mtu(&self) -> u32 {
        self.ble_mtu
    }

    pub fn packets(&self, link: Link) -> &[PacketMeta] {
        match link {
            Link::Direct => &self.direct_packets,
            Link::Infra => &self.infra_packets,
        }
    }

    fn packets_mut(&mut self, link: Link) -> &mut Vec<PacketMeta> {
        match link {
            Link::Direct => &mut self.direct_packets,
            Link::Infra => &mut self.infra_packets,
        }
    }

    /// 按类别分派一条事件；若它是状态变化则返回新状态。
    pub fn apply(&mut self, ev: &DeviceLogEvent) -> Option<AppState> {
        if let Some(link) = Link::from_trace_category(&ev.category) {
            match ev.packet() {
                Ok(pkt) => self.packets_mut(link).push(pkt),
                Err(e) => warn!(%link, error = %e, "跳过无法解析的包轨迹"),
            }
            return None;
        }

        match ev.category.as_str() {
            "S.app" => {
                let Some(state) = ev.int().and_then(AppState::from_index) else {
                    warn!(value = %ev.value, "未知的设备状态");
                    return None;
                };
                self.states.push(state);
                return Some(state);
            }
            "O.program" => {
                self.program = ev.value.split_whitespace().map(str::to_string).collect();
            }
            "O.password" => self.password = ev.value.clone(),
            "O.WiFi-BSSID" => self.wifi_bssid = ev.value.clone(),
            "O.BLE-MAC" => self.ble_mac = ev.value.clone(),
            "O.BLE-MTU" => {
                if let Some(v) = ev.int().and_then(|v| u32::try_from(v).ok()) {
                    self.ble_mtu = v;
                }
            }
            "O.cert" => self.cert_name = ev.value.clone(),
            "H.total" => set_int(&mut self.heap_total, ev),
            "H.free-initial" => set_int(&mut self.heap_free_initial, ev),
            "H.free-final" => set_int(&mut self.heap_free_final, ev),
            "H.free-prev-state" => {
                if let (Some(v), [.., prev, _]) = (ev.int(), self.states.as_slice()) {
                    self.heap_free_state.insert(*prev, v);
                }
            }
            "E" => self.errors.push(ev.value.clone()),
            _ => {}
        }
        None
    }

    pub fn report(&self) -> DeviceReport {
        DeviceReport {
            logs: self.logs.clone(),
            program: self.program.clone(),
            success: self.states.contains(&AppState::Success),
            states: self.states.clone(),
            heap_total: self.heap_total,
            heap_free_initial: self.heap_free_initial,
            heap_free_final: self.heap_free_final,
            heap_free_state: self.heap_free_state.clone(),
            wifi_bssid: self.wifi_bssid.clone(),
            ble_mac: self.ble_mac.clone(),
            ble_mtu: self.ble_mtu,
            cert_name: self.cert_name.clone(),
            errors: self.errors.clone(),
        }
    }
}

fn set_int(slot: &mut i64, ev: &DeviceLogEvent) {
    if let Some(v) = ev.int() {
        *slot = v;
    }
}

/// 设备遥测（结果记录的一部分）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub logs: Vec<String>,
    pub program: Vec<String>,
    pub success: bool,
    pub states: Vec<AppState>,
    pub heap_total: i64,
    pub heap_free_initial: i64,
    pub heap_free_final: i64,
    pub heap_free_state: BTreeMap<AppState, i64>,
    pub wifi_bssid: String,
    pub ble_mac: String,
    pub ble_mtu: u32,
    pub cert_name: String,
    pub errors: Vec<String>,
}

/// 设备会话：独占设备进程与它产生的全部历史。
pub struct DeviceSession {
    child: Option<Child>,
    feed: mpsc::Receiver<Feed>,
    pending: VecDeque<DeviceEvent>,
    record: DeviceRecord,
}

impl DeviceSession {
    /// 启动设备桥接进程。启动失败通过事件流上报一次 `Error`。
    pub fn spawn(program: &str, args: &[String]) -> Self {
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!(program, ?args, pid = child.id(), "设备进程已启动");
                let stdout = child.stdout.take();
                let mut session = match stdout {
                    Some(stdout) => Self::from_reader(stdout),
                    None => Self::failed("device stdout unavailable".to_string()),
                };
                session.child = Some(child);
                session
            }
            Err(e) => Self::failed(format!("cannot start {program}: {e}")),
        }
    }

    /// 从任意字节流读取设备日志（不关联进程）
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tokio::spawn(pump_lines(reader, tx));
        Self {
            child: None,
            feed: rx,
            pending: VecDeque::new(),
            record: DeviceRecord::default(),
        }
    }

    fn failed(msg: String) -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            child: None,
            feed: rx,
            pending: VecDeque::from([DeviceEvent::Error(msg)]),
            record: DeviceRecord::default(),
        }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    /// 下一个事件；流结束后返回 `None`。可安全地用在 `select!` 分支中。
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(ev);
            }
            match self.feed.recv().await? {
                Feed::Line(line) => self.ingest(line),
                Feed::Error(msg) => self.pending.push_back(DeviceEvent::Error(msg)),
            }
        }
    }

    fn ingest(&mut self, line: String) {
        let ev = match DeviceLogEvent::parse(&line) {
            Ok(ev) => ev,
            Err(e) => {
                trace!(error = %e, "跳过格式错误的行");
                return;
            }
        };
        let state = self.record.apply(&ev);
        self.record.logs.push(line.clone());
        self.pending.push_back(DeviceEvent::Line(line));
        if let Some(state) = state {
            self.pending.push_back(DeviceEvent::State(state));
        }
    }

    /// 强制结束设备进程；可重复调用。
    pub fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "设备进程已退出");
            }
        }
    }
}
