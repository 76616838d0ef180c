//! 认证器
//!
//! 监管认证器辅助进程：逐行转发它的输出，输出结束时发出一次 `Finish`。

use crate::device::{Feed, pump_lines};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

const FEED_CAPACITY: usize = 256;

/// 认证器启动参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorOptions {
    pub device_ip: IpAddr,
    pub device_port: u16,
    pub mtu: Option<u32>,
    pub keychain: String,

    pub ca_profile: String,
    pub device_name: String,
    pub network_credential: String,
    pub pake_password: String,
}

impl AuthenticatorOptions {
    pub fn args(&self) -> Vec<String> {
        [
            "-P",
            self.ca_profile.as_str(),
            "-i",
            "a",
            "-n",
            self.device_name.as_str(),
            "-N",
            self.network_credential.as_str(),
            "-p",
            self.pake_password.as_str(),
        ]
        .map(str::to_string)
        .to_vec()
    }

    /// 链路端点与密钥链通过环境变量传入
    pub fn envs(&self) -> Vec<(&'static str, String)> {
        let mut envs = vec![
            ("NDNPH_UPLINK_UDP", self.device_ip.to_string()),
            ("NDNPH_UPLINK_UDP_PORT", self.device_port.to_string()),
            ("NDNPH_KEYCHAIN", self.keychain.clone()),
        ];
        if let Some(mtu) = self.mtu {
            envs.push(("NDNPH_UPLINK_MTU", mtu.to_string()));
        }
        envs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Line(String),
    Finish,
    Error(String),
}

/// 认证器遥测
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorReport {
    pub output: Vec<String>,
    pub finished: bool,
}

pub struct Authenticator {
    child: Option<Child>,
    feed: mpsc::Receiver<Feed>,
    pending: VecDeque<AuthEvent>,
    output: Vec<String>,
    finished: bool,
}

impl Authenticator {
    pub fn spawn(program: &str, opts: &AuthenticatorOptions) -> Self {
        let spawned = Command::new(program)
            .args(opts.args())
            .envs(opts.envs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!(program, pid = child.id(), "认证器已启动");
                let mut auth = match child.stdout.take() {
                    Some(stdout) => Self::from_reader(stdout),
                    None => Self::failed("authenticator stdout unavailable".to_string()),
                };
                auth.child = Some(child);
                auth
            }
            Err(e) => Self::failed(format!("cannot start {program}: {e}")),
        }
    }

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
            output: Vec::new(),
            finished: false,
        }
    }

    fn failed(msg: String) -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            child: None,
            feed: rx,
            pending: VecDeque::from([AuthEvent::Error(msg)]),
            output: Vec::new(),
            finished: false,
        }
    }

    /// 下一个事件；`Finish` 之后返回 `None`。
    pub async fn next_event(&mut self) -> Option<AuthEvent> {
        if let Some(ev) = self.pending.pop_front() {
            return Some(ev);
        }
        if self.finished {
            return None;
        }
        match self.feed.recv().await {
            Some(Feed::Line(line)) => {
                self.output.push(line.clone());
                Some(AuthEvent::Line(line))
            }
            Some(Feed::Error(msg)) => Some(AuthEvent::Error(msg)),
            None => {
                self.finished = true;
                Some(AuthEvent::Finish)
            }
        }
    }

    pub fn report(&self) -> AuthenticatorReport {
        AuthenticatorReport {
            output: self.output.clone(),
            finished: self.finished,
        }
    }

    /// 结束认证器进程；可重复调用。
    pub fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "认证器已退出");
            }
        }
    }
}
