//! BLE 桥
//!
//! 监管把 BLE 流量转发到本地 UDP 端口的桥接脚本。脚本意外退出时，只要仍处于
//! 连接状态就立即重启。

use super::{DirectConnection, DirectKind};
use crate::error::ConnError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const BLE_BRIDGE_IP: &str = "127.0.0.1";
pub const BLE_BRIDGE_PORT: u16 = 6362;

const RESPAWN_BACKOFF: Duration = Duration::from_millis(100);

/// 桥接脚本的启动方式；`--addr` 与监听端点由 `BleBridge` 追加
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCommand {
    pub program: String,
    pub args: Vec<String>,
    /// 工作目录
    pub dir: PathBuf,
}

impl BridgeCommand {
    fn spawn(&self, addr: &str) -> Result<Child, ConnError> {
        let port = BLE_BRIDGE_PORT.to_string();
        Command::new(&self.program)
            .args(&self.args)
            .args(["--addr", addr])
            .args(["--listen-addr", BLE_BRIDGE_IP, "--listen-port", port.as_str()])
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConnError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

pub struct BleBridge {
    addr: String,
    command: BridgeCommand,
    connected: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl BleBridge {
    pub fn new(addr: impl Into<String>, command: BridgeCommand) -> Self {
        Self {
            addr: addr.into(),
            command,
            connected: None,
            task: None,
        }
    }
}

/// 重启循环：`connected` 变为 false 时杀掉当前子进程并退出
async fn supervise(
    mut child: Child,
    addr: String,
    command: BridgeCommand,
    mut connected: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            status = child.wait() => {
                debug!(?status, "BLE 桥退出");
            }
            _ = async { connected.wait_for(|c| !*c).await.is_ok() } => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "BLE 桥已退出");
                }
                return;
            }
        }

        child = loop {
            if !*connected.borrow() {
                return;
            }
            match command.spawn(&addr) {
                Ok(child) => break child,
                Err(e) => {
                    warn!(error = %e, "BLE 桥重启失败");
                    tokio::time::sleep(RESPAWN_BACKOFF).await;
                }
            }
        };
        info!("BLE 桥已重启");
    }
}

#[async_trait]
impl DirectConnection for BleBridge {
    fn kind(&self) -> DirectKind {
        DirectKind::Ble
    }

    async fn connect(&mut self) -> Result<(), ConnError> {
        if self.task.is_some() {
            return Ok(());
        }
        info!(addr = %self.addr, "启动 BLE 桥");
        let child = self.command.spawn(&self.addr)?;
        let (tx, rx) = watch::channel(true);
        self.connected = Some(tx);
        self.task = Some(tokio::spawn(supervise(
            child,
            self.addr.clone(),
            self.command.clone(),
            rx,
        )));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(tx) = self.connected.take() {
            let _ = tx.send(false);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "BLE 桥监管任务异常结束");
            }
        }
    }
}
