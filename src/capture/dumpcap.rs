//! dumpcap 抓包进程
//!
//! 抓包输出写到 stdout，由后台任务持续读入内存，避免管道写满。

use super::PacketCapture;
use super::extract::{ExtractMode, parse_extractor_output};
use crate::error::CaptureError;
use crate::packet::PacketMeta;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct Dumpcap {
    netif: String,
    extractor: String,
    mode: ExtractMode,
    child: Option<Child>,
    reader: Option<JoinHandle<Vec<u8>>>,
    pcap: Vec<u8>,
}

impl Dumpcap {
    /// 开始抓包。启动失败只记录日志，之后 `close` 得到空抓包。
    pub fn start(program: &str, netif: &str, filter: Option<&str>, extractor: &str) -> Self {
        let mut cmd = Command::new(program);
        cmd.args(["-i", netif]) // capture interface
            .arg("-p") // no promiscuous mode
            .arg("-P") // pcap instead of pcapng
            .arg("-q")
            .args(["-w", "-"]);
        if let Some(filter) = filter {
            cmd.args(["-f", filter]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut dump = Self {
            netif: netif.to_string(),
            extractor: extractor.to_string(),
            mode: ExtractMode::default(),
            child: None,
            reader: None,
            pcap: Vec::new(),
        };

        match cmd.spawn() {
            Ok(mut child) => {
                info!(netif, ?filter, "开始抓包");
                if let Some(mut stdout) = child.stdout.take() {
                    dump.reader = Some(tokio::spawn(async move {
                        let mut buf = Vec::new();
                        if let Err(e) = stdout.read_to_end(&mut buf).await {
                            warn!(error = %e, "读取抓包输出失败");
                        }
                        buf
                    }));
                }
                dump.child = Some(child);
            }
            Err(e) => warn!(program, netif, error = %e, "无法启动抓包"),
        }
        dump
    }

    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }
}

/// 先发 SIGTERM 让 dumpcap 写完缓冲的帧，宽限期过后才强制结束
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let pid = pid.to_string();
        match Command::new("kill")
            .args(["-TERM", pid.as_str()])
            .status()
            .await
        {
            Ok(status) if status.success() => match timeout(STOP_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(%status, "抓包进程已结束");
                    return;
                }
                Ok(Err(e)) => debug!(error = %e, "等待抓包进程失败"),
                Err(_) => warn!(grace = ?STOP_GRACE, "抓包进程未响应 SIGTERM"),
            },
            Ok(status) => debug!(%status, "kill -TERM 失败"),
            Err(e) => debug!(error = %e, "无法执行 kill"),
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "抓包进程已退出");
    }
}

#[async_trait]
impl PacketCapture for Dumpcap {
    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&mut child).await;
        }
        if let Some(reader) = self.reader.take() {
            match reader.await {
                Ok(buf) => self.pcap = buf,
                Err(e) => warn!(error = %e, "抓包读取任务异常结束"),
            }
            debug!(netif = %self.netif, bytes = self.pcap.len(), "抓包已停止");
        }
    }

    fn pcap(&self) -> &[u8] {
        &self.pcap
    }

    async fn extract(&self, args: &[String]) -> Result<Vec<PacketMeta>, CaptureError> {
        if self.pcap.is_empty() {
            return Ok(Vec::new());
        }

        let mut child = Command::new(&self.extractor)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.extractor.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let feed = async {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&self.pcap).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if let Err(e) = fed {
            // 提取程序可能提前关闭 stdin；以退出码为准
            debug!(error = %e, "写入提取程序中断");
        }
        if !output.status.success() {
            return Err(CaptureError::ExtractorFailed {
                status: output.status,
            });
        }

        parse_extractor_output(&String::from_utf8_lossy(&output.stdout), self.mode)
    }
}
