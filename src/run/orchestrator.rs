//! 实验编排器
//!
//! 一次实验的状态机：状态转移只由设备会话上报的状态驱动。设备与认证器的事件流
//! 在同一个 `select!` 循环中与总超时一起复用；对某个状态的处理完成之前不会处理下一个
//! 状态。无论成功、出错还是超时，清理都只执行一次，并且总会给出结果记录。

use super::result::{RunResult, analyze_dump};
use super::testbed::Testbed;
use crate::auth::{AuthEvent, Authenticator};
use crate::capture::PacketCapture;
use crate::config::{DirectPlan, ExpConfig, RunTiming};
use crate::conn::{DirectConnection, DirectKind};
use crate::device::{AppState, DeviceEvent, DeviceRecord, DeviceSession};
use crate::error::RunError;
use crate::packet::Link;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, info, warn};

/// 状态处理后是否继续
enum Step {
    Continue,
    Finish,
}

pub struct Run {
    config: Arc<ExpConfig>,
    timing: RunTiming,
    testbed: Box<dyn Testbed>,

    device: Option<DeviceSession>,
    direct_plan: Option<DirectPlan>,
    direct_dump: Option<Box<dyn PacketCapture>>,
    direct_conn: Option<Box<dyn DirectConnection>>,
    authenticator: Option<Authenticator>,
    infra_dump: Option<Box<dyn PacketCapture>>,
    cleaned: bool,
}

impl Run {
    pub fn new(config: Arc<ExpConfig>, testbed: Box<dyn Testbed>) -> Self {
        Self {
            timing: config.timing(),
            config,
            testbed,
            device: None,
            direct_plan: None,
            direct_dump: None,
            direct_conn: None,
            authenticator: None,
            infra_dump: None,
            cleaned: false,
        }
    }

    /// 执行一次实验。总会返回结果，失败原因写在 `error` 中。
    #[tracing::instrument(skip_all)]
    pub async fn run(mut self) -> RunResult {
        info!(timeout = ?self.timing.timeout, "▶️  开始实验");
        let deadline = Instant::now() + self.timing.timeout;
        self.device = Some(self.testbed.open_device());

        let outcome = self.drive(deadline).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "实验失败");
        }
        self.cleanup().await;

        let result = self.resolve(outcome.err()).await;
        info!(success = result.success(), "✅ 实验结束");
        result
    }

    async fn drive(&mut self, deadline: Instant) -> Result<(), RunError> {
        let timer = sleep_until(deadline);
        tokio::pin!(timer);
        let mut device_done = false;
        let mut auth_done = false;

        loop {
            tokio::select! {
                _ = &mut timer => return Err(RunError::Timeout),
                ev = next_device_event(&mut self.device), if !device_done => match ev {
                    None => {
                        debug!("设备输出结束");
                        device_done = true;
                    }
                    Some(DeviceEvent::Line(line)) => debug!(source = "device", "{line}"),
                    Some(DeviceEvent::Error(e)) => return Err(RunError::Device(e)),
                    Some(DeviceEvent::State(state)) => {
                        info!(?state, "设备状态");
                        match timeout_at(deadline, self.on_state(state)).await {
                            Err(_) => return Err(RunError::Timeout),
                            Ok(Err(e)) => return Err(e),
                            Ok(Ok(Step::Finish)) => return Ok(()),
                            Ok(Ok(Step::Continue)) => {}
                        }
                    }
                },
                ev = next_auth_event(&mut self.authenticator), if !auth_done => match ev {
                    None | Some(AuthEvent::Finish) => {
                        debug!("认证器输出结束");
                        auth_done = true;
                    }
                    Some(AuthEvent::Line(line)) => debug!(source = "authenticator", "{line}"),
                    Some(AuthEvent::Error(e)) => return Err(RunError::Authenticator(e)),
                },
            }
        }
    }

    async fn on_state(&mut self, state: AppState) -> Result<Step, RunError> {
        match state {
            AppState::WaitDirectConnect => self.direct_connect().await?,
            AppState::WaitPake => self.start_authenticator()?,
            AppState::WaitDirectDisconnect => {
                sleep(self.timing.disconnect_delay).await;
                if let Some(conn) = self.direct_conn.as_mut() {
                    info!(kind = ?conn.kind(), "拆除直连");
                    conn.disconnect().await;
                }
            }
            AppState::WaitInfraConnect => {
                if self.infra_dump.is_none() {
                    let spec = self.config.infra_capture();
                    self.infra_dump = Some(self.testbed.start_capture(&spec));
                }
            }
            AppState::Final => return Ok(Step::Finish),
            _ => {}
        }
        Ok(Step::Continue)
    }

    async fn direct_connect(&mut self) -> Result<(), RunError> {
        if self.direct_plan.is_some() {
            warn!("直连已建立过，忽略");
            return Ok(());
        }
        sleep(self.timing.connect_delay).await;

        let record = device_record(&self.device)?;
        let kind = DirectKind::from_program(record.program()).ok_or(RunError::UnknownDirectMethod)?;
        let plan = self.config.direct_plan(kind, record.ble_mtu());
        info!(?kind, netif = %plan.capture.netif, "建立直连");

        self.direct_dump = Some(self.testbed.start_capture(&plan.capture));
        self.direct_plan = Some(plan);
        sleep(self.timing.capture_warmup).await;

        let record = device_record(&self.device)?;
        let conn = self.direct_conn.insert(self.testbed.direct_connection(kind, record));
        conn.connect().await?;
        info!(?kind, "直连已可用");
        Ok(())
    }

    fn start_authenticator(&mut self) -> Result<(), RunError> {
        if self.authenticator.is_some() {
            warn!("认证器已启动过，忽略");
            return Ok(());
        }
        let plan = self.direct_plan.as_ref().ok_or(RunError::MissingDirectLink)?;
        let record = device_record(&self.device)?;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let opts = self
            .config
            .authenticator_options(plan, record.password(), now_ms);

        info!(ip = %opts.device_ip, port = opts.device_port, mtu = ?opts.mtu, "启动认证器");
        self.authenticator = Some(self.testbed.start_authenticator(&opts));
        Ok(())
    }

    /// 停止全部子进程与链路；只执行一次，允许部分组件从未创建。
    async fn cleanup(&mut self) {
        if std::mem::replace(&mut self.cleaned, true) {
            return;
        }
        debug!("清理");
        if let Some(device) = self.device.as_mut() {
            device.close();
        }
        if let Some(auth) = self.authenticator.as_mut() {
            auth.close();
        }
        if let Some(conn) = self.direct_conn.as_mut() {
            conn.disconnect().await;
        }
        if let Some(dump) = self.direct_dump.as_mut() {
            dump.close().await;
        }
        if let Some(dump) = self.infra_dump.as_mut() {
            dump.close().await;
        }
    }

    async fn resolve(&self, error: Option<RunError>) -> RunResult {
        let device = self.device.as_ref().map(DeviceSession::record);
        let packets = move |link: Link| device.map(|d| d.packets(link)).unwrap_or_default();
        let policy = self.config.correlation;

        let direct_dump = match (&self.direct_dump, &self.direct_plan) {
            (Some(dump), Some(plan)) => Some(
                analyze_dump(
                    Link::Direct,
                    dump.as_ref(),
                    packets(Link::Direct),
                    Ok(plan.extract_args.clone()),
                    policy,
                )
                .await,
            ),
            _ => None,
        };
        let infra_dump = match &self.infra_dump {
            Some(dump) => Some(
                analyze_dump(
                    Link::Infra,
                    dump.as_ref(),
                    packets(Link::Infra),
                    self.config.infra_extract_args(),
                    policy,
                )
                .await,
            ),
            None => None,
        };

        let report = device.map(DeviceRecord::report).unwrap_or_default();
        RunResult {
            program: report.program.clone(),
            device: report,
            authenticator: self.authenticator.as_ref().map(Authenticator::report),
            direct_dump,
            infra_dump,
            error: error.map(|e| e.to_string()),
        }
    }
}

fn device_record(device: &Option<DeviceSession>) -> Result<&DeviceRecord, RunError> {
    device
        .as_ref()
        .map(DeviceSession::record)
        .ok_or_else(|| RunError::Device("device session not open".to_string()))
}

async fn next_device_event(device: &mut Option<DeviceSession>) -> Option<DeviceEvent> {
    match device {
        Some(device) => device.next_event().await,
        None => None,
    }
}

async fn next_auth_event(auth: &mut Option<Authenticator>) -> Option<AuthEvent> {
    match auth {
        Some(auth) => auth.next_event().await,
        None => std::future::pending().await,
    }
}
