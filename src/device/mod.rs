//! 设备模块
//!
//! 解析设备日志行，并把设备进程的输出变成状态、变量与包轨迹。

mod app_state;
mod log_line;
mod session;

pub use app_state::AppState;
pub use log_line::DeviceLogEvent;
pub(crate) use session::{Feed, pump_lines};
pub use session::{DeviceEvent, DeviceRecord, DeviceReport, DeviceSession};
