//! 包序列模块
//!
//! 设备自报与抓包两条独立的包序列：关联成收发对，再按声明的协议步骤标注。

mod correlate;
mod label;
mod meta;
mod sequence;

pub use correlate::{CorrelationPolicy, correlate};
pub use label::{ProtocolStep, label_steps};
pub use meta::{PacketDir, PacketMeta, PacketTxRx};
pub use sequence::{Link, ProtocolSequence, SequenceStep};
