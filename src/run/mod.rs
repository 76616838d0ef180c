//! 实验编排模块
//!
//! 状态机、外部组件的创建方式，以及每次实验的结果记录。

mod orchestrator;
mod result;
mod testbed;

pub use orchestrator::Run;
pub use result::{DumpResult, RunResult};
pub use testbed::{SystemTestbed, Testbed};
