//! 设备入网实验
//!
//! 重复执行实验，每次输出一行 JSON 结果到 stdout；日志写到 stderr。

use clap::Parser;
use pion_exp::config::ExpConfig;
use pion_exp::conn::StationMemo;
use pion_exp::run::{Run, SystemTestbed};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "pion-exp",
    about = "Run the device onboarding experiment and print one JSON result per run"
)]
struct Args {
    /// Repeat the experiment this many times
    #[arg(long, default_value_t = 1)]
    count: u32,

    #[command(flatten)]
    exp: ExpConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化 tracing（stdout 留给结果）
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let config = Arc::new(args.exp);
    // 接口配置记录跨实验共享
    let memo = StationMemo::new();

    for i in 0..args.count {
        tracing::info!(run = i + 1, of = args.count, "实验");
        let testbed = SystemTestbed::new(Arc::clone(&config), memo.clone());
        let result = Run::new(Arc::clone(&config), Box::new(testbed)).run().await;
        println!("{}", serde_json::to_string(&result)?);
    }
    Ok(())
}
