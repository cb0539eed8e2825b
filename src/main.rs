//! VibeStepper - 六步协议化调试助手
//!
//! 入口：初始化日志、加载配置、创建网关与会话存储，并启动 HTTP 服务。

use std::path::PathBuf;

use anyhow::Context;
use vibestepper::config::{load_config, AppConfig};
use vibestepper::core::StepOrchestrator;
use vibestepper::llm::create_llm_from_config;
use vibestepper::observability;
use vibestepper::server::serve;
use vibestepper::session::create_session_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选：第一个参数为额外配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);
    let store = create_session_store();
    let orchestrator = StepOrchestrator::from_config(&cfg, llm, store);

    serve(&cfg, orchestrator).await.context("Server run failed")?;
    Ok(())
}
