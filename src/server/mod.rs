//! 传输层：把六个步骤暴露为 HTTP 端点

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::core::StepOrchestrator;

pub use routes::{router, status_for, AppState, SESSION_HEADER};

/// 绑定 [server] 地址并运行，直到进程退出
pub async fn serve(cfg: &AppConfig, orchestrator: StepOrchestrator) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;

    let app = router(Arc::new(AppState::new(orchestrator)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("VibeStepper API: http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
