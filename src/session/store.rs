//! 会话存储抽象层
//!
//! 会话 id → 各步已校验输出。调用方提供 id，首次成功写入时隐式创建，进程内常驻。
//! 每次 map 操作互斥；同一会话的并发写入按最后写入者生效。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::contract::{
    HypothesesOutput, InstrumentOutput, PatchOutput, RegressionOutput, ReproduceOutput,
    StepIndex, StepOutput,
};

/// 单个会话已累积的 Step 1~5 输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub step1: Option<ReproduceOutput>,
    pub step2: Option<HypothesesOutput>,
    pub step3: Option<InstrumentOutput>,
    pub step4: Option<PatchOutput>,
    pub step5: Option<RegressionOutput>,
}

impl SessionRecord {
    /// 写入一步输出（覆盖同一步的旧值）
    pub fn set(&mut self, output: StepOutput) {
        match output {
            StepOutput::Reproduce(o) => self.step1 = Some(o),
            StepOutput::Hypotheses(o) => self.step2 = Some(o),
            StepOutput::Instrument(o) => self.step3 = Some(o),
            StepOutput::Patch(o) => self.step4 = Some(o),
            StepOutput::Regression(o) => self.step5 = Some(o),
        }
    }

    pub fn get(&self, step: StepIndex) -> Option<StepOutput> {
        match step {
            StepIndex::Step1 => self.step1.clone().map(StepOutput::from),
            StepIndex::Step2 => self.step2.clone().map(StepOutput::from),
            StepIndex::Step3 => self.step3.clone().map(StepOutput::from),
            StepIndex::Step4 => self.step4.clone().map(StepOutput::from),
            StepIndex::Step5 => self.step5.clone().map(StepOutput::from),
            StepIndex::Step6 => None,
        }
    }

    /// 已完成的步骤
    pub fn completed_steps(&self) -> Vec<StepIndex> {
        StepIndex::ALL
            .into_iter()
            .filter(|s| self.get(*s).is_some())
            .collect()
    }
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取某会话某一步的输出
    async fn get(&self, session_id: &str, step: StepIndex) -> Option<StepOutput>;

    /// 写入一步输出；会话不存在时创建
    async fn put(&self, session_id: &str, output: StepOutput);

    /// 获取会话全部输出的副本
    async fn snapshot(&self, session_id: &str) -> Option<SessionRecord>;

    /// 当前会话数
    async fn session_count(&self) -> usize;
}

/// 内存会话存储（无淘汰，随进程生命周期）
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, step: StepIndex) -> Option<StepOutput> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|record| record.get(step))
    }

    async fn put(&self, session_id: &str, output: StepOutput) {
        let step = output.step();
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .set(output);
        tracing::debug!(session_id, %step, "session step stored");
    }

    async fn snapshot(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// 创建会话存储
pub fn create_session_store() -> Arc<dyn SessionStore> {
    tracing::info!("Using in-memory session store");
    Arc::new(MemorySessionStore::new())
}
