//! 步骤编排器：六步调试流程的状态机
//!
//! 每次请求：查会话中的前置输出 → 构造 Prompt → 调用网关 → 按契约解析/修复 → 成功才写入会话。
//! 唯一持久的状态是「该会话已有哪些步骤输出」；任何失败都不改动会话。

use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::contract::{
    parse_step_output, HypothesesOutput, Hypothesis, InstrumentOutput, PatchOutput,
    RegressionOutput, ReproduceOutput, StepContract, StepIndex, StepOutput, SummaryOutput,
};
use crate::core::prompt::{
    build_step1_prompt, build_step2_prompt, build_step3_prompt, build_step4_prompt,
    build_step5_prompt, hypothesis_ids, with_repair_hint,
};
use crate::core::summary::build_summary;
use crate::core::{Choice, RecoveryAction, RecoveryEngine, StepError};
use crate::llm::{GenerationOptions, LlmClient, Message};
use crate::session::{SessionRecord, SessionStore};

/// Step 2 非确认时的固定回复
pub const DECLINE_MESSAGE: &str = "⚠️ 未确认用例能复现问题，可能输入条件或环境不同。请调整代码后从 Step 1 重新开始。";
/// Step 4 选择自定义组合插桩时的固定回复
pub const NOT_IMPLEMENTED_MESSAGE: &str = "自定义组合插桩暂未实现，请选择 [1] 全部采纳后再生成补丁。";
/// Step 5 拒绝应用补丁时的固定回复
pub const SKIPPED_MESSAGE: &str = "未应用补丁，已跳过回归测试。可回到 Step 3 调整插桩计划。";

/// 编排策略（对应配置 [pipeline]）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelinePolicy {
    /// 上游返回非法响应时带修复提示重试的次数；0 = 直接报错
    pub invalid_response_retries: u32,
    /// Step 6 是否要求 Step 1~5 全部完成
    pub strict_summary: bool,
}

impl PipelinePolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            invalid_response_retries: cfg.pipeline.invalid_response_retries,
            strict_summary: cfg.pipeline.strict_summary,
        }
    }
}

/// 一次步骤请求（传输层解析后的形式）
#[derive(Debug, Clone, Default)]
pub struct StepRequest {
    pub session_id: Option<String>,
    pub code: String,
    pub choice: Option<String>,
}

/// 步骤结果：生成的输出、固定提示，或 Step 6 汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepOutcome {
    Generated(StepOutput),
    /// Step 2 软拒绝：提示从 Step 1 重新开始
    Declined { step: String, message: String },
    /// Step 4 的未实现分支
    NotImplemented { step: String, message: String },
    /// Step 5 跳过回归
    Skipped { step: String, message: String },
    Summary(SummaryOutput),
}

impl StepOutcome {
    fn notice(step: StepIndex, message: &str) -> (String, String) {
        (step.label().to_string(), message.to_string())
    }

    pub fn declined(step: StepIndex) -> Self {
        let (step, message) = Self::notice(step, DECLINE_MESSAGE);
        StepOutcome::Declined { step, message }
    }

    pub fn not_implemented(step: StepIndex) -> Self {
        let (step, message) = Self::notice(step, NOT_IMPLEMENTED_MESSAGE);
        StepOutcome::NotImplemented { step, message }
    }

    pub fn skipped(step: StepIndex) -> Self {
        let (step, message) = Self::notice(step, SKIPPED_MESSAGE);
        StepOutcome::Skipped { step, message }
    }

    /// 生成类结果中的步骤输出
    pub fn output(&self) -> Option<&StepOutput> {
        match self {
            StepOutcome::Generated(output) => Some(output),
            _ => None,
        }
    }
}

/// 步骤编排器：持有网关、会话存储与生成参数，可多会话共享
pub struct StepOrchestrator {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn SessionStore>,
    options: GenerationOptions,
    policy: PipelinePolicy,
    recovery: RecoveryEngine,
}

impl StepOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            llm,
            store,
            options: GenerationOptions::default(),
            policy: PipelinePolicy::default(),
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn from_config(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::new(llm, store)
            .with_options(GenerationOptions::from_config(cfg))
            .with_policy(PipelinePolicy::from_config(cfg))
    }

    /// 生成参数；有契约的步骤始终使用 JSON 模式
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options.with_json_mode(true);
        self
    }

    pub fn with_policy(mut self, policy: PipelinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// 网关累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 按步骤分发（传输层唯一入口）
    pub async fn dispatch(
        &self,
        step: StepIndex,
        request: &StepRequest,
    ) -> Result<StepOutcome, StepError> {
        let session_id = request.session_id.as_deref().unwrap_or_default();
        let code = request.code.as_str();
        let choice = request.choice.as_deref();
        let result = match step {
            StepIndex::Step1 => self.step1(session_id, code).await,
            StepIndex::Step2 => self.step2(session_id, code, choice).await,
            StepIndex::Step3 => self.step3(session_id, code, choice).await,
            StepIndex::Step4 => self.step4(session_id, code, choice).await,
            StepIndex::Step5 => self.step5(session_id, code, choice).await,
            StepIndex::Step6 => self.step6(session_id).await,
        };
        if let Err(e) = &result {
            tracing::info!(session_id, %step, kind = e.kind(), "step rejected: {}", e);
        }
        result
    }

    /// Step 1：复现。无分支，每次调用生成一次并覆盖旧值
    pub async fn step1(&self, session_id: &str, code: &str) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step1;

        let output: ReproduceOutput = self
            .generate(session_id, step, build_step1_prompt(code))
            .await?;
        Ok(self.commit(session_id, output.into()).await)
    }

    /// Step 2：假设。choice 为 "1" 时生成候选根因；其余任何值软拒绝
    pub async fn step2(
        &self,
        session_id: &str,
        code: &str,
        choice: Option<&str>,
    ) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step2;
        let Some(StepOutput::Reproduce(reproduction)) =
            self.store.get(session_id, StepIndex::Step1).await
        else {
            return Err(StepError::missing_step(StepIndex::Step1, step));
        };

        if !matches!(Choice::parse(choice), Ok(Choice::Accept)) {
            tracing::info!(session_id, %step, ?choice, "reproduction not confirmed, declining");
            return Ok(StepOutcome::declined(step));
        }

        let output: HypothesesOutput = self
            .generate(session_id, step, build_step2_prompt(code, &reproduction))
            .await?;
        tracing::debug!(session_id, ids = %hypothesis_ids(&output), "hypotheses generated");
        Ok(self.commit(session_id, output.into()).await)
    }

    /// Step 3：插桩。choice 为 Step 2 中某个假设的 id
    pub async fn step3(
        &self,
        session_id: &str,
        code: &str,
        choice: Option<&str>,
    ) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step3;
        let record = self.record(session_id).await;
        let hypotheses = record
            .step2
            .as_ref()
            .ok_or_else(|| StepError::missing_step(StepIndex::Step2, step))?;
        let selected = select_hypothesis(hypotheses, choice)?.clone();

        let mut output: InstrumentOutput = self
            .generate(session_id, step, build_step3_prompt(code, &selected))
            .await?;
        // 回显以 Step 2 的原始记录为准
        output.hypothesis = selected;
        Ok(self.commit(session_id, output.into()).await)
    }

    /// Step 4：补丁。"1" 全部采纳插桩后生成补丁；"2"/未选为未实现分支
    pub async fn step4(
        &self,
        session_id: &str,
        code: &str,
        choice: Option<&str>,
    ) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step4;
        let record = self.record(session_id).await;
        let instrument = record
            .step3
            .as_ref()
            .ok_or_else(|| StepError::missing_step(StepIndex::Step3, step))?;
        let hypothesis = rederive_hypothesis(&record, step)?;
        let choice = Choice::parse(choice)?;

        if !choice.is_accept() {
            return Ok(StepOutcome::not_implemented(step));
        }

        let output: PatchOutput = self
            .generate(
                session_id,
                step,
                build_step4_prompt(code, &hypothesis, &instrument.instrumentation_plan),
            )
            .await?;
        Ok(self.commit(session_id, output.into()).await)
    }

    /// Step 5：回归。"1" 应用补丁并评估回归；"2"/未选跳过，不调用网关
    pub async fn step5(
        &self,
        session_id: &str,
        code: &str,
        choice: Option<&str>,
    ) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step5;
        let record = self.record(session_id).await;
        let patch = record
            .step4
            .as_ref()
            .ok_or_else(|| StepError::missing_step(StepIndex::Step4, step))?;
        let hypothesis = rederive_hypothesis(&record, step)?;
        let plan = record
            .step3
            .as_ref()
            .map(|s| s.instrumentation_plan.as_slice())
            .unwrap_or_default();
        let choice = Choice::parse(choice)?;

        if !choice.is_accept() {
            tracing::info!(session_id, %step, "patch not applied, regression skipped");
            return Ok(StepOutcome::skipped(step));
        }

        let output: RegressionOutput = self
            .generate(
                session_id,
                step,
                build_step5_prompt(code, &hypothesis, plan, patch),
            )
            .await?;
        Ok(self.commit(session_id, output.into()).await)
    }

    /// Step 6：纪要。只读汇总，不调用网关、不写会话
    pub async fn step6(&self, session_id: &str) -> Result<StepOutcome, StepError> {
        let session_id = require_session_id(session_id)?;
        let step = StepIndex::Step6;
        let record = self
            .store
            .snapshot(session_id)
            .await
            .filter(|r| r.step1.is_some())
            .ok_or_else(|| StepError::missing_step(StepIndex::Step1, step))?;

        if self.policy.strict_summary {
            let completed = record.completed_steps();
            if let Some(missing) = StepIndex::ALL[..5]
                .iter()
                .find(|s| !completed.contains(s))
            {
                return Err(StepError::missing_step(*missing, step));
            }
        }

        Ok(StepOutcome::Summary(SummaryOutput {
            step: step.label().to_string(),
            summary: build_summary(&record),
        }))
    }

    async fn record(&self, session_id: &str) -> SessionRecord {
        self.store.snapshot(session_id).await.unwrap_or_default()
    }

    async fn commit(&self, session_id: &str, output: StepOutput) -> StepOutcome {
        let step = output.step();
        self.store.put(session_id, output.clone()).await;
        tracing::info!(session_id, %step, "step output stored");
        StepOutcome::Generated(output)
    }

    /// 调用网关并按契约解析；仅非法响应可按策略带修复提示重试，网关失败从不重试
    async fn generate<T: StepContract>(
        &self,
        session_id: &str,
        step: StepIndex,
        prompt: Vec<Message>,
    ) -> Result<T, StepError> {
        let mut messages = prompt;
        let mut retries_left = self.policy.invalid_response_retries;
        loop {
            tracing::debug!(session_id, %step, messages = messages.len(), "calling llm");
            let text = self.llm.complete(&messages, &self.options).await.map_err(|e| {
                tracing::warn!(session_id, %step, "llm call failed: {}", e);
                StepError::from(e)
            })?;

            let err = match parse_step_output::<T>(&text) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => StepError::from(e),
            };
            tracing::warn!(session_id, %step, "invalid llm response: {}", err);

            match self.recovery.handle(&err, step) {
                RecoveryAction::RetryWithPrompt(hint) if retries_left > 0 => {
                    retries_left -= 1;
                    messages = with_repair_hint(messages, &text, &hint);
                }
                _ => return Err(err),
            }
        }
    }
}

fn require_session_id(session_id: &str) -> Result<&str, StepError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        Err(StepError::MissingSessionId)
    } else {
        Ok(trimmed)
    }
}

/// 按 id 从 Step 2 输出中取出假设；未选择或不存在均为前置条件不满足
pub fn select_hypothesis<'a>(
    hypotheses: &'a HypothesesOutput,
    choice: Option<&str>,
) -> Result<&'a Hypothesis, StepError> {
    let id = choice.map(str::trim).filter(|id| !id.is_empty()).ok_or_else(|| {
        StepError::unknown_selection("no hypothesis selected, pass its id as choice")
    })?;
    hypotheses.find(id).ok_or_else(|| {
        StepError::unknown_selection(format!(
            "hypothesis '{}' not found in {} (available: {})",
            id,
            StepIndex::Step2,
            hypothesis_ids(hypotheses)
        ))
    })
}

/// Step 4/5 重新取得所选假设：用 Step 3 回显的 id 在 Step 2 中查找
fn rederive_hypothesis(record: &SessionRecord, requested: StepIndex) -> Result<Hypothesis, StepError> {
    let instrument = record
        .step3
        .as_ref()
        .ok_or_else(|| StepError::missing_step(StepIndex::Step3, requested))?;
    let hypotheses = record
        .step2
        .as_ref()
        .ok_or_else(|| StepError::missing_step(StepIndex::Step2, requested))?;
    select_hypothesis(hypotheses, Some(&instrument.hypothesis.id)).cloned()
}
