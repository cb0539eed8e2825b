//! 错误恢复引擎
//!
//! 根据 StepError 返回 RecoveryAction：非法 JSON 可带修复提示重试（是否启用由配置决定），
//! 其余情况只给出固定的指引文本，不做自动重试。

use crate::contract::StepIndex;
use crate::core::StepError;

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让 LLM 重新生成（仅用于非法响应）
    RetryWithPrompt(String),
    /// 需要从某一步重新开始
    RestartFrom(StepIndex),
    /// 需要调用方修正输入
    AskUser(String),
    /// 终止当前请求，稍后重试
    Abort,
}

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &StepError, step: StepIndex) -> RecoveryAction {
        match err {
            StepError::InvalidUpstreamResponse(detail) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous reply was rejected: {detail}. \
                 Reply again with exactly one JSON object for {step} that matches the schema. \
                 Use every required key, add no other keys, and do not wrap it in Markdown."
            )),
            StepError::PreconditionNotMet {
                missing: Some(missing),
                ..
            } => RecoveryAction::RestartFrom(*missing),
            StepError::PreconditionNotMet { missing: None, .. } => RecoveryAction::AskUser(format!(
                "请从 {} 的假设列表中选择有效的假设 id。",
                StepIndex::Step2
            )),
            StepError::MissingSessionId => {
                RecoveryAction::AskUser("请在请求中提供 session_id。".to_string())
            }
            StepError::InvalidChoice(_) => {
                RecoveryAction::AskUser("无效的选项，请输入 1 或 2。".to_string())
            }
            StepError::UpstreamGenerationFailed(_) => RecoveryAction::Abort,
        }
    }

    /// 面向用户的固定指引文本
    pub fn guidance(&self, err: &StepError, step: StepIndex) -> String {
        match self.handle(err, step) {
            RecoveryAction::RetryWithPrompt(_) => "模型输出格式不符合要求，请重试。".to_string(),
            RecoveryAction::RestartFrom(from) => format!("请先完成 {from}。"),
            RecoveryAction::AskUser(msg) => msg,
            RecoveryAction::Abort => "生成服务暂不可用，请稍后重试。".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractError;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_invalid_response_retries_with_prompt() {
        let engine = RecoveryEngine::new();
        let err = StepError::InvalidUpstreamResponse(ContractError::NotJson("oops".into()));
        match engine.handle(&err, StepIndex::Step2) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("JSON"));
                assert!(msg.contains("Step 2/6"));
            }
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_precondition_restarts_missing_step() {
        let engine = RecoveryEngine::new();
        let err = StepError::missing_step(StepIndex::Step1, StepIndex::Step6);
        assert_eq!(
            engine.handle(&err, StepIndex::Step6),
            RecoveryAction::RestartFrom(StepIndex::Step1)
        );
        assert_eq!(engine.guidance(&err, StepIndex::Step6), "请先完成 Step 1/6。");
    }

    #[test]
    fn test_recovery_unknown_hypothesis_asks_for_valid_id() {
        let engine = RecoveryEngine::new();
        let err = StepError::unknown_selection("hypothesis 'z' not found");
        match engine.handle(&err, StepIndex::Step3) {
            RecoveryAction::AskUser(msg) => assert!(msg.contains("假设 id")),
            other => panic!("Expected AskUser, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_upstream_failure_aborts() {
        let engine = RecoveryEngine::new();
        let err = StepError::UpstreamGenerationFailed(LlmError::Api("401".into()));
        assert_eq!(engine.handle(&err, StepIndex::Step1), RecoveryAction::Abort);
        assert!(!engine.guidance(&err, StepIndex::Step1).contains("401"));
    }

    #[test]
    fn test_guidance_for_invalid_choice() {
        let engine = RecoveryEngine::new();
        let err = StepError::InvalidChoice("9".into());
        assert!(engine.guidance(&err, StepIndex::Step4).contains("1 或 2"));
    }
}
