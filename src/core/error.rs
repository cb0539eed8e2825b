//! 步骤错误类型与对外错误体
//!
//! 五类错误都在操作边界转换为 `{error: <message>}`，不会以 panic 形式泄漏到传输层。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::{ContractError, StepIndex};
use crate::core::RecoveryEngine;
use crate::llm::LlmError;

/// 单次步骤请求可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("session_id is required")]
    MissingSessionId,

    /// 前置步骤缺失（missing 为缺失的步骤），或所选假设 id 不存在（missing 为 None）
    #[error("precondition not met: {detail}")]
    PreconditionNotMet {
        missing: Option<StepIndex>,
        detail: String,
    },

    #[error("invalid option '{0}'")]
    InvalidChoice(String),

    /// 网关超时、鉴权或传输失败；细节只进日志
    #[error("upstream generation failed")]
    UpstreamGenerationFailed(#[source] LlmError),

    #[error("invalid upstream response: {0}")]
    InvalidUpstreamResponse(#[from] ContractError),
}

impl StepError {
    /// 缺少前置步骤输出
    pub fn missing_step(required: StepIndex, requested: StepIndex) -> Self {
        StepError::PreconditionNotMet {
            missing: Some(required),
            detail: format!("{} output is missing, run it before {}", required, requested),
        }
    }

    /// 前置步骤都在，但所选的假设不可用
    pub fn unknown_selection(detail: impl Into<String>) -> Self {
        StepError::PreconditionNotMet {
            missing: None,
            detail: detail.into(),
        }
    }

    /// 稳定的错误种类名（日志与指标用）
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::MissingSessionId => "missing_session_id",
            StepError::PreconditionNotMet { .. } => "precondition_not_met",
            StepError::InvalidChoice(_) => "invalid_choice",
            StepError::UpstreamGenerationFailed(_) => "upstream_generation_failed",
            StepError::InvalidUpstreamResponse(_) => "invalid_upstream_response",
        }
    }
}

impl From<LlmError> for StepError {
    fn from(e: LlmError) -> Self {
        StepError::UpstreamGenerationFailed(e)
    }
}

/// 对外错误体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    /// 错误信息 + 固定的恢复指引
    pub fn from_error(err: &StepError, step: StepIndex) -> Self {
        let guidance = RecoveryEngine::new().guidance(err, step);
        Self {
            error: format!("{}. {}", err, guidance),
        }
    }
}
