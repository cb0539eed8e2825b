//! 核心编排层：错误与恢复、选项解析、Prompt 构造、步骤编排与汇总

pub mod choice;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod recovery;
pub mod summary;

pub use choice::Choice;
pub use error::{ErrorBody, StepError};
pub use orchestrator::{
    select_hypothesis, PipelinePolicy, StepOrchestrator, StepOutcome, StepRequest,
    DECLINE_MESSAGE, NOT_IMPLEMENTED_MESSAGE, SKIPPED_MESSAGE,
};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use summary::build_summary;
