//! LLM 客户端抽象（文本生成网关）
//!
//! 编排器只依赖 LlmClient：给定结构化 Prompt 与生成参数，返回文本。
//! 超时、鉴权、传输失败统一归为 LlmError，编排器不关心具体后端。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;
use crate::llm::Message;

/// 单次生成的参数
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// 要求后端以严格 JSON 对象返回（response_format = json_object）
    pub json_mode: bool,
    /// 单次调用的最长等待时间；不做重试
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            json_mode: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl GenerationOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_tokens: cfg.generation.max_tokens,
            temperature: cfg.generation.temperature,
            json_mode: true,
            timeout: Duration::from_secs(cfg.llm.timeouts.request),
        }
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// 网关失败：调用方只看到「上游生成失败」，细节仅进日志
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 鉴权、限流、网络等 API 层错误
    #[error("api error: {0}")]
    Api(String),

    #[error("empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；一次调用即一次有界尝试
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
