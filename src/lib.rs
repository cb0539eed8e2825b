//! VibeStepper - 六步协议化调试助手
//!
//! 复现 → 假设 → 插桩 → 补丁 → 回归 → 纪要，每步输出作为下一步输入，按会话累积。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **contract**: 每步输出的数据契约、JSON Schema 与校验修复
//! - **core**: 步骤编排器、选项解析、Prompt、错误与恢复、Step 6 汇总
//! - **llm**: 文本生成网关抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 初始化
//! - **server**: HTTP 传输层（axum）
//! - **session**: 会话存储

pub mod config;
pub mod contract;
pub mod core;
pub mod llm;
pub mod observability;
pub mod server;
pub mod session;
