//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：按 User 消息中的步骤标记 `[Step n/6]` 返回符合契约的固定 JSON，便于离线跑通六步流程。
//! - ScriptedLlmClient：按顺序回放预设结果并记录每次收到的 Prompt，供测试使用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{last_user_content, GenerationOptions, LlmClient, LlmError, Message, Role};

const MOCK_STEP1: &str = r#"{
  "step": "Step 1/6",
  "mre_file": "def process_items(items):\n    for i in range(len(items) + 1):\n        print(items[i])\n\nprocess_items([\"a\", \"b\", \"c\"])\n",
  "run_result": "程序崩溃 (IndexError: list index out of range)",
  "question": "确认此用例是否能复现问题?",
  "options": {"1": "确认", "2": "回退"}
}"#;

const MOCK_STEP2: &str = r#"{
  "step": "Step 2/6",
  "hypotheses": [
    {"id": "a", "title": "循环边界错误: range(len(items) + 1) 越界一位", "evidence": "run_result 显示 IndexError，发生在最后一次迭代"},
    {"id": "b", "title": "空输入列表未处理", "evidence": "输入 [] 时 range(1) 仍会访问 items[0]"},
    {"id": "c", "title": "调用方传入的列表被并发修改", "evidence": "MRE 中无并发，证据较弱"}
  ],
  "question": "请选择可信假设 [a/b/c...]"
}"#;

const MOCK_STEP3: &str = r#"{
  "step": "Step 3/6",
  "hypothesis": {"id": "a", "title": "循环边界错误", "evidence": "IndexError"},
  "instrumentation_plan": [
    "在 loop 入口打印 i, len(items)",
    "在索引访问前断言 i < len(items)",
    "在函数入口打印输入列表长度"
  ],
  "question": "是否采纳?",
  "options": {"1": "全部采纳", "2": "自定义组合上述插桩"}
}"#;

const MOCK_STEP4: &str = r#"{
  "step": "Step 4/6",
  "patch": "--- buggy.py\n+++ fixed.py\n@@ -1,3 +1,3 @@\n def process_items(items):\n-    for i in range(len(items) + 1):\n+    for i in range(len(items)):\n         print(items[i])\n",
  "impact_scope": ["process_items()", "case_001 ~ case_004"],
  "question": "是否应用此补丁?",
  "options": {"1": "确认", "2": "否 → 回退 Step3"}
}"#;

const MOCK_STEP5: &str = r#"{
  "step": "Step 5/6",
  "regression_results": {"case_001": "✅", "case_002": "✅", "case_003": "✅", "case_004": "✅", "fuzz_10x": "✅"},
  "question": "确认进入最后一步?",
  "options": {"1": "确认", "2": "否"}
}"#;

/// Mock 客户端：识别步骤标记并返回该步的示例输出
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn canned(prompt: &str) -> Option<&'static str> {
        [
            ("[Step 1/6]", MOCK_STEP1),
            ("[Step 2/6]", MOCK_STEP2),
            ("[Step 3/6]", MOCK_STEP3),
            ("[Step 4/6]", MOCK_STEP4),
            ("[Step 5/6]", MOCK_STEP5),
        ]
        .into_iter()
        .find(|(marker, _)| prompt.trim_start().starts_with(marker))
        .map(|(_, body)| body)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        // 修复重试时最后一条 User 是提示语，标记在更早的 User 消息里
        messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| Self::canned(&m.content))
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// 回放式客户端：每次 complete 弹出一个预设结果；队列耗尽返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 追加一个成功回复
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, err: LlmError) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(err));
    }

    /// 已发生的调用次数
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 第 n 次调用收到的 User 消息内容
    pub fn user_prompt(&self, n: usize) -> Option<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(n)
            .map(|messages| last_user_content(messages).to_string())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}
