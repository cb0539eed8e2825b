//! 六步调试流程的数据契约
//!
//! 每步输出都是固定键集合的结构体：`deny_unknown_fields` + 全部字段必填，
//! 反序列化成功即说明键集合与契约完全一致。

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 流程中的步骤编号（Step 1/6 ~ Step 6/6）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepIndex {
    Step1,
    Step2,
    Step3,
    Step4,
    Step5,
    Step6,
}

impl StepIndex {
    pub const ALL: [StepIndex; 6] = [
        StepIndex::Step1,
        StepIndex::Step2,
        StepIndex::Step3,
        StepIndex::Step4,
        StepIndex::Step5,
        StepIndex::Step6,
    ];

    pub fn number(self) -> u8 {
        match self {
            StepIndex::Step1 => 1,
            StepIndex::Step2 => 2,
            StepIndex::Step3 => 3,
            StepIndex::Step4 => 4,
            StepIndex::Step5 => 5,
            StepIndex::Step6 => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.number() == n)
    }

    /// 响应里的规范 `step` 标签
    pub fn label(self) -> &'static str {
        match self {
            StepIndex::Step1 => "Step 1/6",
            StepIndex::Step2 => "Step 2/6",
            StepIndex::Step3 => "Step 3/6",
            StepIndex::Step4 => "Step 4/6",
            StepIndex::Step5 => "Step 5/6",
            StepIndex::Step6 => "Step 6/6",
        }
    }

    /// 本步输出末尾向用户提出的固定问题（Step 6 无）
    pub fn question(self) -> Option<&'static str> {
        match self {
            StepIndex::Step1 => Some("确认此用例是否能复现问题?"),
            StepIndex::Step2 => Some("请选择可信假设 [a/b/c...]"),
            StepIndex::Step3 => Some("是否采纳?"),
            StepIndex::Step4 => Some("是否应用此补丁?"),
            StepIndex::Step5 => Some("确认进入最后一步?"),
            StepIndex::Step6 => None,
        }
    }

    /// 本步固定的选项 {"1": .., "2": ..}；Step 2 以假设 id 作答，Step 6 无选项
    pub fn options(self) -> Option<StepOptions> {
        let (accept, reject) = match self {
            StepIndex::Step1 => ("确认", "回退"),
            StepIndex::Step3 => ("全部采纳", "自定义组合上述插桩"),
            StepIndex::Step4 => ("确认", "否 → 回退 Step3"),
            StepIndex::Step5 => ("确认", "否"),
            StepIndex::Step2 | StepIndex::Step6 => return None,
        };
        Some(StepOptions {
            accept: accept.to_string(),
            reject: reject.to_string(),
        })
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 选项映射：表面 token "1" / "2" → 展示文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StepOptions {
    #[serde(rename = "1")]
    pub accept: String,
    #[serde(rename = "2")]
    pub reject: String,
}

/// 候选根因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Hypothesis {
    /// 短标识，如 "a"、"b"、"c"；Step 3 的 choice 即为该值
    pub id: String,
    pub title: String,
    pub evidence: String,
}

/// Step 1：最小可复现用例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReproduceOutput {
    pub step: String,
    /// 最小可复现用例的完整源码
    pub mre_file: String,
    /// 运行该用例的预期结果（如崩溃信息）
    pub run_result: String,
    pub question: String,
    pub options: StepOptions,
}

/// Step 2：候选假设列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HypothesesOutput {
    pub step: String,
    pub hypotheses: Vec<Hypothesis>,
    pub question: String,
}

impl HypothesesOutput {
    /// 按 id 查找假设
    pub fn find(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }
}

/// Step 3：插桩计划
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InstrumentOutput {
    pub step: String,
    /// 回显所选假设；存储前以 Step 2 中的原始记录覆盖
    pub hypothesis: Hypothesis,
    pub instrumentation_plan: Vec<String>,
    pub question: String,
    pub options: StepOptions,
}

/// Step 4：最小补丁
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PatchOutput {
    pub step: String,
    /// unified diff 文本（--- / +++ / @@）
    pub patch: String,
    pub impact_scope: Vec<String>,
    pub question: String,
    pub options: StepOptions,
}

/// Step 5：回归测试矩阵
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RegressionOutput {
    pub step: String,
    /// case_id → ✅ / ❌
    pub regression_results: BTreeMap<String, String>,
    pub question: String,
    pub options: StepOptions,
}

/// 已校验的某一步输出（Step 1~5）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Reproduce(ReproduceOutput),
    Hypotheses(HypothesesOutput),
    Instrument(InstrumentOutput),
    Patch(PatchOutput),
    Regression(RegressionOutput),
}

impl StepOutput {
    pub fn step(&self) -> StepIndex {
        match self {
            StepOutput::Reproduce(_) => StepIndex::Step1,
            StepOutput::Hypotheses(_) => StepIndex::Step2,
            StepOutput::Instrument(_) => StepIndex::Step3,
            StepOutput::Patch(_) => StepIndex::Step4,
            StepOutput::Regression(_) => StepIndex::Step5,
        }
    }
}

impl From<ReproduceOutput> for StepOutput {
    fn from(o: ReproduceOutput) -> Self {
        StepOutput::Reproduce(o)
    }
}

impl From<HypothesesOutput> for StepOutput {
    fn from(o: HypothesesOutput) -> Self {
        StepOutput::Hypotheses(o)
    }
}

impl From<InstrumentOutput> for StepOutput {
    fn from(o: InstrumentOutput) -> Self {
        StepOutput::Instrument(o)
    }
}

impl From<PatchOutput> for StepOutput {
    fn from(o: PatchOutput) -> Self {
        StepOutput::Patch(o)
    }
}

impl From<RegressionOutput> for StepOutput {
    fn from(o: RegressionOutput) -> Self {
        StepOutput::Regression(o)
    }
}

/// Step 6 汇总中的最小用例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalCase {
    pub mre_file: String,
    pub run_result: String,
}

/// Step 6 汇总中的补丁
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPatch {
    pub patch: String,
    pub impact_scope: Vec<String>,
}

/// Step 6 调试纪要；缺失的步骤序列化为 null
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSummary {
    pub step1_minimal_case: Option<MinimalCase>,
    pub step2_hypothesis: Option<Hypothesis>,
    pub step3_instrument_plan: Option<Vec<String>>,
    pub step4_fix_patch: Option<FixPatch>,
    pub step5_regression: Option<BTreeMap<String, String>>,
}

/// Step 6 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub step: String,
    pub summary: DebugSummary,
}
