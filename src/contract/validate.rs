//! 上游响应的解析、校验与修复
//!
//! 解析顺序：提取 JSON 对象 → 解码为 Value（失败即 NotJson）→ 按契约结构体反序列化
//! （键集合不符即 Shape）→ 语义检查（空结果即 Empty）→ 规范化 step / question / options。

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::types::{
    HypothesesOutput, InstrumentOutput, PatchOutput, RegressionOutput, ReproduceOutput,
    StepIndex,
};

/// 上游响应不满足契约
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response does not match the {step} schema: {detail}")]
    Shape { step: StepIndex, detail: String },

    /// 结构合法但没有可用内容
    #[error("{step} response is empty: {detail}")]
    Empty { step: StepIndex, detail: String },
}

impl ContractError {
    fn shape(step: StepIndex, detail: impl Into<String>) -> Self {
        ContractError::Shape {
            step,
            detail: detail.into(),
        }
    }

    fn empty(step: StepIndex, detail: impl Into<String>) -> Self {
        ContractError::Empty {
            step,
            detail: detail.into(),
        }
    }
}

/// 每步输出契约：所属步骤、语义检查与规范化
pub trait StepContract: DeserializeOwned {
    const STEP: StepIndex;

    /// 语义检查，可就地修复可确定的小偏差（如回归结果符号）
    fn check(&mut self) -> Result<(), ContractError>;

    /// 用固定值覆盖 step / question / options
    fn canonicalize(&mut self);
}

/// 从模型输出中取出 JSON 对象：支持 ```json 代码块与前后夹带说明文字
///
/// 字符串值里也可能出现 ```（如 Markdown 写的 MRE），因此依次尝试最近的闭合围栏、
/// 最远的闭合围栏与整段文本，取第一个能解码的对象；都不能解码时返回第一个候选。
pub fn extract_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    let mut bodies = Vec::new();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        if let Some(end) = rest.find("```") {
            bodies.push(&rest[..end]);
        }
        if let Some(end) = rest.rfind("```") {
            bodies.push(&rest[..end]);
        }
        bodies.push(rest);
    }
    bodies.push(trimmed);

    let candidates: Vec<&str> = bodies.into_iter().filter_map(outermost_braces).collect();
    candidates
        .iter()
        .copied()
        .find(|c| serde_json::from_str::<serde_json::Value>(c).is_ok())
        .or_else(|| candidates.first().copied())
}

fn outermost_braces(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// 将上游文本解析为第 N 步的契约类型
pub fn parse_step_output<T: StepContract>(output: &str) -> Result<T, ContractError> {
    let json_str = extract_json_object(output)
        .ok_or_else(|| ContractError::NotJson(preview(output)))?;

    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ContractError::NotJson(format!("{}: {}", e, preview(json_str))))?;

    let mut parsed: T =
        serde_json::from_value(value).map_err(|e| ContractError::shape(T::STEP, e.to_string()))?;

    parsed.check()?;
    parsed.canonicalize();
    Ok(parsed)
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    let text = text.trim();
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn fixed_question(step: StepIndex) -> String {
    step.question().unwrap_or_default().to_string()
}

impl StepContract for ReproduceOutput {
    const STEP: StepIndex = StepIndex::Step1;

    fn check(&mut self) -> Result<(), ContractError> {
        if self.mre_file.trim().is_empty() {
            return Err(ContractError::empty(Self::STEP, "mre_file is blank"));
        }
        Ok(())
    }

    fn canonicalize(&mut self) {
        self.step = Self::STEP.label().to_string();
        self.question = fixed_question(Self::STEP);
        if let Some(options) = Self::STEP.options() {
            self.options = options;
        }
    }
}

impl StepContract for HypothesesOutput {
    const STEP: StepIndex = StepIndex::Step2;

    fn check(&mut self) -> Result<(), ContractError> {
        if self.hypotheses.is_empty() {
            return Err(ContractError::empty(Self::STEP, "no hypotheses"));
        }
        let mut seen = HashSet::new();
        for h in &mut self.hypotheses {
            h.id = h.id.trim().to_string();
            if h.id.is_empty() {
                return Err(ContractError::shape(Self::STEP, "hypothesis with blank id"));
            }
            if !seen.insert(h.id.clone()) {
                return Err(ContractError::shape(
                    Self::STEP,
                    format!("duplicate hypothesis id '{}'", h.id),
                ));
            }
        }
        Ok(())
    }

    fn canonicalize(&mut self) {
        self.step = Self::STEP.label().to_string();
        self.question = fixed_question(Self::STEP);
    }
}

impl StepContract for InstrumentOutput {
    const STEP: StepIndex = StepIndex::Step3;

    fn check(&mut self) -> Result<(), ContractError> {
        self.instrumentation_plan.retain(|item| !item.trim().is_empty());
        if self.instrumentation_plan.is_empty() {
            return Err(ContractError::empty(Self::STEP, "instrumentation_plan is empty"));
        }
        Ok(())
    }

    fn canonicalize(&mut self) {
        self.step = Self::STEP.label().to_string();
        self.question = fixed_question(Self::STEP);
        if let Some(options) = Self::STEP.options() {
            self.options = options;
        }
    }
}

static DIFF_OLD_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--- \S").expect("valid diff header regex"));
static DIFF_NEW_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\+\+\+ \S").expect("valid diff header regex"));
static DIFF_HUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^@@ .*@@").expect("valid hunk header regex"));

/// patch 是否具有 unified diff 的形状
pub fn is_unified_diff(patch: &str) -> bool {
    DIFF_OLD_HEADER.is_match(patch) && DIFF_NEW_HEADER.is_match(patch) && DIFF_HUNK.is_match(patch)
}

impl StepContract for PatchOutput {
    const STEP: StepIndex = StepIndex::Step4;

    fn check(&mut self) -> Result<(), ContractError> {
        if self.patch.trim().is_empty() {
            return Err(ContractError::empty(Self::STEP, "patch is blank"));
        }
        if !is_unified_diff(&self.patch) {
            return Err(ContractError::shape(
                Self::STEP,
                "patch is not a unified diff (expected ---, +++ and @@ headers)",
            ));
        }
        Ok(())
    }

    fn canonicalize(&mut self) {
        self.step = Self::STEP.label().to_string();
        self.question = fixed_question(Self::STEP);
        if let Some(options) = Self::STEP.options() {
            self.options = options;
        }
    }
}

pub const PASS_GLYPH: &str = "✅";
pub const FAIL_GLYPH: &str = "❌";

/// 将回归结果统一为 ✅ / ❌；无法识别时返回 None
pub fn normalize_glyph(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "✅" | "pass" | "passed" | "ok" | "success" => Some(PASS_GLYPH),
        "❌" | "fail" | "failed" | "error" | "failure" => Some(FAIL_GLYPH),
        _ => None,
    }
}

impl StepContract for RegressionOutput {
    const STEP: StepIndex = StepIndex::Step5;

    fn check(&mut self) -> Result<(), ContractError> {
        if self.regression_results.is_empty() {
            return Err(ContractError::empty(Self::STEP, "regression_results is empty"));
        }
        let mut normalized = BTreeMap::new();
        for (case_id, raw) in &self.regression_results {
            let glyph = normalize_glyph(raw).ok_or_else(|| {
                ContractError::shape(
                    Self::STEP,
                    format!("case '{}' has unrecognised result '{}'", case_id, raw),
                )
            })?;
            normalized.insert(case_id.clone(), glyph.to_string());
        }
        self.regression_results = normalized;
        Ok(())
    }

    fn canonicalize(&mut self) {
        self.step = Self::STEP.label().to_string();
        self.question = fixed_question(Self::STEP);
        if let Some(options) = Self::STEP.options() {
            self.options = options;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP1_JSON: &str = r#"{"step":"1","mre_file":"print([][0])","run_result":"IndexError","question":"?","options":{"1":"yes","2":"no"}}"#;

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nbye";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_fenced_reply_with_backticks_inside_strings() {
        let text = "```json\n{\"step\":\"1\",\"mre_file\":\"```python\\nprint([][0])\\n```\",\"run_result\":\"IndexError\",\"question\":\"?\",\"options\":{\"1\":\"a\",\"2\":\"b\"}}\n```";
        let out: ReproduceOutput = parse_step_output(text).unwrap();
        assert_eq!(out.mre_file, "```python\nprint([][0])\n```");
        assert_eq!(out.run_result, "IndexError");
    }

    #[test]
    fn test_extract_from_prose() {
        assert_eq!(extract_json_object("result: {\"a\": {}} done"), Some("{\"a\": {}}"));
        assert_eq!(extract_json_object("no json at all"), None);
    }

    #[test]
    fn test_parse_canonicalizes_fixed_fields() {
        let out: ReproduceOutput = parse_step_output(STEP1_JSON).unwrap();
        assert_eq!(out.step, "Step 1/6");
        assert_eq!(out.question, "确认此用例是否能复现问题?");
        assert_eq!(out.options.accept, "确认");
        assert_eq!(out.mre_file, "print([][0])");
    }

    #[test]
    fn test_non_json_is_not_json_error() {
        let err = parse_step_output::<ReproduceOutput>("I could not do that").unwrap_err();
        assert!(matches!(err, ContractError::NotJson(_)));
        let err = parse_step_output::<ReproduceOutput>("{ broken").unwrap_err();
        assert!(matches!(err, ContractError::NotJson(_)));
    }

    #[test]
    fn test_extra_or_missing_keys_are_shape_errors() {
        let extra = STEP1_JSON.replace("\"question\"", "\"note\":\"x\",\"question\"");
        let err = parse_step_output::<ReproduceOutput>(&extra).unwrap_err();
        assert!(matches!(err, ContractError::Shape { step: StepIndex::Step1, .. }));

        let missing = r#"{"step":"1","mre_file":"x","question":"?","options":{"1":"a","2":"b"}}"#;
        let err = parse_step_output::<ReproduceOutput>(missing).unwrap_err();
        assert!(matches!(err, ContractError::Shape { .. }));
    }

    #[test]
    fn test_empty_hypotheses_is_empty_error() {
        let err = parse_step_output::<HypothesesOutput>(r#"{"step":"2","hypotheses":[],"question":"?"}"#)
            .unwrap_err();
        assert!(matches!(err, ContractError::Empty { step: StepIndex::Step2, .. }));
    }

    #[test]
    fn test_duplicate_hypothesis_ids_rejected() {
        let json = r#"{"step":"2","hypotheses":[
            {"id":"a","title":"t1","evidence":"e1"},
            {"id":" a ","title":"t2","evidence":"e2"}],"question":"?"}"#;
        let err = parse_step_output::<HypothesesOutput>(json).unwrap_err();
        assert!(matches!(err, ContractError::Shape { .. }));
    }

    #[test]
    fn test_patch_must_be_unified_diff() {
        assert!(is_unified_diff("--- a.py\n+++ b.py\n@@ -1 +1 @@\n-x\n+y\n"));
        assert!(!is_unified_diff("replace x with y"));

        let json = r#"{"step":"4","patch":"replace x with y","impact_scope":[],"question":"?","options":{"1":"a","2":"b"}}"#;
        let err = parse_step_output::<PatchOutput>(json).unwrap_err();
        assert!(matches!(err, ContractError::Shape { step: StepIndex::Step4, .. }));
    }

    #[test]
    fn test_regression_glyphs_normalized() {
        let json = r#"{"step":"5","regression_results":{"case_001":"passed","case_002":"❌","fuzz_10x":"OK"},"question":"?","options":{"1":"a","2":"b"}}"#;
        let out: RegressionOutput = parse_step_output(json).unwrap();
        assert_eq!(out.regression_results["case_001"], PASS_GLYPH);
        assert_eq!(out.regression_results["case_002"], FAIL_GLYPH);
        assert_eq!(out.regression_results["fuzz_10x"], PASS_GLYPH);

        let bad = json.replace("\"OK\"", "\"maybe\"");
        assert!(matches!(
            parse_step_output::<RegressionOutput>(&bad),
            Err(ContractError::Shape { .. })
        ));
    }

    #[test]
    fn test_blank_plan_items_dropped_then_empty() {
        let json = r#"{"step":"3","hypothesis":{"id":"a","title":"t","evidence":"e"},"instrumentation_plan":["  "],"question":"?","options":{"1":"a","2":"b"}}"#;
        let err = parse_step_output::<InstrumentOutput>(json).unwrap_err();
        assert!(matches!(err, ContractError::Empty { .. }));
    }
}
