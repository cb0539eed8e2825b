//! 步骤输出 JSON Schema 生成（schemars）
//!
//! 将每步契约的 Schema 拼入 Prompt，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};

use super::types::{
    HypothesesOutput, InstrumentOutput, PatchOutput, RegressionOutput, ReproduceOutput,
    StepIndex,
};

fn pretty<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 返回第 N 步输出的 JSON Schema 字符串；Step 6 不经过模型，返回 None
pub fn step_schema_json(step: StepIndex) -> Option<String> {
    match step {
        StepIndex::Step1 => Some(pretty::<ReproduceOutput>()),
        StepIndex::Step2 => Some(pretty::<HypothesesOutput>()),
        StepIndex::Step3 => Some(pretty::<InstrumentOutput>()),
        StepIndex::Step4 => Some(pretty::<PatchOutput>()),
        StepIndex::Step5 => Some(pretty::<RegressionOutput>()),
        StepIndex::Step6 => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_required_keys() {
        let schema = step_schema_json(StepIndex::Step4).unwrap();
        for key in ["patch", "impact_scope", "question", "options"] {
            assert!(schema.contains(key), "missing {key}");
        }
        assert!(step_schema_json(StepIndex::Step6).is_none());
    }

    #[test]
    fn test_options_schema_uses_surface_tokens() {
        let schema = step_schema_json(StepIndex::Step1).unwrap();
        assert!(schema.contains("\"1\""));
        assert!(schema.contains("\"2\""));
    }
}
