//! 各步 Prompt 构造
//!
//! 每步 = System（角色、输出规则、该步 JSON Schema）+ User（`[Step n/6]` 标记与上游数据）。
//! 上游数据一律以 JSON 嵌入，不做自由文本拼接。

use serde::Serialize;

use crate::contract::{
    step_schema_json, HypothesesOutput, Hypothesis, PatchOutput, ReproduceOutput, StepIndex,
};
use crate::llm::Message;

const SYSTEM_PREAMBLE: &str = "You are VibeStepper, a debugging assistant that walks a user through a fixed six-step protocol: \
reproduce the bug, hypothesize root causes, plan instrumentation, write a minimal patch, run regression, summarize. \
You never execute code; reason about it.";

fn system_message(step: StepIndex) -> Message {
    let schema = step_schema_json(step).unwrap_or_default();
    Message::system(format!(
        "{SYSTEM_PREAMBLE}\n\n\
         Output rules:\n\
         - Reply with exactly one JSON object and nothing else.\n\
         - The object must contain every key of the schema below and no other key.\n\
         - Set \"step\" to \"{label}\".\n\n\
         JSON Schema for {label}:\n{schema}",
        label = step.label(),
    ))
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn fixed_fields_hint(step: StepIndex) -> String {
    let question = step.question().unwrap_or_default();
    match step.options() {
        Some(options) => format!(
            "Use \"question\": \"{}\" and \"options\": {}.",
            question,
            serde_json::to_string(&options).unwrap_or_default()
        ),
        None => format!("Use \"question\": \"{}\".", question),
    }
}

/// Step 1：根据原始代码生成最小可复现用例
pub fn build_step1_prompt(code: &str) -> Vec<Message> {
    let step = StepIndex::Step1;
    vec![
        system_message(step),
        Message::user(format!(
            "[{label}] Reproduce the bug with a minimal reproducible example (MRE).\n\n\
             User code:\n```\n{code}\n```\n\n\
             Put the full source of the MRE in \"mre_file\" and the expected outcome of running it \
             (e.g. the crash and exception) in \"run_result\". {hint}",
            label = step.label(),
            hint = fixed_fields_hint(step),
        )),
    ]
}

/// Step 2：结合 MRE 枚举候选根因
pub fn build_step2_prompt(code: &str, reproduction: &ReproduceOutput) -> Vec<Message> {
    let step = StepIndex::Step2;
    vec![
        system_message(step),
        Message::user(format!(
            "[{label}] List candidate root causes.\n\n\
             User code:\n```\n{code}\n```\n\n\
             Step 1 result:\n{step1}\n\n\
             Give at least two hypotheses, each with a short unique \"id\" (\"a\", \"b\", \"c\", ...), \
             a one-line \"title\" and concrete \"evidence\" taken from the code or the run result. {hint}",
            label = step.label(),
            step1 = to_json(reproduction),
            hint = fixed_fields_hint(step),
        )),
    ]
}

/// Step 3：针对所选假设设计最小侵入的插桩
pub fn build_step3_prompt(code: &str, hypothesis: &Hypothesis) -> Vec<Message> {
    let step = StepIndex::Step3;
    vec![
        system_message(step),
        Message::user(format!(
            "[{label}] Plan minimally invasive instrumentation to confirm or refute the selected hypothesis.\n\n\
             User code:\n```\n{code}\n```\n\n\
             Selected hypothesis (echo it unchanged in \"hypothesis\"):\n{hypothesis}\n\n\
             Each \"instrumentation_plan\" item is one log line, assertion or probe and where to put it. {hint}",
            label = step.label(),
            hypothesis = to_json(hypothesis),
            hint = fixed_fields_hint(step),
        )),
    ]
}

/// Step 4：基于假设与插桩计划生成最小补丁
pub fn build_step4_prompt(code: &str, hypothesis: &Hypothesis, plan: &[String]) -> Vec<Message> {
    let step = StepIndex::Step4;
    vec![
        system_message(step),
        Message::user(format!(
            "[{label}] Write the minimal fix.\n\n\
             User code:\n```\n{code}\n```\n\n\
             Confirmed hypothesis:\n{hypothesis}\n\n\
             Instrumentation plan:\n{plan}\n\n\
             \"patch\" must be a unified diff with \"--- buggy\" and \"+++ fixed\" headers and @@ hunks. \
             \"impact_scope\" lists affected test cases and downstream functions. {hint}",
            label = step.label(),
            hypothesis = to_json(hypothesis),
            plan = to_json(&plan),
            hint = fixed_fields_hint(step),
        )),
    ]
}

/// Step 5：评估补丁后的回归结果矩阵
pub fn build_step5_prompt(
    code: &str,
    hypothesis: &Hypothesis,
    plan: &[String],
    patch: &PatchOutput,
) -> Vec<Message> {
    let step = StepIndex::Step5;
    vec![
        system_message(step),
        Message::user(format!(
            "[{label}] Predict the regression results after applying the patch.\n\n\
             User code:\n```\n{code}\n```\n\n\
             Hypothesis:\n{hypothesis}\n\n\
             Instrumentation plan:\n{plan}\n\n\
             Patch:\n```diff\n{diff}\n```\n\n\
             \"regression_results\" maps case ids (at least case_001 ~ case_004 and fuzz_10x) to \"✅\" or \"❌\". {hint}",
            label = step.label(),
            hypothesis = to_json(hypothesis),
            plan = to_json(&plan),
            diff = patch.patch,
            hint = fixed_fields_hint(step),
        )),
    ]
}

/// 重试时附在原 Prompt 后面：被拒绝的回复 + 修复提示
pub fn with_repair_hint(mut messages: Vec<Message>, rejected: &str, hint: &str) -> Vec<Message> {
    messages.push(Message::assistant(rejected.to_string()));
    messages.push(Message::user(hint.to_string()));
    messages
}

/// 假设列表的简短文本（日志用）
pub fn hypothesis_ids(output: &HypothesesOutput) -> String {
    output
        .hypotheses
        .iter()
        .map(|h| h.id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_step1_prompt_embeds_code_and_marker() {
        let messages = build_step1_prompt("for i in range(len(xs)+1): xs[i]");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("mre_file"));
        assert!(messages[1].content.starts_with("[Step 1/6]"));
        assert!(messages[1].content.contains("range(len(xs)+1)"));
    }

    #[test]
    fn test_step3_prompt_embeds_hypothesis() {
        let h = Hypothesis {
            id: "b".into(),
            title: "empty input".into(),
            evidence: "case_003".into(),
        };
        let messages = build_step3_prompt("code", &h);
        assert!(messages[1].content.contains("\"empty input\""));
        assert!(messages[1].content.contains("[Step 3/6]"));
    }

    #[test]
    fn test_repair_hint_appends_two_turns() {
        let messages = with_repair_hint(build_step1_prompt("x"), "nope", "fix it");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content, "fix it");
    }
}
