//! Step 6 调试纪要：把会话中已有的各步输出汇总为只读视图

use crate::contract::{DebugSummary, FixPatch, Hypothesis, MinimalCase};
use crate::session::SessionRecord;

/// 汇总会话记录；缺失的步骤为 None（序列化为 null）
pub fn build_summary(record: &SessionRecord) -> DebugSummary {
    DebugSummary {
        step1_minimal_case: record.step1.as_ref().map(|s| MinimalCase {
            mre_file: s.mre_file.clone(),
            run_result: s.run_result.clone(),
        }),
        step2_hypothesis: summary_hypothesis(record),
        step3_instrument_plan: record
            .step3
            .as_ref()
            .map(|s| s.instrumentation_plan.clone()),
        step4_fix_patch: record.step4.as_ref().map(|s| FixPatch {
            patch: s.patch.clone(),
            impact_scope: s.impact_scope.clone(),
        }),
        step5_regression: record
            .step5
            .as_ref()
            .map(|s| s.regression_results.clone()),
    }
}

/// 所选假设由 Step 3 的回显 id 决定；优先取 Step 2 中的原始记录
fn summary_hypothesis(record: &SessionRecord) -> Option<Hypothesis> {
    let echoed = &record.step3.as_ref()?.hypothesis;
    record
        .step2
        .as_ref()
        .and_then(|s| s.find(&echoed.id))
        .cloned()
        .or_else(|| Some(echoed.clone()))
}
