//! 步骤契约：每步输出的类型、JSON Schema 与校验修复

pub mod schema;
pub mod types;
pub mod validate;

pub use schema::step_schema_json;
pub use types::{
    DebugSummary, FixPatch, HypothesesOutput, Hypothesis, InstrumentOutput, MinimalCase,
    PatchOutput, RegressionOutput, ReproduceOutput, StepIndex, StepOptions, StepOutput,
    SummaryOutput,
};
pub use validate::{
    extract_json_object, is_unified_diff, normalize_glyph, parse_step_output, ContractError,
    StepContract, FAIL_GLYPH, PASS_GLYPH,
};
