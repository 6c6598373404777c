//! Type-specific `node_param` payloads.
//!
//! Field names follow the document the editor persists (`snake_case`), so a
//! saved graph loads back without translation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Branch, VariableRef};
use crate::value::ValueType;

// =============================================================================
// SHARED CONFIG BLOCKS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ErrorStrategy {
    #[default]
    Noop,
    DefaultValue,
    FailBranch,
}

/// Exception handling attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TryCatchConfig {
    pub strategy: ErrorStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_values: Option<Vec<DefaultValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultValue {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub retry_enabled: bool,
    pub max_retries: u32,
    /// Milliseconds between attempts.
    pub retry_interval: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            retry_enabled: false,
            max_retries: 3,
            retry_interval: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    #[default]
    #[serde(rename = "self")]
    Own,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortMemoryConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub source: MemorySource,
    pub round: u32,
    pub param: VariableRef,
}

impl Default for ShortMemoryConfig {
    fn default() -> Self {
        ShortMemoryConfig {
            enabled: false,
            source: MemorySource::Own,
            round: 3,
            param: VariableRef::refer("historyList", None, ValueType::array_of(ValueType::String)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    pub enable: bool,
    #[serde(default)]
    pub params: Vec<VariableRef>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        VisionConfig {
            enable: false,
            params: vec![VariableRef::refer("imageContent", None, ValueType::File)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_model_mode")]
    pub mode: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub vision_config: VisionConfig,
}

fn default_model_mode() -> String {
    "chat".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            model_id: String::new(),
            model_name: String::new(),
            provider: String::new(),
            mode: default_model_mode(),
            params: Vec::new(),
            vision_config: VisionConfig::default(),
        }
    }
}

// =============================================================================
// PER-TYPE PARAMS
// =============================================================================

/// Parameters of node types that carry no configuration of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EmptyParam {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndOutputType {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EndParam {
    pub output_type: EndOutputType,
    #[serde(default)]
    pub text_template: String,
    #[serde(default)]
    pub json_params: Vec<VariableRef>,
    #[serde(default)]
    pub stream_switch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParam {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub stream_switch: bool,
}

impl Default for OutputParam {
    fn default() -> Self {
        OutputParam {
            output: String::new(),
            stream_switch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LlmParam {
    #[serde(default)]
    pub sys_prompt_content: String,
    #[serde(default)]
    pub prompt_content: String,
    #[serde(default)]
    pub model_config: ModelConfig,
    #[serde(default)]
    pub short_memory: ShortMemoryConfig,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub try_catch_config: TryCatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptParam {
    pub script_type: String,
    #[serde(default)]
    pub script_content: String,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub try_catch_config: TryCatchConfig,
}

impl Default for ScriptParam {
    fn default() -> Self {
        ScriptParam {
            script_type: "python".into(),
            script_content: String::new(),
            retry_config: RetryConfig::default(),
            try_catch_config: TryCatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JudgeParam {
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IteratorType {
    #[default]
    #[serde(rename = "byArray")]
    ByArray,
    #[serde(rename = "byCount")]
    ByCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorParam {
    pub iterator_type: IteratorType,
    pub count_limit: u32,
    /// Intermediate variables visible inside the loop body.
    #[serde(default)]
    pub variable_parameters: Vec<VariableRef>,
    /// Early-exit conditions evaluated after each round.
    #[serde(default)]
    pub terminations: Vec<Branch>,
}

impl Default for IteratorParam {
    fn default() -> Self {
        IteratorParam {
            iterator_type: IteratorType::ByArray,
            count_limit: 10,
            variable_parameters: Vec::new(),
            terminations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ParallelErrorStrategy {
    #[default]
    Terminated,
    ContinueOnError,
    RemoveErrorOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelParam {
    pub batch_size: u32,
    pub concurrent_size: u32,
    #[serde(default)]
    pub error_strategy: ParallelErrorStrategy,
}

impl Default for ParallelParam {
    fn default() -> Self {
        ParallelParam {
            batch_size: 100,
            concurrent_size: 5,
            error_strategy: ParallelErrorStrategy::Terminated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParam {
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    #[serde(default)]
    pub prompt_strategy: String,
    pub top_k: u32,
    pub similarity_threshold: f64,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub try_catch_config: TryCatchConfig,
}

impl Default for RetrievalParam {
    fn default() -> Self {
        RetrievalParam {
            knowledge_base_ids: Vec::new(),
            prompt_strategy: String::new(),
            top_k: 10,
            similarity_threshold: 0.8,
            retry_config: RetryConfig::default(),
            try_catch_config: TryCatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableHandleMode {
    #[default]
    Group,
    Template,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GroupStrategy {
    #[default]
    FirstNotNull,
    LastNotNull,
}

/// One aggregation group: the first (or last) non-null variable wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableGroup {
    pub group_id: String,
    pub group_name: String,
    pub output_type: ValueType,
    #[serde(default)]
    pub group_strategy: GroupStrategy,
    #[serde(default)]
    pub variables: Vec<VariableRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariableHandleParam {
    #[serde(rename = "type")]
    pub mode: VariableHandleMode,
    #[serde(default)]
    pub groups: Vec<VariableGroup>,
    #[serde(default)]
    pub template_content: String,
    #[serde(default)]
    pub json_params: Vec<VariableRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractParam {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParameterExtractorParam {
    #[serde(default)]
    pub model_config: ModelConfig,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub extract_params: Vec<ExtractParam>,
    #[serde(default)]
    pub short_memory: ShortMemoryConfig,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub try_catch_config: TryCatchConfig,
}
