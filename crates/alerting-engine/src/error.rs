//! 告警引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("JsonParseError: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("InvalidEvent: 事件必须是 JSON 对象, 实际为 {actual}")]
    InvalidEvent { actual: String },

    #[error("MissingAttributes: 规则缺少必填属性 {0}")]
    MissingAttributes(String),

    #[error("InvalidRegex: 字段 '{field}' 的正则表达式无效: {message}")]
    InvalidRegex { field: String, message: String },

    #[error("InvalidMatcher: {0}")]
    InvalidMatcher(String),

    #[error("InvalidTransform: {0}")]
    InvalidTransform(String),

    #[error("InvalidRuleSet: {0}")]
    InvalidRuleSet(String),

    #[error("RulesProviderError: {0}")]
    Provider(#[from] std::io::Error),

    #[error("OutputSinkError: {0}")]
    Sink(String),
}

impl EngineError {
    /// 错误种类名称，写入诊断信息与错误信封，便于下游按故障类型检索
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JsonParse(_) => "JsonParseError",
            Self::InvalidEvent { .. } => "InvalidEvent",
            Self::MissingAttributes(_) => "MissingAttributes",
            Self::InvalidRegex { .. } => "InvalidRegex",
            Self::InvalidMatcher(_) => "InvalidMatcher",
            Self::InvalidTransform(_) => "InvalidTransform",
            Self::InvalidRuleSet(_) => "InvalidRuleSet",
            Self::Provider(_) => "RulesProviderError",
            Self::Sink(_) => "OutputSinkError",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
