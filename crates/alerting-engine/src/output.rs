//! 引擎输出
//!
//! 每个输入事件最多产生一个输出：命中事件或错误信封。未命中的事件不产生输出。

use crate::error::Result;
use crate::event::Event;
use serde::{Deserialize, Serialize};

/// 错误信封的 `error_type`
pub const ALERTING_ERROR_TYPE: &str = "alerting_error";
/// 错误信封的来源类型
pub const ERROR_SENSOR_TYPE: &str = "error";

/// 错误信封
///
/// 输入解析失败或规则评估出错时发往错误通道，`message` 以故障种类名开头。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub failed_sensor_type: String,
    pub error_type: String,
    #[serde(rename = "source.type")]
    pub sensor_type: String,
    pub message: String,
    pub raw_message: String,
}

impl ErrorEnvelope {
    pub fn new(
        engine_name: impl Into<String>,
        message: impl Into<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            failed_sensor_type: engine_name.into(),
            error_type: ALERTING_ERROR_TYPE.to_string(),
            sensor_type: ERROR_SENSOR_TYPE.to_string(),
            message: message.into(),
            raw_message: raw_message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 单个事件的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// 命中规则的事件
    Alert(Event),
    Error(ErrorEnvelope),
    /// 没有规则命中（或规则被抑制）
    None,
}

impl EngineOutput {
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn alert(&self) -> Option<&Event> {
        match self {
            Self::Alert(event) => Some(event),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Error(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// 序列化为待发送的消息体，`None` 不产生消息
    pub fn to_message(&self) -> Result<Option<String>> {
        match self {
            Self::Alert(event) => event.to_json().map(Some),
            Self::Error(envelope) => envelope.to_json().map(Some),
            Self::None => Ok(None),
        }
    }
}
