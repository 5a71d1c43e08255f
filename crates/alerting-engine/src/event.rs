//! 事件模型
//!
//! 事件是字段名到值的有序映射（保留插入顺序），在规则的步骤链中逐步传递。
//! 引擎只读取顶层字段；嵌套值会原样保留并随事件输出。

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 引擎读写的保留字段名
pub mod fields {
    /// 事件来源类型（传感器类型）
    pub const SENSOR_TYPE: &str = "source.type";
    pub const FULL_RULE_NAME: &str = "full_rule_name";
    pub const MAX_PER_HOUR: &str = "max_per_hour";
    pub const MAX_PER_DAY: &str = "max_per_day";
    pub const RULES_VERSION: &str = "rules_version";
}

/// 归一化事件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 字符串解析事件，非对象的 JSON 同样视为解析失败
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::try_from(value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// 字段的字符串表示：字符串取原值，数值与布尔取 JSON 文本，null/数组/对象返回 None
    pub fn get_as_string(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        // shift_remove 保持其余字段的相对顺序
        self.fields.shift_remove(field)
    }

    pub fn sensor_type(&self) -> Option<&str> {
        self.fields.get(fields::SENSOR_TYPE).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Event {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(EngineError::InvalidEvent {
                actual: json_type_name(&other).to_string(),
            }),
        }
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_order() {
        let event = Event::from_json(r#"{"b": 1, "a": "x", "c": true}"#).unwrap();
        let keys: Vec<&String> = event.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Event::from_json("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), "InvalidEvent");

        let err = Event::from_json("INVALID").unwrap_err();
        assert_eq!(err.kind(), "JsonParseError");
    }

    #[test]
    fn test_get_as_string() {
        let event = Event::try_from(json!({
            "s": "text",
            "n": 42,
            "f": 1.5,
            "b": false,
            "nested": {"x": 1},
            "null": null
        }))
        .unwrap();

        assert_eq!(event.get_as_string("s").as_deref(), Some("text"));
        assert_eq!(event.get_as_string("n").as_deref(), Some("42"));
        assert_eq!(event.get_as_string("f").as_deref(), Some("1.5"));
        assert_eq!(event.get_as_string("b").as_deref(), Some("false"));
        assert_eq!(event.get_as_string("nested"), None);
        assert_eq!(event.get_as_string("null"), None);
        assert_eq!(event.get_as_string("missing"), None);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut event = Event::from_json(r#"{"a": 1, "b": 2, "c": 3}"#).unwrap();
        event.remove("b");
        event.insert("d", 4);
        let keys: Vec<&String> = event.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_sensor_type() {
        let event = Event::from_json(r#"{"source.type": "secret"}"#).unwrap();
        assert_eq!(event.sensor_type(), Some("secret"));
        assert_eq!(Event::new().sensor_type(), None);
    }
}
