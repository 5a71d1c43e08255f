//! 评估步骤
//!
//! 规则由有序的步骤链组成。每个步骤实现 `Evaluable`，配置驱动的步骤是一个封闭的枚举：
//! - `Matcher`：单字段谓词（正则 / 集合 / 子串），可取反，命中时可写入正则命名分组
//! - `Filter`：以匹配器为准入条件，不满足时返回 FILTERED
//! - `Transform`：字段重命名 / 删除 / 赋值，总是返回 MATCH
//!
//! 预期内的数据情况（例如字段缺失）不会产生 ERROR。正则在构建阶段编译，非法模式直接构建失败。

use crate::error::{EngineError, Result};
use crate::event::Event;
use crate::result::EvaluationOutcome;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashSet;

/// 对单个事件执行一次评估
pub trait Evaluable: Send + Sync {
    fn evaluate(&self, event: &Event) -> EvaluationOutcome;
}

#[derive(Debug, Clone)]
enum Predicate {
    Regex {
        regex: Regex,
        capture_names: Vec<String>,
    },
    InSet {
        values: HashSet<String>,
        case_insensitive: bool,
    },
    Contains {
        needle: String,
        case_insensitive: bool,
    },
}

/// 单字段匹配器
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    field: String,
    negated: bool,
    predicate: Predicate,
}

impl FieldMatcher {
    /// 正则匹配，命名分组在非取反命中时写入事件
    pub fn regex(
        field: impl Into<String>,
        pattern: &str,
        case_insensitive: bool,
        negated: bool,
    ) -> Result<Self> {
        let field = field.into();
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| EngineError::InvalidRegex {
                field: field.clone(),
                message: e.to_string(),
            })?;
        let capture_names = regex.capture_names().flatten().map(String::from).collect();

        Self::new(
            field,
            negated,
            Predicate::Regex {
                regex,
                capture_names,
            },
        )
    }

    /// 集合精确匹配，`data` 按行拆分为候选值
    pub fn in_set(
        field: impl Into<String>,
        data: &str,
        case_insensitive: bool,
        negated: bool,
    ) -> Result<Self> {
        let field = field.into();
        let values: HashSet<String> = data
            .lines()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| normalize(v, case_insensitive))
            .collect();

        if values.is_empty() {
            return Err(EngineError::InvalidMatcher(format!(
                "字段 '{}' 的 IS_IN_SET 匹配器没有候选值",
                field
            )));
        }

        Self::new(
            field,
            negated,
            Predicate::InSet {
                values,
                case_insensitive,
            },
        )
    }

    /// 子串匹配
    pub fn contains(
        field: impl Into<String>,
        needle: &str,
        case_insensitive: bool,
        negated: bool,
    ) -> Result<Self> {
        let field = field.into();
        if needle.is_empty() {
            return Err(EngineError::InvalidMatcher(format!(
                "字段 '{}' 的 CONTAINS 匹配器数据不能为空",
                field
            )));
        }

        Self::new(
            field,
            negated,
            Predicate::Contains {
                needle: normalize(needle, case_insensitive),
                case_insensitive,
            },
        )
    }

    fn new(field: String, negated: bool, predicate: Predicate) -> Result<Self> {
        if field.is_empty() {
            return Err(EngineError::InvalidMatcher("匹配字段不能为空".to_string()));
        }
        Ok(Self {
            field,
            negated,
            predicate,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// 计算谓词（已考虑取反），命中时返回需要写入事件的命名分组
    fn test(&self, event: &Event) -> (bool, Vec<(String, String)>) {
        let Some(value) = event.get_as_string(&self.field) else {
            return (self.negated, Vec::new());
        };

        let mut extracted = Vec::new();
        let holds = match &self.predicate {
            Predicate::Regex {
                regex,
                capture_names,
            } => match regex.captures(&value) {
                Some(caps) => {
                    if !self.negated {
                        for name in capture_names {
                            if let Some(m) = caps.name(name) {
                                extracted.push((name.clone(), m.as_str().to_string()));
                            }
                        }
                    }
                    true
                }
                None => false,
            },
            Predicate::InSet {
                values,
                case_insensitive,
            } => values.contains(&normalize(&value, *case_insensitive)),
            Predicate::Contains {
                needle,
                case_insensitive,
            } => normalize(&value, *case_insensitive).contains(needle.as_str()),
        };

        (holds != self.negated, extracted)
    }
}

impl Evaluable for FieldMatcher {
    fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        let (matched, extracted) = self.test(event);
        if !matched {
            return EvaluationOutcome::no_match(event.clone());
        }

        let mut current = event.clone();
        for (name, value) in extracted {
            current.insert(name, value);
        }
        EvaluationOutcome::matched(current)
    }
}

/// 过滤器：准入条件成立时放行，否则过滤
#[derive(Debug, Clone)]
pub struct FieldFilter {
    criterion: FieldMatcher,
}

impl FieldFilter {
    pub fn new(criterion: FieldMatcher) -> Self {
        Self { criterion }
    }
}

impl Evaluable for FieldFilter {
    fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        let (admitted, _) = self.criterion.test(event);
        if admitted {
            EvaluationOutcome::matched(event.clone())
        } else {
            EvaluationOutcome::filtered(event.clone())
        }
    }
}

/// 字段变换
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    Rename { field: String, new_name: String },
    Delete { field: String },
    Set { field: String, value: Value },
}

impl FieldTransform {
    pub fn rename(field: impl Into<String>, new_name: impl Into<String>) -> Result<Self> {
        let (field, new_name) = (field.into(), new_name.into());
        if field.is_empty() || new_name.is_empty() {
            return Err(EngineError::InvalidTransform(
                "RENAME_FIELD 需要 field 与 new_name".to_string(),
            ));
        }
        Ok(Self::Rename { field, new_name })
    }

    pub fn delete(field: impl Into<String>) -> Result<Self> {
        let field = field.into();
        if field.is_empty() {
            return Err(EngineError::InvalidTransform(
                "DELETE_FIELD 需要 field".to_string(),
            ));
        }
        Ok(Self::Delete { field })
    }

    pub fn set(field: impl Into<String>, value: Value) -> Result<Self> {
        let field = field.into();
        if field.is_empty() {
            return Err(EngineError::InvalidTransform("SET_FIELD 需要 field".to_string()));
        }
        if value.is_array() || value.is_object() || value.is_null() {
            return Err(EngineError::InvalidTransform(format!(
                "SET_FIELD '{}' 的值必须是字符串、数值或布尔",
                field
            )));
        }
        Ok(Self::Set { field, value })
    }
}

impl Evaluable for FieldTransform {
    fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        let mut current = event.clone();
        match self {
            Self::Rename { field, new_name } => {
                if let Some(value) = current.remove(field) {
                    current.insert(new_name.clone(), value);
                }
            }
            Self::Delete { field } => {
                current.remove(field);
            }
            Self::Set { field, value } => {
                current.insert(field.clone(), value.clone());
            }
        }
        EvaluationOutcome::matched(current)
    }
}

/// 配置驱动的步骤
#[derive(Debug, Clone)]
pub enum Step {
    Matcher(FieldMatcher),
    Filter(FieldFilter),
    Transform(FieldTransform),
}

impl Evaluable for Step {
    fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        match self {
            Self::Matcher(m) => m.evaluate(event),
            Self::Filter(f) => f.evaluate(event),
            Self::Transform(t) => t.evaluate(event),
        }
    }
}

fn normalize(value: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::EvaluationResult;
    use serde_json::json;

    fn event(value: Value) -> Event {
        Event::try_from(value).unwrap()
    }

    #[test]
    fn test_regex_matcher_case_insensitive_flag() {
        let matcher = FieldMatcher::regex("is_alert", "(?i)true", false, false).unwrap();
        let outcome = matcher.evaluate(&event(json!({"is_alert": "TruE"})));
        assert_eq!(outcome.result(), Some(EvaluationResult::Match));
    }

    #[test]
    fn test_regex_matcher_case_insensitive_option() {
        let matcher = FieldMatcher::regex("user", "^admin$", true, false).unwrap();
        assert!(matcher.evaluate(&event(json!({"user": "ADMIN"}))).is_match());
    }

    #[test]
    fn test_regex_matcher_on_numbers_and_booleans() {
        let matcher = FieldMatcher::regex("port", "^44[0-9]$", false, false).unwrap();
        assert!(matcher.evaluate(&event(json!({"port": 443}))).is_match());

        let matcher = FieldMatcher::regex("flag", "^false$", false, false).unwrap();
        assert!(matcher.evaluate(&event(json!({"flag": false}))).is_match());
    }

    #[test]
    fn test_missing_field_is_no_match() {
        let matcher = FieldMatcher::regex("missing", ".*", false, false).unwrap();
        let input = event(json!({"a": 1}));
        let outcome = matcher.evaluate(&input);
        assert_eq!(outcome.result(), Some(EvaluationResult::NoMatch));
        assert_eq!(outcome.event(), Some(&input));
    }

    #[test]
    fn test_negated_matcher() {
        let matcher = FieldMatcher::regex("user", "^root$", false, true).unwrap();
        assert!(!matcher.evaluate(&event(json!({"user": "root"}))).is_match());
        assert!(matcher.evaluate(&event(json!({"user": "alice"}))).is_match());
        assert!(matcher.evaluate(&event(json!({}))).is_match());
    }

    #[test]
    fn test_regex_named_groups_extracted() {
        let matcher =
            FieldMatcher::regex("path", r"^/home/(?P<home_user>[^/]+)/", false, false).unwrap();
        let outcome = matcher.evaluate(&event(json!({"path": "/home/alice/.ssh"})));
        let out = outcome.event().unwrap();
        assert_eq!(out.get("home_user"), Some(&json!("alice")));
    }

    #[test]
    fn test_negated_regex_does_not_extract() {
        let matcher = FieldMatcher::regex("path", r"^/tmp/(?P<name>.+)$", false, true).unwrap();
        let outcome = matcher.evaluate(&event(json!({"path": "/var/log"})));
        assert!(outcome.is_match());
        assert!(!outcome.event().unwrap().contains("name"));
    }

    #[test]
    fn test_no_match_never_mutates() {
        let matcher = FieldMatcher::regex("path", r"^/home/(?P<u>[^/]+)$", false, false).unwrap();
        let input = event(json!({"path": "/etc/passwd"}));
        assert_eq!(matcher.evaluate(&input).event(), Some(&input));
    }

    #[test]
    fn test_invalid_regex_fails_at_build() {
        let err = FieldMatcher::regex("f", "(unclosed", false, false).unwrap_err();
        assert_eq!(err.kind(), "InvalidRegex");
    }

    #[test]
    fn test_in_set_matcher() {
        let matcher = FieldMatcher::in_set("host", "web01\nWEB02\n\n", true, false).unwrap();
        assert!(matcher.evaluate(&event(json!({"host": "web02"}))).is_match());
        assert!(matcher.evaluate(&event(json!({"host": "WEB01"}))).is_match());
        assert!(!matcher.evaluate(&event(json!({"host": "db01"}))).is_match());

        let strict = FieldMatcher::in_set("host", "web01", false, false).unwrap();
        assert!(!strict.evaluate(&event(json!({"host": "WEB01"}))).is_match());
    }

    #[test]
    fn test_in_set_requires_values() {
        assert!(FieldMatcher::in_set("host", "\n \n", false, false).is_err());
    }

    #[test]
    fn test_contains_matcher() {
        let matcher = FieldMatcher::contains("cmd", "Mimikatz", true, false).unwrap();
        assert!(matcher.evaluate(&event(json!({"cmd": "run mimikatz.exe"}))).is_match());
        assert!(FieldMatcher::contains("cmd", "", false, false).is_err());
    }

    #[test]
    fn test_filter() {
        let filter = FieldFilter::new(FieldMatcher::regex("env", "^prod$", false, false).unwrap());
        let prod = event(json!({"env": "prod"}));
        let dev = event(json!({"env": "dev"}));

        assert_eq!(filter.evaluate(&prod).result(), Some(EvaluationResult::Match));
        assert_eq!(filter.evaluate(&dev).result(), Some(EvaluationResult::Filtered));
    }

    #[test]
    fn test_transforms() {
        let input = event(json!({"a": 1, "b": 2}));

        let out = FieldTransform::rename("a", "x").unwrap().evaluate(&input);
        let out = out.event().unwrap();
        assert_eq!(out.get("x"), Some(&json!(1)));
        assert!(!out.contains("a"));

        let out = FieldTransform::delete("b").unwrap().evaluate(&input);
        assert!(!out.event().unwrap().contains("b"));

        let out = FieldTransform::set("severity", json!("high"))
            .unwrap()
            .evaluate(&input);
        assert_eq!(out.event().unwrap().get("severity"), Some(&json!("high")));

        // 缺失字段的重命名不报错
        let out = FieldTransform::rename("missing", "y").unwrap().evaluate(&input);
        assert_eq!(out.event(), Some(&input));
    }

    #[test]
    fn test_set_rejects_composite_value() {
        assert!(FieldTransform::set("f", json!({"x": 1})).is_err());
        assert!(FieldTransform::set("", json!(1)).is_err());
    }
}
