//! 规则集配置模型
//!
//! 与配置存储交换的 JSON 文档结构，由 `RuleSetCompiler` 编译为可执行的 `RuleSet`。

use crate::governor::RuleProtectionConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 规则集文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesDto {
    pub rules_version: u32,
    #[serde(default)]
    pub tags: Vec<TagDto>,
    pub rules: Vec<RuleDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDto {
    pub tag_name: String,
    pub tag_value: String,
}

/// 单条规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDto {
    pub rule_name: String,
    pub rule_version: u32,
    #[serde(default)]
    pub rule_author: String,
    #[serde(default)]
    pub rule_protection: Option<RuleProtectionConfig>,
    #[serde(default)]
    pub rule_description: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    pub matchers: Vec<MatcherDto>,
    #[serde(default)]
    pub filters: Vec<MatcherDto>,
    #[serde(default)]
    pub transforms: Vec<TransformDto>,
}

fn default_source_type() -> String {
    crate::rule::ANY_SOURCE_TYPE.to_string()
}

/// 匹配器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherType {
    RegexMatch,
    IsInSet,
    Contains,
}

impl fmt::Display for MatcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RegexMatch => "REGEX_MATCH",
            Self::IsInSet => "IS_IN_SET",
            Self::Contains => "CONTAINS",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherDto {
    pub matcher_type: MatcherType,
    #[serde(default)]
    pub is_negated: bool,
    pub field: String,
    pub data: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

/// 字段变换类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformType {
    RenameField,
    DeleteField,
    SetField,
}

impl fmt::Display for TransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RenameField => "RENAME_FIELD",
            Self::DeleteField => "DELETE_FIELD",
            Self::SetField => "SET_FIELD",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDto {
    pub transform_type: TransformType,
    pub field: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}
