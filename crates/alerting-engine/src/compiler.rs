//! 规则集编译器
//!
//! 将 JSON 规则集文档编译为内存中的 `RuleSet`。所有校验在编译阶段完成
//! （必填属性、正则合法性、变换参数、规则全名唯一），任何一条规则非法则整个规则集编译失败。

use crate::error::{EngineError, Result};
use crate::metrics::MetricRegistry;
use crate::models::{MatcherDto, MatcherType, RuleDto, RulesDto, TransformDto, TransformType};
use crate::rule::Rule;
use crate::ruleset::RuleSet;
use crate::step::{FieldFilter, FieldMatcher, FieldTransform, Step};
use crate::testing_logger::TestingLogger;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// 规则集编译器
#[derive(Clone)]
pub struct RuleSetCompiler {
    registry: Arc<MetricRegistry>,
    logger: Option<Arc<dyn TestingLogger>>,
}

impl RuleSetCompiler {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            logger: None,
        }
    }

    /// 为编译出的规则注入测试日志
    pub fn with_logger(mut self, logger: Arc<dyn TestingLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn compile_from_json(&self, json: &str) -> Result<RuleSet> {
        let dto: RulesDto = serde_json::from_str(json)?;
        self.compile(dto)
    }

    pub fn compile(&self, dto: RulesDto) -> Result<RuleSet> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(dto.rules.len());

        for rule_dto in dto.rules {
            let rule = self.compile_rule(rule_dto)?;
            if !seen.insert(rule.full_name().to_string()) {
                return Err(EngineError::InvalidRuleSet(format!(
                    "规则 '{}' 重复定义",
                    rule.full_name()
                )));
            }
            debug!(rule = %rule.full_name(), steps = rule.step_count(), "规则已编译");
            rules.push(rule);
        }

        let tags = dto
            .tags
            .into_iter()
            .map(|t| (t.tag_name, t.tag_value))
            .collect();

        info!(
            rules_version = dto.rules_version,
            rules = rules.len(),
            "规则集编译完成"
        );
        Ok(RuleSet::new(dto.rules_version, tags, rules))
    }

    fn compile_rule(&self, dto: RuleDto) -> Result<Rule> {
        if dto.matchers.is_empty() {
            return Err(EngineError::MissingAttributes(format!(
                "规则 '{}' 至少需要一个 matcher",
                dto.rule_name
            )));
        }

        let mut builder = Rule::builder()
            .name(dto.rule_name)
            .version(dto.rule_version)
            .author(dto.rule_author)
            .description(dto.rule_description)
            .source_type(dto.source_type)
            .protection(dto.rule_protection.unwrap_or_default())
            .metric_registry(self.registry.clone());

        if let Some(logger) = &self.logger {
            builder = builder.logger(logger.clone());
        }

        for matcher in &dto.matchers {
            builder = builder.add_step(Step::Matcher(compile_matcher(matcher)?));
        }
        for filter in &dto.filters {
            builder = builder.add_step(Step::Filter(FieldFilter::new(compile_matcher(filter)?)));
        }
        for transform in &dto.transforms {
            builder = builder.add_step(Step::Transform(compile_transform(transform)?));
        }

        builder.build()
    }
}

fn compile_matcher(dto: &MatcherDto) -> Result<FieldMatcher> {
    match dto.matcher_type {
        MatcherType::RegexMatch => FieldMatcher::regex(
            dto.field.as_str(),
            &dto.data,
            dto.case_insensitive,
            dto.is_negated,
        ),
        MatcherType::IsInSet => FieldMatcher::in_set(
            dto.field.as_str(),
            &dto.data,
            dto.case_insensitive,
            dto.is_negated,
        ),
        MatcherType::Contains => FieldMatcher::contains(
            dto.field.as_str(),
            &dto.data,
            dto.case_insensitive,
            dto.is_negated,
        ),
    }
}

fn compile_transform(dto: &TransformDto) -> Result<FieldTransform> {
    match dto.transform_type {
        TransformType::RenameField => {
            let new_name = dto.new_name.as_deref().ok_or_else(|| {
                EngineError::InvalidTransform(format!(
                    "字段 '{}' 的 {} 缺少 new_name",
                    dto.field, dto.transform_type
                ))
            })?;
            FieldTransform::rename(dto.field.as_str(), new_name)
        }
        TransformType::DeleteField => FieldTransform::delete(dto.field.as_str()),
        TransformType::SetField => {
            let value = dto.value.clone().ok_or_else(|| {
                EngineError::InvalidTransform(format!(
                    "字段 '{}' 的 {} 缺少 value",
                    dto.field, dto.transform_type
                ))
            })?;
            FieldTransform::set(dto.field.as_str(), value)
        }
    }
}
