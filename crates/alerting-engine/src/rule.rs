//! 规则
//!
//! 规则是有序步骤链 + 保护器 + 计数器的组合，构建后在所有工作线程间共享。
//!
//! 评估流程：
//! 1. 保护器处于抑制状态时直接返回 NO_MATCH，不执行步骤也不计数
//! 2. 依次执行步骤：ERROR 立即返回并计入 errors；FILTERED / NO_MATCH 返回本步骤执行前的事件
//!    （FILTERED 计入 filters）；MATCH 提交本步骤产生的事件并继续
//! 3. 全部 MATCH 后写入规则标识与阈值字段，通知保护器并计入 matches

use crate::error::{EngineError, Result};
use crate::event::{Event, fields};
use crate::governor::{RuleProtection, RuleProtectionConfig};
use crate::metrics::{MetricCounter, MetricName, MetricRegistry};
use crate::result::{EvaluationOutcome, EvaluationResult};
use crate::step::Evaluable;
use crate::testing_logger::{InactiveTestingLogger, TestingLogger};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// 匹配任意来源类型的通配值
pub const ANY_SOURCE_TYPE: &str = "*";

pub struct Rule {
    name: String,
    version: u32,
    full_name: String,
    author: String,
    description: String,
    source_type: String,
    steps: Vec<Box<dyn Evaluable>>,
    protection: RuleProtection,
    matches_counter: MetricCounter,
    filters_counter: MetricCounter,
    errors_counter: MetricCounter,
    logger: Arc<dyn TestingLogger>,
}

impl Rule {
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// `<name>_v<version>`，写入命中事件与指标名
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn protection(&self) -> &RuleProtection {
        &self.protection
    }

    pub fn protection_config(&self) -> &RuleProtectionConfig {
        self.protection.config()
    }

    pub fn matches_counter(&self) -> &MetricCounter {
        &self.matches_counter
    }

    pub fn filters_counter(&self) -> &MetricCounter {
        &self.filters_counter
    }

    pub fn errors_counter(&self) -> &MetricCounter {
        &self.errors_counter
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// 规则是否适用于该事件的来源类型
    pub fn applies_to(&self, event: &Event) -> bool {
        self.source_type == ANY_SOURCE_TYPE
            || event.sensor_type() == Some(self.source_type.as_str())
    }

    pub fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        self.evaluate_at(event, Utc::now())
    }

    /// 以指定时刻评估（保护窗口按该时刻滚动）
    pub fn evaluate_at(&self, event: &Event, now: DateTime<Utc>) -> EvaluationOutcome {
        if self.protection.check_suppressed(now) {
            debug!(rule = %self.full_name, "规则处于抑制状态，跳过评估");
            return EvaluationOutcome::no_match(event.clone());
        }

        debug!(rule = %self.full_name, "开始评估规则");
        let mut current = event.clone();

        for (index, step) in self.steps.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.evaluate(&current)))
                .unwrap_or_else(|payload| {
                    EvaluationOutcome::error("panic", panic_message(payload.as_ref()))
                });

            match outcome {
                EvaluationOutcome::Error { diagnostic } => {
                    debug!(
                        rule = %self.full_name,
                        step = index,
                        diagnostic = %diagnostic,
                        "规则评估出错"
                    );
                    self.errors_counter.increment();
                    return EvaluationOutcome::Error { diagnostic };
                }
                EvaluationOutcome::Ok {
                    result: EvaluationResult::Filtered,
                    ..
                } => {
                    self.filters_counter.increment();
                    return EvaluationOutcome::filtered(current);
                }
                EvaluationOutcome::Ok {
                    result: EvaluationResult::NoMatch,
                    ..
                } => {
                    return EvaluationOutcome::no_match(current);
                }
                EvaluationOutcome::Ok {
                    result: EvaluationResult::Match,
                    event,
                } => {
                    current = event;
                }
            }
        }

        current.insert(fields::FULL_RULE_NAME, self.full_name.clone());
        current.insert(fields::MAX_PER_HOUR, self.protection_config().max_per_hour);
        current.insert(fields::MAX_PER_DAY, self.protection_config().max_per_day);

        self.protection.record_match(now);
        self.matches_counter.increment();

        let msg = format!("the rule: {} matched", self.full_name);
        info!(rule = %self.full_name, "{}", msg);
        self.logger.append_message(&msg);

        EvaluationOutcome::matched(current)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("full_name", &self.full_name)
            .field("source_type", &self.source_type)
            .field("steps", &self.steps.len())
            .field("protection", self.protection.config())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "步骤评估时发生未知 panic".to_string()
    }
}

/// 规则构建器
///
/// `build` 校验必填属性（名称、版本、指标注册表），缺失时返回 `MissingAttributes`。
#[derive(Default)]
pub struct RuleBuilder {
    name: Option<String>,
    version: Option<u32>,
    author: String,
    description: String,
    source_type: Option<String>,
    protection: RuleProtectionConfig,
    protection_anchor: Option<DateTime<Utc>>,
    steps: Vec<Box<dyn Evaluable>>,
    registry: Option<Arc<MetricRegistry>>,
    logger: Option<Arc<dyn TestingLogger>>,
}

impl RuleBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 未设置时为 `*`
    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn protection(mut self, protection: RuleProtectionConfig) -> Self {
        self.protection = protection;
        self
    }

    /// 保护窗口起点，默认为构建时刻
    pub fn protection_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.protection_anchor = Some(anchor);
        self
    }

    pub fn add_step(mut self, step: impl Evaluable + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn add_boxed_step(mut self, step: Box<dyn Evaluable>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn metric_registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn TestingLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Rule> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| EngineError::MissingAttributes("rule_name".to_string()))?;
        let version = self
            .version
            .ok_or_else(|| EngineError::MissingAttributes("rule_version".to_string()))?;
        let registry = self
            .registry
            .ok_or_else(|| EngineError::MissingAttributes("metric_registry".to_string()))?;

        let full_name = format!("{}_v{}", name, version);

        let counter = |metric: MetricName| {
            registry.create_counter(&metric.name_with_suffix(&full_name), metric.description())
        };
        let matches_counter = counter(MetricName::RuleMatches);
        let filters_counter = counter(MetricName::RuleFilters);
        let errors_counter = counter(MetricName::RuleErrorMatches);

        let protection = RuleProtection::with_anchor(
            full_name.clone(),
            self.protection,
            self.protection_anchor.unwrap_or_else(Utc::now),
        );

        Ok(Rule {
            name,
            version,
            full_name,
            author: self.author,
            description: self.description,
            source_type: self
                .source_type
                .unwrap_or_else(|| ANY_SOURCE_TYPE.to_string()),
            steps: self.steps,
            protection,
            matches_counter,
            filters_counter,
            errors_counter,
            logger: self
                .logger
                .unwrap_or_else(|| Arc::new(InactiveTestingLogger)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FieldMatcher, FieldTransform};
    use crate::testing_logger::StringTestingLogger;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn alert() -> Event {
        Event::try_from(json!({"source.type": "secret", "is_alert": "TruE"})).unwrap()
    }

    fn builder(registry: &Arc<MetricRegistry>) -> RuleBuilder {
        Rule::builder()
            .name("test_rule")
            .version(1)
            .metric_registry(registry.clone())
            .protection_anchor(t0())
    }

    /// 先改写事件再返回指定结论的步骤
    struct MutateThen(EvaluationResult);

    impl Evaluable for MutateThen {
        fn evaluate(&self, event: &Event) -> EvaluationOutcome {
            let mut changed = event.clone();
            changed.insert("candidate", true);
            EvaluationOutcome::from_result(self.0, changed)
        }
    }

    struct Failing;

    impl Evaluable for Failing {
        fn evaluate(&self, _event: &Event) -> EvaluationOutcome {
            EvaluationOutcome::error("LookupError", "lookup table unavailable")
        }
    }

    struct Panicking;

    impl Evaluable for Panicking {
        fn evaluate(&self, _event: &Event) -> EvaluationOutcome {
            panic!("step exploded")
        }
    }

    #[test]
    fn test_build_requires_attributes() {
        let registry = Arc::new(MetricRegistry::new());

        let err = Rule::builder().version(1).metric_registry(registry.clone()).build();
        assert!(matches!(err, Err(EngineError::MissingAttributes(_))));

        let err = Rule::builder().name("r").metric_registry(registry).build();
        assert!(matches!(err, Err(EngineError::MissingAttributes(_))));

        let err = Rule::builder().name("r").version(1).build();
        assert!(matches!(err, Err(EngineError::MissingAttributes(_))));
    }

    #[test]
    fn test_match_sets_identity_and_counts() {
        let registry = Arc::new(MetricRegistry::new());
        let logger = Arc::new(StringTestingLogger::new());
        let rule = builder(&registry)
            .protection(RuleProtectionConfig::new(100, 10000))
            .add_step(FieldMatcher::regex("is_alert", "(?i)true", false, false).unwrap())
            .logger(logger.clone())
            .build()
            .unwrap();

        let outcome = rule.evaluate_at(&alert(), t0());
        let event = outcome.event().unwrap();
        assert!(outcome.is_match());
        assert_eq!(event.get(fields::FULL_RULE_NAME), Some(&json!("test_rule_v1")));
        assert_eq!(event.get(fields::MAX_PER_HOUR), Some(&json!(100)));
        assert_eq!(event.get(fields::MAX_PER_DAY), Some(&json!(10000)));

        assert_eq!(registry.value("rule_matches_test_rule_v1"), Some(1));
        assert_eq!(rule.filters_counter().value(), 0);
        assert_eq!(logger.messages(), vec!["the rule: test_rule_v1 matched"]);
    }

    #[test]
    fn test_filtered_discards_failing_step_mutation() {
        let registry = Arc::new(MetricRegistry::new());
        let rule = builder(&registry)
            .add_step(FieldTransform::set("stage", json!("one")).unwrap())
            .add_step(MutateThen(EvaluationResult::Filtered))
            .build()
            .unwrap();

        let outcome = rule.evaluate_at(&alert(), t0());
        assert_eq!(outcome.result(), Some(EvaluationResult::Filtered));
        let event = outcome.event().unwrap();
        assert_eq!(event.get("stage"), Some(&json!("one")));
        assert!(!event.contains("candidate"));
        assert_eq!(rule.filters_counter().value(), 1);
        assert_eq!(rule.matches_counter().value(), 0);
    }

    #[test]
    fn test_no_match_discards_mutation_without_counting() {
        let registry = Arc::new(MetricRegistry::new());
        let rule = builder(&registry)
            .add_step(MutateThen(EvaluationResult::NoMatch))
            .build()
            .unwrap();

        let outcome = rule.evaluate_at(&alert(), t0());
        assert_eq!(outcome.result(), Some(EvaluationResult::NoMatch));
        assert_eq!(outcome.event(), Some(&alert()));
        assert_eq!(registry.snapshot().iter().map(|(_, v)| v).sum::<u64>(), 0);
    }

    #[test]
    fn test_error_stops_chain() {
        let registry = Arc::new(MetricRegistry::new());
        let rule = builder(&registry)
            .add_step(Failing)
            .add_step(MutateThen(EvaluationResult::Match))
            .build()
            .unwrap();

        let outcome = rule.evaluate_at(&alert(), t0());
        assert!(outcome.diagnostic().unwrap().contains("LookupError"));
        assert_eq!(rule.errors_counter().value(), 1);
        assert_eq!(rule.matches_counter().value(), 0);
    }

    #[test]
    fn test_panicking_step_is_contained() {
        let registry = Arc::new(MetricRegistry::new());
        let rule = builder(&registry).add_step(Panicking).build().unwrap();

        let outcome = rule.evaluate_at(&alert(), t0());
        let diagnostic = outcome.diagnostic().unwrap();
        assert!(diagnostic.starts_with("panic"));
        assert!(diagnostic.contains("step exploded"));
        assert_eq!(rule.errors_counter().value(), 1);
    }

    #[test]
    fn test_protection_suppresses_after_threshold() {
        let registry = Arc::new(MetricRegistry::new());
        let rule = builder(&registry)
            .protection(RuleProtectionConfig::new(2, 100))
            .add_step(FieldMatcher::regex("is_alert", "(?i)true", false, false).unwrap())
            .build()
            .unwrap();

        let now = t0() + Duration::minutes(5);
        for _ in 0..3 {
            assert!(rule.evaluate_at(&alert(), now).is_match());
        }

        let outcome = rule.evaluate_at(&alert(), now);
        assert_eq!(outcome.result(), Some(EvaluationResult::NoMatch));
        assert_eq!(outcome.event(), Some(&alert()));
        assert_eq!(rule.matches_counter().value(), 3);

        // 小时窗口滚动后恢复
        assert!(rule.evaluate_at(&alert(), t0() + Duration::minutes(61)).is_match());
    }

    #[test]
    fn test_applies_to_source_type() {
        let registry = Arc::new(MetricRegistry::new());
        let any = builder(&registry).build().unwrap();
        assert!(any.applies_to(&alert()));

        let specific = builder(&registry).name("other").source_type("dns").build().unwrap();
        assert!(!specific.applies_to(&alert()));
        assert_eq!(specific.source_type(), "dns");
    }
}
