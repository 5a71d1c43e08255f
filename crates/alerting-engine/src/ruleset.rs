//! 规则集
//!
//! 按配置顺序评估规则，第一条 MATCH 的规则胜出；ERROR 终止本事件的评估。
//! 命中事件追加规则集标签与 `rules_version`。

use crate::event::{Event, fields};
use crate::result::{EvaluationOutcome, EvaluationResult};
use crate::rule::Rule;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug)]
pub struct RuleSet {
    version: u32,
    tags: Vec<(String, String)>,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(version: u32, tags: Vec<(String, String)>, rules: Vec<Rule>) -> Self {
        Self {
            version,
            tags,
            rules,
        }
    }

    /// 引擎首次加载规则之前使用的空规则集
    pub fn empty() -> Self {
        Self::new(0, Vec::new(), Vec::new())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, full_name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.full_name() == full_name)
    }

    pub fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        self.evaluate_at(event, Utc::now())
    }

    pub fn evaluate_at(&self, event: &Event, now: DateTime<Utc>) -> EvaluationOutcome {
        for rule in self.rules.iter().filter(|r| r.applies_to(event)) {
            match rule.evaluate_at(event, now) {
                EvaluationOutcome::Ok {
                    result: EvaluationResult::Match,
                    event: mut matched,
                } => {
                    for (name, value) in &self.tags {
                        matched.insert(name.as_str(), value.as_str());
                    }
                    matched.insert(fields::RULES_VERSION, self.version);
                    return EvaluationOutcome::matched(matched);
                }
                EvaluationOutcome::Error { diagnostic } => {
                    return EvaluationOutcome::Error { diagnostic };
                }
                EvaluationOutcome::Ok { result, .. } => {
                    debug!(rule = %rule.full_name(), result = %result, "规则未命中");
                }
            }
        }

        EvaluationOutcome::no_match(event.clone())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}
