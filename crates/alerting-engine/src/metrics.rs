//! 规则指标注册表
//!
//! 进程级计数器集合，按 `<指标种类>_<规则全名>` 命名。计数器在规则构建时创建并注入规则，
//! 读取值用于测试与运维查询；同时镜像到 `metrics` facade，由 Prometheus exporter 导出。
//! 未安装 recorder 时镜像写入为空操作。

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 规则级指标种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RuleMatches,
    RuleFilters,
    RuleErrorMatches,
}

impl MetricName {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuleMatches => "rule_matches",
            Self::RuleFilters => "rule_filters",
            Self::RuleErrorMatches => "rule_error_matches",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RuleMatches => "Number of matches of the rule",
            Self::RuleFilters => "Number of filtered alerts by the rule",
            Self::RuleErrorMatches => "Number of error matches of the rule",
        }
    }

    pub fn name_with_suffix(&self, suffix: &str) -> String {
        format!("{}_{}", self.name(), suffix)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 单调递增计数器
///
/// Clone 后共享同一个底层值。
#[derive(Clone)]
pub struct MetricCounter {
    name: Arc<str>,
    description: Arc<str>,
    value: Arc<AtomicU64>,
    exported: metrics::Counter,
}

impl MetricCounter {
    fn new(name: &str, description: &str) -> Self {
        metrics::describe_counter!(name.to_string(), description.to_string());
        Self {
            name: Arc::from(name),
            description: Arc::from(description),
            value: Arc::new(AtomicU64::new(0)),
            exported: metrics::counter!(name.to_string()),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
        self.exported.increment(1);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for MetricCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricCounter")
            .field("name", &self.name)
            .field("value", &self.value())
            .finish()
    }
}

/// 进程级指标注册表
///
/// 同名计数器只创建一次：规则集重载后同名规则沿用原计数器，保证计数在进程生命周期内单调。
#[derive(Default)]
pub struct MetricRegistry {
    counters: DashMap<String, MetricCounter>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建计数器
    pub fn create_counter(&self, name: &str, description: &str) -> MetricCounter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| MetricCounter::new(name, description))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<MetricCounter> {
        self.counters.get(name).map(|c| c.value().clone())
    }

    /// 读取计数器当前值，不存在时返回 None
    pub fn value(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|c| c.value().value())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// 按名称排序的计数器快照
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut values: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }
}
