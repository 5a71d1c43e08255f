//! 规则集快照
//!
//! 评估线程通过 `ArcSwap::load_full` 取得当前规则集的 `Arc`（无锁），
//! 重载时整体替换。正在进行的评估继续使用旧快照直到完成，不会看到半更新的规则集。

use crate::ruleset::RuleSet;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct RuleSetHandle {
    current: Arc<ArcSwap<RuleSet>>,
}

impl RuleSetHandle {
    pub fn new(rule_set: RuleSet) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(rule_set)),
        }
    }

    /// 当前规则集快照
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    /// 原子替换规则集，返回被替换的旧快照
    pub fn replace(&self, rule_set: RuleSet) -> Arc<RuleSet> {
        let version = rule_set.version();
        let rules = rule_set.len();
        let previous = self.current.swap(Arc::new(rule_set));
        info!(
            previous_version = previous.version(),
            rules_version = version,
            rules,
            "规则集已替换"
        );
        previous
    }

    pub fn version(&self) -> u32 {
        self.current.load().version()
    }
}

impl Default for RuleSetHandle {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}
