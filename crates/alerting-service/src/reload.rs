//! 规则集重载
//!
//! 规则文件变更时由 `RulesFileWatcher` 调用：读取文件、编译、原子替换。

use alerting_engine::{AlertingEngine, RulesProvider};
use alerting_shared::error::AlertingError;
use alerting_shared::observability::metrics;
use alerting_shared::rules_watcher::ReloadTarget;
use std::sync::Arc;
use tracing::info;

pub struct EngineReloader {
    engine: Arc<AlertingEngine>,
    provider: Arc<dyn RulesProvider>,
}

impl EngineReloader {
    pub fn new(engine: Arc<AlertingEngine>, provider: Arc<dyn RulesProvider>) -> Self {
        Self { engine, provider }
    }

    /// 加载规则集并返回版本号
    pub fn load(&self) -> Result<u32, AlertingError> {
        match self.engine.reload_from(self.provider.as_ref()) {
            Ok(version) => {
                metrics::record_rules_reload(true, Some(version));
                info!(
                    engine = %self.engine.name(),
                    rules_version = version,
                    rules = self.engine.rule_set().len(),
                    "规则集已生效"
                );
                Ok(version)
            }
            Err(e) => {
                metrics::record_rules_reload(false, None);
                Err(AlertingError::RulesLoad(e.to_string()))
            }
        }
    }
}

impl ReloadTarget for EngineReloader {
    fn reload(&self) -> Result<(), AlertingError> {
        self.load().map(|_| ())
    }
}
