//! 告警引擎
//!
//! 面向传输层的入口：解析原始消息、用当前规则集快照评估、把结果转换为 `EngineOutput`。
//! 解析失败与评估错误都转换为错误信封，不会向调用方传播故障。

use crate::compiler::RuleSetCompiler;
use crate::error::Result;
use crate::event::Event;
use crate::metrics::MetricRegistry;
use crate::output::{EngineOutput, ErrorEnvelope};
use crate::provider::RulesProvider;
use crate::result::{EvaluationOutcome, EvaluationResult};
use crate::ruleset::RuleSet;
use crate::store::RuleSetHandle;
use crate::testing_logger::TestingLogger;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 默认引擎名称，写入错误信封的 `failed_sensor_type`
pub const DEFAULT_ENGINE_NAME: &str = "alerting";

pub struct AlertingEngine {
    name: String,
    registry: Arc<MetricRegistry>,
    compiler: RuleSetCompiler,
    rules: RuleSetHandle,
}

impl AlertingEngine {
    /// 创建不含任何规则的引擎
    pub fn new(name: impl Into<String>, registry: Arc<MetricRegistry>) -> Self {
        Self {
            name: name.into(),
            compiler: RuleSetCompiler::new(registry.clone()),
            registry,
            rules: RuleSetHandle::default(),
        }
    }

    /// 创建引擎并编译给定规则集
    pub fn from_json(
        name: impl Into<String>,
        registry: Arc<MetricRegistry>,
        rules_json: &str,
    ) -> Result<Self> {
        let engine = Self::new(name, registry);
        engine.reload(rules_json)?;
        Ok(engine)
    }

    /// 编译出的规则把命中信息写入测试日志，仅影响之后的重载
    pub fn with_testing_logger(mut self, logger: Arc<dyn TestingLogger>) -> Self {
        self.compiler = self.compiler.with_logger(logger);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// 规则集句柄，可与其他组件共享
    pub fn handle(&self) -> &RuleSetHandle {
        &self.rules
    }

    pub fn rule_set(&self) -> Arc<RuleSet> {
        self.rules.load()
    }

    pub fn rules_version(&self) -> u32 {
        self.rules.version()
    }

    /// 编译并替换规则集；编译失败时保留当前规则集
    pub fn reload(&self, rules_json: &str) -> Result<u32> {
        match self.compiler.compile_from_json(rules_json) {
            Ok(rule_set) => {
                let version = rule_set.version();
                self.rules.replace(rule_set);
                info!(engine = %self.name, rules_version = version, "规则集已加载");
                Ok(version)
            }
            Err(e) => {
                error!(
                    engine = %self.name,
                    error = %e,
                    current_version = self.rules.version(),
                    "规则集编译失败，保留当前规则集"
                );
                Err(e)
            }
        }
    }

    pub fn reload_from(&self, provider: &dyn RulesProvider) -> Result<u32> {
        let rules_json = provider.fetch_rules()?;
        self.reload(&rules_json)
    }

    /// 处理一条原始 JSON 消息
    pub fn process(&self, raw: &str) -> EngineOutput {
        self.process_at(raw, Utc::now())
    }

    pub fn process_at(&self, raw: &str, now: DateTime<Utc>) -> EngineOutput {
        match Event::from_json(raw) {
            Ok(event) => self.process_event_inner(&event, raw, now),
            Err(e) => {
                warn!(engine = %self.name, error = %e, "输入消息解析失败");
                EngineOutput::Error(ErrorEnvelope::new(&self.name, e.to_string(), raw))
            }
        }
    }

    /// 处理传输层的原始字节，非 UTF-8 内容按解析失败处理
    pub fn process_bytes(&self, payload: &[u8]) -> EngineOutput {
        match std::str::from_utf8(payload) {
            Ok(raw) => self.process(raw),
            Err(e) => {
                warn!(engine = %self.name, error = %e, "输入消息不是合法 UTF-8");
                EngineOutput::Error(ErrorEnvelope::new(
                    &self.name,
                    format!("JsonParseError: {}", e),
                    String::from_utf8_lossy(payload),
                ))
            }
        }
    }

    /// 处理已解析的事件
    pub fn process_event(&self, event: &Event) -> EngineOutput {
        let raw = event.to_json().unwrap_or_default();
        self.process_event_inner(event, &raw, Utc::now())
    }

    fn process_event_inner(&self, event: &Event, raw: &str, now: DateTime<Utc>) -> EngineOutput {
        let rule_set = self.rules.load();

        match rule_set.evaluate_at(event, now) {
            EvaluationOutcome::Ok {
                result: EvaluationResult::Match,
                event,
            } => EngineOutput::Alert(event),
            EvaluationOutcome::Ok { result, .. } => {
                debug!(engine = %self.name, result = %result, "事件未产生告警");
                EngineOutput::None
            }
            EvaluationOutcome::Error { diagnostic } => {
                warn!(engine = %self.name, diagnostic = %diagnostic, "规则评估出错");
                EngineOutput::Error(ErrorEnvelope::new(&self.name, diagnostic, raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::provider::MockRulesProvider;

    const RULES: &str = r#"{
        "rules_version": 1,
        "tags": [{"tag_name": "detection:source", "tag_value": "alerts"}],
        "rules": [{
            "rule_name": "test_rule",
            "rule_version": 1,
            "rule_author": "dummy",
            "rule_description": "is_alert is true",
            "source_type": "*",
            "matchers": [{"matcher_type": "REGEX_MATCH", "field": "is_alert", "data": "(?i)true"}]
        }]
    }"#;

    fn engine() -> AlertingEngine {
        AlertingEngine::from_json("nikita", Arc::new(MetricRegistry::new()), RULES).unwrap()
    }

    #[test]
    fn test_process_match() {
        let output = engine().process(r#"{"source.type": "secret", "is_alert": "TruE"}"#);
        let alert = output.alert().unwrap();
        assert_eq!(alert.get_as_string("full_rule_name").as_deref(), Some("test_rule_v1"));
        assert_eq!(alert.get_as_string("detection:source").as_deref(), Some("alerts"));
        assert_eq!(alert.sensor_type(), Some("secret"));
    }

    #[test]
    fn test_process_invalid_json() {
        let output = engine().process("INVALID");
        let envelope = output.error().unwrap();
        assert_eq!(envelope.failed_sensor_type, "nikita");
        assert!(envelope.message.contains("JsonParseError"));
        assert_eq!(envelope.raw_message, "INVALID");
    }

    #[test]
    fn test_process_non_object_json() {
        let output = engine().process("[1, 2, 3]");
        assert!(output.error().unwrap().message.starts_with("InvalidEvent"));
    }

    #[test]
    fn test_process_invalid_utf8() {
        let output = engine().process_bytes(&[0xff, 0xfe, b'{']);
        assert!(output.error().unwrap().message.contains("JsonParseError"));
    }

    #[test]
    fn test_no_match_is_no_output() {
        let output = engine().process(r#"{"source.type": "secret", "is_alert": "false"}"#);
        assert!(output.is_none());
    }

    #[test]
    fn test_failed_reload_keeps_rules() {
        let engine = engine();
        assert!(engine.reload(r#"{"rules_version": 2, "rules": [{}]}"#).is_err());
        assert_eq!(engine.rules_version(), 1);
        assert!(engine.process(r#"{"is_alert": "true"}"#).is_alert());
    }

    #[test]
    fn test_reload_from_provider() {
        let engine = AlertingEngine::new("nikita", Arc::new(MetricRegistry::new()));
        assert!(engine.rule_set().is_empty());

        let mut provider = MockRulesProvider::new();
        provider
            .expect_fetch_rules()
            .times(1)
            .returning(|| Ok(RULES.to_string()));

        assert_eq!(engine.reload_from(&provider).unwrap(), 1);
        assert_eq!(engine.rule_set().len(), 1);
    }

    #[test]
    fn test_provider_failure_is_reported() {
        let engine = engine();
        let mut provider = MockRulesProvider::new();
        provider.expect_fetch_rules().returning(|| {
            Err(EngineError::Provider(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "rules.json",
            )))
        });

        let err = engine.reload_from(&provider).unwrap_err();
        assert_eq!(err.kind(), "RulesProviderError");
        assert_eq!(engine.rules_version(), 1);
    }
}
