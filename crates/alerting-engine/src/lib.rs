//! 流式告警规则引擎
//!
//! 对归一化安全事件逐条评估有序规则集，提供：
//! - 由匹配器、过滤器、字段变换组成的规则步骤链
//! - 规则保护（每小时/每天命中上限，超限后抑制）
//! - 按规则与结果类型划分的进程级计数器
//! - 规则集原子热替换，以及错误信封输出

pub mod compiler;
pub mod engine;
pub mod error;
pub mod event;
pub mod governor;
pub mod metrics;
pub mod models;
pub mod output;
pub mod provider;
pub mod result;
pub mod rule;
pub mod ruleset;
pub mod sink;
pub mod step;
pub mod store;
pub mod testing_logger;

pub use compiler::RuleSetCompiler;
pub use engine::{AlertingEngine, DEFAULT_ENGINE_NAME};
pub use error::{EngineError, Result};
pub use event::{Event, fields};
pub use governor::{RuleProtection, RuleProtectionConfig};
pub use metrics::{MetricCounter, MetricName, MetricRegistry};
pub use models::RulesDto;
pub use output::{EngineOutput, ErrorEnvelope};
pub use provider::{FileRulesProvider, RulesProvider, StaticRulesProvider};
pub use result::{EvaluationOutcome, EvaluationResult};
pub use rule::{Rule, RuleBuilder};
pub use ruleset::RuleSet;
pub use sink::{MemorySink, OutputSink};
pub use step::{Evaluable, FieldFilter, FieldMatcher, FieldTransform, Step};
pub use store::RuleSetHandle;
pub use testing_logger::{InactiveTestingLogger, StringTestingLogger, TestingLogger};
