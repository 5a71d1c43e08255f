//! 共享库
//!
//! 告警服务共用的基础设施：分层配置、错误类型、可观测性初始化、Kafka 传输与规则文件热更新。

pub mod config;
pub mod error;
pub mod kafka;
pub mod observability;
pub mod rules_watcher;

pub use config::{AppConfig, EngineConfig, KafkaConfig, ObservabilityConfig};
pub use error::{AlertingError, Result};
