//! 告警服务
//!
//! 将告警引擎接入 Kafka：消费归一化事件、发布告警与错误信封，并在规则文件变更时热更新规则集。

pub mod consumer;
pub mod error;
pub mod reload;
pub mod sink;

pub use consumer::{AlertingConsumer, handle_message};
pub use error::ServiceError;
pub use reload::EngineReloader;
pub use sink::{KafkaSink, OutputTopics};
