//! Kafka 输出通道
//!
//! 命中事件写入输出 topic，错误信封写入错误 topic。

use alerting_engine::{EngineError, EngineOutput, OutputSink};
use alerting_shared::config::EngineConfig;
use alerting_shared::kafka::KafkaProducer;
use alerting_shared::observability::metrics;
use async_trait::async_trait;
use tracing::{debug, error};

/// 输出路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTopics {
    pub output: String,
    pub error: String,
}

impl OutputTopics {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            output: config.output_topic.clone(),
            error: config.error_topic.clone(),
        }
    }

    /// 选择目标 topic，`EngineOutput::None` 没有目标
    pub fn route(&self, output: &EngineOutput) -> Option<&str> {
        match output {
            EngineOutput::Alert(_) => Some(self.output.as_str()),
            EngineOutput::Error(_) => Some(self.error.as_str()),
            EngineOutput::None => None,
        }
    }
}

pub struct KafkaSink {
    producer: KafkaProducer,
    topics: OutputTopics,
}

impl KafkaSink {
    pub fn new(producer: KafkaProducer, topics: OutputTopics) -> Self {
        Self { producer, topics }
    }
}

#[async_trait]
impl OutputSink for KafkaSink {
    async fn publish(&self, output: EngineOutput) -> Result<(), EngineError> {
        let Some(topic) = self.topics.route(&output) else {
            return Ok(());
        };
        let Some(payload) = output.to_message()? else {
            return Ok(());
        };

        match self.producer.send(topic, None, &payload).await {
            Ok((partition, offset)) => {
                debug!(topic, partition, offset, "输出已发布");
                Ok(())
            }
            Err(e) => {
                error!(topic, error = %e, "输出发布失败");
                metrics::record_publish_failure(topic);
                Err(EngineError::Sink(e.to_string()))
            }
        }
    }
}
