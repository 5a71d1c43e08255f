//! 事件消费与分发
//!
//! 从输入 topic 拉取归一化事件，交给引擎评估，再把输出发布到对应 topic。
//! 每条消息独立处理：解析失败、评估错误、发布失败都不会中断消费循环。

use alerting_engine::{AlertingEngine, EngineOutput, OutputSink};
use alerting_shared::config::AppConfig;
use alerting_shared::kafka::{InboundMessage, KafkaConsumer};
use alerting_shared::observability::metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

pub struct AlertingConsumer {
    consumer: KafkaConsumer,
    input_topic: String,
    engine: Arc<AlertingEngine>,
    sink: Arc<dyn OutputSink>,
}

impl AlertingConsumer {
    pub fn new(
        config: &AppConfig,
        engine: Arc<AlertingEngine>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, ServiceError> {
        let consumer = KafkaConsumer::new(&config.kafka)?;
        Ok(Self {
            consumer,
            input_topic: config.engine.input_topic.clone(),
            engine,
            sink,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ServiceError> {
        self.consumer.subscribe(&[self.input_topic.as_str()])?;
        info!(topic = %self.input_topic, engine = %self.engine.name(), "告警事件消费者已启动");

        let engine = self.engine;
        let sink = self.sink;

        self.consumer
            .run(shutdown, |msg| {
                let engine = &engine;
                let sink = &sink;
                async move {
                    handle_message(engine, sink.as_ref(), &msg).await;
                    Ok(())
                }
            })
            .await;

        info!("告警事件消费者已停止");
        Ok(())
    }
}

/// 处理单条消息，返回引擎输出的种类（alert / error / none）
pub async fn handle_message(
    engine: &AlertingEngine,
    sink: &dyn OutputSink,
    msg: &InboundMessage,
) -> &'static str {
    let started = Instant::now();
    let output = engine.process_bytes(&msg.payload);
    let outcome = outcome_label(&output);

    debug!(position = %msg.position(), outcome, "事件已评估");

    if !output.is_none()
        && let Err(e) = sink.publish(output).await
    {
        warn!(position = %msg.position(), error = %e, "输出发布失败，消息已丢弃");
    }

    metrics::record_event(outcome, started.elapsed().as_secs_f64());
    outcome
}

fn outcome_label(output: &EngineOutput) -> &'static str {
    match output {
        EngineOutput::Alert(_) => "alert",
        EngineOutput::Error(_) => "error",
        EngineOutput::None => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_engine::{EngineError, MetricRegistry};
    use async_trait::async_trait;

    struct FailingSink;

    #[async_trait]
    impl OutputSink for FailingSink {
        async fn publish(&self, _output: EngineOutput) -> Result<(), EngineError> {
            Err(EngineError::Sink("broker down".to_string()))
        }
    }

    fn message(payload: &str) -> InboundMessage {
        InboundMessage {
            topic: "alerting.events".to_string(),
            partition: 0,
            offset: 1,
            key: None,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_propagate() {
        let engine = AlertingEngine::new("nikita", Arc::new(MetricRegistry::new()));
        let outcome = handle_message(&engine, &FailingSink, &message("INVALID")).await;
        assert_eq!(outcome, "error");
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(outcome_label(&EngineOutput::None), "none");
    }
}
