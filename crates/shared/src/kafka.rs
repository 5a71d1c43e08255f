//! Kafka 传输层
//!
//! 告警服务从输入 topic 消费归一化事件，把命中事件与错误信封分别写入输出 topic 与错误 topic。
//! 这里封装 rdkafka 的生产者/消费者，统一错误映射和基于 `watch` channel 的优雅关闭。

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::AlertingError;

/// `EngineConfig` 的默认 topic，可被配置文件与环境变量覆盖
pub mod topics {
    pub const EVENTS: &str = "alerting.events";
    pub const ALERTS: &str = "alerting.alerts";
    pub const ERRORS: &str = "alerting.errors";
}

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// 消费到的事件消息
///
/// 从 `BorrowedMessage` 拷贝出拥有所有权的数据，可以跨 await 点传给处理函数。
/// 负载保持原始字节，是否为合法 UTF-8 / JSON 由引擎判定。
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .map(String::from),
            payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        }
    }

    /// `topic/partition@offset`，用于日志定位
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// Kafka 生产者（`FutureProducer` 内部为 Arc，可廉价 Clone）
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, AlertingError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| AlertingError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送一条消息，返回 (partition, offset)
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &str,
    ) -> Result<(i32, i64), AlertingError> {
        let mut record = FutureRecord::<str, str>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let delivery = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| AlertingError::Kafka(format!("发送消息到 {topic} 失败: {e}")))?;

        debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, AlertingError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| AlertingError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), AlertingError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| AlertingError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 消费循环，直到关闭信号变为 `true`
    ///
    /// handler 返回错误只记录日志，不中断循环；单条消息的失败不影响后续消息。
    pub async fn run<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(InboundMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), AlertingError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                next = stream.next() => {
                    let Some(result) = next else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    // 借用消息在 await 之前转换为拥有所有权的数据
                    let msg = match result {
                        Ok(borrowed) => InboundMessage::from_borrowed(&borrowed),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    };
                    let position = msg.position();
                    debug!(position = %position, "收到 Kafka 消息");

                    if let Err(e) = handler(msg).await {
                        error!(position = %position, error = %e, "处理 Kafka 消息失败");
                    }
                }
            }
        }
    }
}
