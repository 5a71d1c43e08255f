//! 输出通道

use crate::error::Result;
use crate::output::EngineOutput;
use async_trait::async_trait;
use parking_lot::Mutex;

/// 发布引擎输出（命中事件或错误信封）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn publish(&self, output: EngineOutput) -> Result<()>;
}

/// 内存输出通道，保留所有非空输出
#[derive(Debug, Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<EngineOutput>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<EngineOutput> {
        self.outputs.lock().clone()
    }

    pub fn alerts(&self) -> Vec<EngineOutput> {
        self.outputs
            .lock()
            .iter()
            .filter(|o| o.is_alert())
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<EngineOutput> {
        self.outputs
            .lock()
            .iter()
            .filter(|o| o.is_error())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.lock().is_empty()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn publish(&self, output: EngineOutput) -> Result<()> {
        if !output.is_none() {
            self.outputs.lock().push(output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::output::ErrorEnvelope;

    #[tokio::test]
    async fn test_memory_sink_drops_empty_outputs() {
        let sink = MemorySink::new();
        sink.publish(EngineOutput::None).await.unwrap();
        sink.publish(EngineOutput::Alert(Event::new())).await.unwrap();
        sink.publish(EngineOutput::Error(ErrorEnvelope::new("e", "m", "r")))
            .await
            .unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_sink_receives_output() {
        let mut sink = MockOutputSink::new();
        sink.expect_publish()
            .withf(|output| output.is_alert())
            .times(1)
            .returning(|_| Ok(()));

        sink.publish(EngineOutput::Alert(Event::new())).await.unwrap();
    }
}
