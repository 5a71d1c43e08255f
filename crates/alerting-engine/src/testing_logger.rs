//! 规则测试日志
//!
//! 规则作者在测试规则时需要看到可读的评估过程；生产环境使用空实现。

use parking_lot::Mutex;

pub trait TestingLogger: Send + Sync {
    fn append_message(&self, msg: &str);
}

/// 生产环境使用的空实现
#[derive(Debug, Default, Clone, Copy)]
pub struct InactiveTestingLogger;

impl TestingLogger for InactiveTestingLogger {
    fn append_message(&self, _msg: &str) {}
}

/// 收集所有消息，供规则测试读取
#[derive(Debug, Default)]
pub struct StringTestingLogger {
    messages: Mutex<Vec<String>>,
}

impl StringTestingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// 按行拼接的完整日志
    pub fn log(&self) -> String {
        self.messages.lock().join("\n")
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl TestingLogger for StringTestingLogger {
    fn append_message(&self, msg: &str) {
        self.messages.lock().push(msg.to_string());
    }
}
