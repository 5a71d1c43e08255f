//! 规则集来源

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 拉取当前规则集 JSON 文档
#[cfg_attr(test, mockall::automock)]
pub trait RulesProvider: Send + Sync {
    fn fetch_rules(&self) -> Result<String>;
}

/// 从本地文件读取规则集
#[derive(Debug, Clone)]
pub struct FileRulesProvider {
    path: PathBuf,
}

impl FileRulesProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RulesProvider for FileRulesProvider {
    fn fetch_rules(&self) -> Result<String> {
        let content = std::fs::read_to_string(&self.path)?;
        debug!(path = %self.path.display(), bytes = content.len(), "规则文件已读取");
        Ok(content)
    }
}

/// 固定内容的规则集，用于测试与嵌入式场景
#[derive(Debug, Clone)]
pub struct StaticRulesProvider {
    rules: String,
}

impl StaticRulesProvider {
    pub fn new(rules: impl Into<String>) -> Self {
        Self {
            rules: rules.into(),
        }
    }
}

impl RulesProvider for StaticRulesProvider {
    fn fetch_rules(&self) -> Result<String> {
        Ok(self.rules.clone())
    }
}
