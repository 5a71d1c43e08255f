//! 告警服务错误类型
//!
//! 在共享库 AlertingError 之上区分引擎侧故障（规则加载/输出发布）与基础设施故障。

use alerting_engine::EngineError;
use alerting_shared::error::AlertingError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 规则集编译或读取失败
    #[error("规则引擎错误: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Shared(#[from] AlertingError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(_) => "ENGINE_ERROR",
            Self::Shared(e) => e.code(),
        }
    }
}
