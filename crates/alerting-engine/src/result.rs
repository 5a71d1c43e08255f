//! 评估结果模型
//!
//! 所有步骤、规则与规则集共用同一个结果类型。`Ok` 变体同时携带结论和事件，
//! `Error` 变体只携带诊断信息，两者互斥由类型保证。

use crate::event::Event;
use serde::Serialize;
use std::fmt;

/// 评估结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationResult {
    Match,
    Filtered,
    NoMatch,
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Match => "MATCH",
            Self::Filtered => "FILTERED",
            Self::NoMatch => "NO_MATCH",
        };
        write!(f, "{}", s)
    }
}

/// 单次评估的输出
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Ok {
        result: EvaluationResult,
        event: Event,
    },
    Error {
        diagnostic: String,
    },
}

impl EvaluationOutcome {
    pub fn matched(event: Event) -> Self {
        Self::Ok {
            result: EvaluationResult::Match,
            event,
        }
    }

    pub fn filtered(event: Event) -> Self {
        Self::Ok {
            result: EvaluationResult::Filtered,
            event,
        }
    }

    pub fn no_match(event: Event) -> Self {
        Self::Ok {
            result: EvaluationResult::NoMatch,
            event,
        }
    }

    pub fn from_result(result: EvaluationResult, event: Event) -> Self {
        Self::Ok { result, event }
    }

    /// 由故障构造错误结果，诊断信息以故障种类名开头
    pub fn error(kind: &str, message: impl fmt::Display) -> Self {
        Self::Error {
            diagnostic: format!("{}: {}", kind, message),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// 仅在 `Ok` 时返回结论
    pub fn result(&self) -> Option<EvaluationResult> {
        match self {
            Self::Ok { result, .. } => Some(*result),
            Self::Error { .. } => None,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Ok { event, .. } => Some(event),
            Self::Error { .. } => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { diagnostic } => Some(diagnostic),
        }
    }

    pub fn is_match(&self) -> bool {
        self.result() == Some(EvaluationResult::Match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_outcome_accessors() {
        let mut event = Event::new();
        event.insert("a", 1);

        let outcome = EvaluationOutcome::filtered(event.clone());
        assert!(outcome.is_ok());
        assert_eq!(outcome.result(), Some(EvaluationResult::Filtered));
        assert_eq!(outcome.event(), Some(&event));
        assert_eq!(outcome.diagnostic(), None);
    }

    #[test]
    fn test_error_outcome_accessors() {
        let outcome = EvaluationOutcome::error("InvalidRegex", "bad pattern");
        assert!(outcome.is_error());
        assert_eq!(outcome.result(), None);
        assert_eq!(outcome.event(), None);
        assert_eq!(outcome.diagnostic(), Some("InvalidRegex: bad pattern"));
    }

    #[test]
    fn test_result_display() {
        assert_eq!(EvaluationResult::Match.to_string(), "MATCH");
        assert_eq!(EvaluationResult::NoMatch.to_string(), "NO_MATCH");
    }
}
