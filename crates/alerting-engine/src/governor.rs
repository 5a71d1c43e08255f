//! 规则保护（告警风暴抑制）
//!
//! 每条规则持有一个 `RuleProtection`，按小时与按天两个固定窗口统计命中次数，
//! 任一窗口超过阈值后规则被抑制，直到对应窗口滚动。窗口起点锚定在规则构建时刻，
//! 滚动时按整周期前移，保证窗口边界不漂移。

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_MAX_PER_HOUR: u32 = 30;
pub const DEFAULT_MAX_PER_DAY: u32 = 100;

/// 保护阈值配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleProtectionConfig {
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: u32,
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
}

fn default_max_per_hour() -> u32 {
    DEFAULT_MAX_PER_HOUR
}

fn default_max_per_day() -> u32 {
    DEFAULT_MAX_PER_DAY
}

impl Default for RuleProtectionConfig {
    fn default() -> Self {
        Self {
            max_per_hour: DEFAULT_MAX_PER_HOUR,
            max_per_day: DEFAULT_MAX_PER_DAY,
        }
    }
}

impl RuleProtectionConfig {
    pub fn new(max_per_hour: u32, max_per_day: u32) -> Self {
        Self {
            max_per_hour,
            max_per_day,
        }
    }
}

/// 保护窗口状态（仅内存，进程重启后重置）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProtectionState {
    pub hour_window_start: DateTime<Utc>,
    pub hour_count: u32,
    pub day_window_start: DateTime<Utc>,
    pub day_count: u32,
    pub suppressed: bool,
}

impl RuleProtectionState {
    fn anchored_at(now: DateTime<Utc>) -> Self {
        Self {
            hour_window_start: now,
            hour_count: 0,
            day_window_start: now,
            day_count: 0,
            suppressed: false,
        }
    }

    /// 滚动已过期的窗口，返回是否有窗口发生滚动
    fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let hour_rolled = roll_window(
            &mut self.hour_window_start,
            &mut self.hour_count,
            now,
            Duration::hours(1),
        );
        let day_rolled = roll_window(
            &mut self.day_window_start,
            &mut self.day_count,
            now,
            Duration::days(1),
        );
        hour_rolled || day_rolled
    }

    fn exceeds(&self, config: &RuleProtectionConfig) -> bool {
        self.hour_count > config.max_per_hour || self.day_count > config.max_per_day
    }
}

fn roll_window(
    start: &mut DateTime<Utc>,
    count: &mut u32,
    now: DateTime<Utc>,
    period: Duration,
) -> bool {
    let elapsed = now - *start;
    if elapsed < period {
        return false;
    }
    let periods = elapsed.num_milliseconds() / period.num_milliseconds();
    *start += period * periods as i32;
    *count = 0;
    true
}

/// 规则保护器
///
/// 状态由每条规则独立的互斥锁保护，不同规则之间互不阻塞。
/// 每次调用在一个临界区内完成“滚动 + 判定/计数”，并发命中不会丢失更新。
#[derive(Debug)]
pub struct RuleProtection {
    rule_name: String,
    config: RuleProtectionConfig,
    state: Mutex<RuleProtectionState>,
}

impl RuleProtection {
    pub fn new(rule_name: impl Into<String>, config: RuleProtectionConfig) -> Self {
        Self::with_anchor(rule_name, config, Utc::now())
    }

    /// 以指定时刻为窗口起点创建
    pub fn with_anchor(
        rule_name: impl Into<String>,
        config: RuleProtectionConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            config,
            state: Mutex::new(RuleProtectionState::anchored_at(now)),
        }
    }

    pub fn config(&self) -> &RuleProtectionConfig {
        &self.config
    }

    /// 滚动过期窗口并返回当前是否处于抑制状态
    pub fn check_suppressed(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if state.roll(now) {
            let was_suppressed = state.suppressed;
            state.suppressed = state.exceeds(&self.config);
            if was_suppressed && !state.suppressed {
                info!(rule = %self.rule_name, "规则保护窗口已滚动，解除抑制");
            }
        }
        state.suppressed
    }

    /// 记录一次命中；超过阈值后从下一次评估开始抑制
    pub fn record_match(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.roll(now);
        state.hour_count = state.hour_count.saturating_add(1);
        state.day_count = state.day_count.saturating_add(1);

        let exceeded = state.exceeds(&self.config);
        if exceeded && !state.suppressed {
            warn!(
                rule = %self.rule_name,
                hour_count = state.hour_count,
                day_count = state.day_count,
                max_per_hour = self.config.max_per_hour,
                max_per_day = self.config.max_per_day,
                "规则命中次数超过保护阈值，已抑制"
            );
        }
        state.suppressed = exceeded;
    }

    /// 当前状态快照
    pub fn state(&self) -> RuleProtectionState {
        self.state.lock().clone()
    }

    /// 清零计数并以指定时刻重新锚定窗口
    pub fn reset(&self, now: DateTime<Utc>) {
        *self.state.lock() = RuleProtectionState::anchored_at(now);
    }
}
