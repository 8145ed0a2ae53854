use std::time::Duration;

/// 重连预算
///
/// 每次成功打开连接都会把预算恢复到上限；关闭时若还有预算则安排一次重连，
/// 用完后不再自动恢复。
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    remaining: u32,
    interval: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            remaining: max_attempts,
            interval,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// 连接成功。返回 true 表示这是一次重连（需要提示用户）
    pub fn on_open(&mut self) -> bool {
        let reconnected = self.remaining < self.max_attempts;
        self.remaining = self.max_attempts;
        reconnected
    }

    /// 连接关闭。`Some(delay)` 表示应在 delay 后重连，`None` 表示放弃
    pub fn on_close(&self) -> Option<Duration> {
        if self.remaining > 0 {
            Some(self.interval)
        } else {
            None
        }
    }

    /// 定时器触发、真正发起重连前调用
    pub fn begin_attempt(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}
