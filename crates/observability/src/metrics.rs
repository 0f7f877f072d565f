//! 事件投递指标收集模块
//!
//! 基于 `metrics` facade 记录投递计数；未安装 recorder 时为空操作。

use metrics::{counter, histogram};

/// 记录一次 `post` 入队
pub fn record_event_posted(event: &str) {
    counter!("timer_event_posted_total", "event" => event.to_string()).increment(1);
}

/// 记录一次成功的回调投递
pub fn record_event_delivered(event: &str, subscriber: &str) {
    counter!(
        "timer_event_delivered_total",
        "event" => event.to_string(),
        "subscriber" => subscriber.to_string()
    )
    .increment(1);
}

/// 记录暂停期间丢弃的事件
pub fn record_event_dropped(event: &str) {
    counter!("timer_event_dropped_total", "event" => event.to_string()).increment(1);
}

/// 记录停止时队列中残留并被丢弃的事件
pub fn record_event_discarded(event: &str) {
    counter!("timer_event_discarded_total", "event" => event.to_string()).increment(1);
}

/// 记录回调失败 (返回错误或 panic)
pub fn record_callback_failure(event: &str, subscriber: &str, panicked: bool) {
    let kind = if panicked { "panic" } else { "error" };
    counter!(
        "timer_event_callback_failures_total",
        "event" => event.to_string(),
        "subscriber" => subscriber.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录定时器触发及其相对名义时刻的延迟
pub fn record_tick(timer: &str, drift_ms: f64) {
    counter!("timer_event_ticks_total", "timer" => timer.to_string()).increment(1);
    histogram!("timer_event_tick_drift_ms", "timer" => timer.to_string()).record(drift_ms);
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计 (Welford 算法)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加样本
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
