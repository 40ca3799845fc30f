//! 실행 시간 측정.

use ledgerbatch_core::error::CoreError;
use ledgerbatch_core::models::run::KeyMode;
use ledgerbatch_core::ports::metrics::MetricsSink;
use std::time::{Duration, Instant};
use tracing::info;

/// 연산 하나의 벽시계 실행 시간
#[derive(Debug)]
pub struct RunMetrics {
    label: String,
    started: Instant,
}

impl RunMetrics {
    /// 지금부터 측정 시작
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    /// `batch` 명령의 레이블 (`batchS`, `batchR3` ...)
    pub fn batch_label(mode: KeyMode, multiplier: Option<u32>) -> String {
        match multiplier {
            Some(m) => format!("batch{}{m}", mode.tag()),
            None => format!("batch{}", mode.tag()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// 경과 시간을 싱크에 기록하고 기록한 밀리초를 돌려준다
    pub fn record(&self, sink: &dyn MetricsSink) -> Result<u64, CoreError> {
        let millis = self.elapsed_ms();
        sink.record_duration(&self.label, millis)?;
        info!("{} 실행 시간: {millis}ms", self.label);
        Ok(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemorySink(Mutex<BTreeMap<String, u64>>);

    impl MetricsSink for MemorySink {
        fn record_duration(&self, label: &str, millis: u64) -> Result<(), CoreError> {
            self.0.lock().insert(label.to_string(), millis);
            Ok(())
        }
    }

    #[test]
    fn batch_labels() {
        assert_eq!(RunMetrics::batch_label(KeyMode::Random, Some(3)), "batchR3");
        assert_eq!(RunMetrics::batch_label(KeyMode::Sequential, None), "batchS");
    }

    #[test]
    fn record_writes_label() {
        let sink = MemorySink::default();
        let metrics = RunMetrics::start("set");
        std::thread::sleep(Duration::from_millis(5));

        let millis = metrics.record(&sink).unwrap();
        assert!(millis >= 5);
        assert_eq!(sink.0.lock().get("set"), Some(&millis));
    }
}
