//! 플러시 스케줄러.
//!
//! 두 트리거가 경쟁한다:
//! - 크기 트리거: `record()`로 서로 다른 키 수가 임계값에 닿는 즉시
//! - 디바운스 트리거: 기록마다 재설정되고, 조용한 구간이 지나면 발동
//!
//! 먼저 발동한 쪽이 에포크를 봉인하고 다른 쪽은 취소된다.
//! 타이머는 스케줄러가 소유한 마감 시각이며, 기록마다 취소 후 재발행한다.

use ledgerbatch_core::config::FlushConfig;
use ledgerbatch_core::models::cycle::FlushTrigger;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::accumulator::{BatchAccumulator, EpochSnapshot};

/// 스케줄러가 결정한 플러시: 트리거 + 봉인된 스냅샷
#[derive(Debug, Clone)]
pub struct ScheduledFlush {
    pub trigger: FlushTrigger,
    pub snapshot: EpochSnapshot,
}

/// 취소 가능한 디바운스 타이머 (마감 시각만 보관)
#[derive(Debug, Default)]
pub struct DebounceTimer {
    deadline: Option<Instant>,
}

impl DebounceTimer {
    /// 기존 마감을 버리고 `now + after`로 재설정
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    /// 타이머 취소. 설정돼 있었으면 `true`.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// 마감 시각까지 대기. 마감이 없으면 영원히 대기한다 (`select!` 분기용).
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 플러시 스케줄러: 누적기 + 크기 임계값 + 디바운스 타이머
#[derive(Debug)]
pub struct FlushScheduler {
    accumulator: BatchAccumulator,
    size_threshold: usize,
    debounce: Duration,
    timer: DebounceTimer,
}

impl FlushScheduler {
    pub fn new(size_threshold: usize, debounce: Duration) -> Self {
        Self {
            accumulator: BatchAccumulator::new(),
            size_threshold: size_threshold.max(1),
            debounce,
            timer: DebounceTimer::default(),
        }
    }

    pub fn from_config(config: &FlushConfig) -> Self {
        Self::new(config.size_threshold, config.debounce())
    }

    /// 키 기록. 크기 트리거가 발동하면 봉인된 스냅샷을 돌려준다.
    pub fn record(&mut self, key: &str) -> Option<ScheduledFlush> {
        let size = self.accumulator.record(key);
        if size >= self.size_threshold {
            self.timer.cancel();
            debug!("크기 트리거 발동: 키 {size}개");
            return self.seal(FlushTrigger::Size);
        }
        self.timer.arm(self.debounce);
        None
    }

    /// 디바운스 마감 시각 (타이머가 꺼져 있으면 `None`)
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// 디바운스 대기가 끝났을 때 호출
    ///
    /// 그 사이 타이머가 재설정/취소됐거나 에포크가 비어 있으면 아무것도 하지 않는다.
    pub fn on_debounce_elapsed(&mut self) -> Option<ScheduledFlush> {
        if !self.timer.is_expired(Instant::now()) {
            return None;
        }
        self.timer.cancel();
        let flush = self.seal(FlushTrigger::Debounce);
        if flush.is_some() {
            debug!("디바운스 트리거 발동");
        }
        flush
    }

    /// 타이머를 끄고 열린 에포크를 즉시 봉인
    pub fn flush_now(&mut self, trigger: FlushTrigger) -> Option<ScheduledFlush> {
        self.timer.cancel();
        self.seal(trigger)
    }

    /// 전달이 확인된 에포크 정리
    pub fn complete(&mut self, epoch: u64) -> bool {
        self.accumulator.clear(epoch)
    }

    /// 실패한 에포크를 다음 플러시로 되돌린다
    ///
    /// 병합 결과가 임계값 이상이면 즉시 다시 봉인하고, 아니면 디바운스를 건다.
    pub fn requeue(&mut self, epoch: u64) -> Option<ScheduledFlush> {
        let size = self.accumulator.restore(epoch)?;
        if size >= self.size_threshold {
            self.timer.cancel();
            return self.seal(FlushTrigger::Size);
        }
        self.timer.arm(self.debounce);
        None
    }

    pub fn accumulator(&self) -> &BatchAccumulator {
        &self.accumulator
    }

    fn seal(&mut self, trigger: FlushTrigger) -> Option<ScheduledFlush> {
        self.accumulator
            .seal()
            .map(|snapshot| ScheduledFlush { trigger, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbatch_core::models::delta::PendingDelta;

    #[tokio::test(start_paused = true)]
    async fn size_trigger_fires_once_and_cancels_debounce() {
        let mut scheduler = FlushScheduler::new(3, Duration::from_millis(500));

        assert!(scheduler.record("asset1").is_none());
        assert!(scheduler.record("asset2").is_none());
        let flush = scheduler.record("asset3").expect("크기 트리거");
        assert_eq!(flush.trigger, FlushTrigger::Size);
        assert_eq!(flush.snapshot.len(), 3);

        assert!(scheduler.debounce_deadline().is_none());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(scheduler.on_debounce_elapsed().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_flushes_single_key_after_quiet_period() {
        let mut scheduler = FlushScheduler::new(25, Duration::from_millis(500));
        scheduler.record("asset1");

        let deadline = scheduler.debounce_deadline();
        tokio::time::sleep(Duration::from_millis(600)).await;
        sleep_until_deadline(deadline).await;

        let flush = scheduler.on_debounce_elapsed().expect("디바운스 트리거");
        assert_eq!(flush.trigger, FlushTrigger::Debounce);
        assert_eq!(
            flush.snapshot.deltas().to_vec(),
            vec![PendingDelta::new("asset1", 1)]
        );
        assert!(scheduler.on_debounce_elapsed().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn record_rearms_debounce() {
        let mut scheduler = FlushScheduler::new(25, Duration::from_millis(500));
        scheduler.record("asset1");
        let first = scheduler.debounce_deadline().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.record("asset2");
        let second = scheduler.debounce_deadline().unwrap();
        assert!(second > first);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(scheduler.on_debounce_elapsed().is_none(), "재설정된 타이머는 아직");

        tokio::time::sleep(Duration::from_millis(250)).await;
        let flush = scheduler.on_debounce_elapsed().unwrap();
        assert_eq!(flush.snapshot.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn records_after_trigger_go_to_next_epoch() {
        let mut scheduler = FlushScheduler::new(2, Duration::from_millis(500));
        scheduler.record("a");
        let first = scheduler.record("b").unwrap();

        scheduler.record("a");
        assert_eq!(scheduler.accumulator().open_len(), 1);
        assert!(scheduler.debounce_deadline().is_some());
        assert_eq!(first.snapshot.count_of("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_rearms_or_reseals() {
        let mut scheduler = FlushScheduler::new(3, Duration::from_millis(200));
        scheduler.record("a");
        scheduler.record("b");
        let failed = scheduler.flush_now(FlushTrigger::Close).unwrap();

        assert!(scheduler.requeue(failed.snapshot.epoch()).is_none());
        assert!(scheduler.debounce_deadline().is_some());

        let flush = scheduler.record("c").unwrap();
        assert_eq!(flush.trigger, FlushTrigger::Size);
        assert_eq!(flush.snapshot.len(), 3);
    }

    #[test]
    fn debounce_timer_cancel() {
        let mut timer = DebounceTimer::default();
        assert!(!timer.cancel());
        timer.arm(Duration::from_millis(10));
        assert!(timer.is_armed());
        assert!(timer.cancel());
        assert!(!timer.is_armed());
    }
}
