//! 배치 파이프라인: 키 스트림을 받아 플러시 사이클을 구동하는 단일 루프.
//!
//! 키 도착, 디바운스 만료, 플러시 완료, 종료 신호가 모두 하나의 `select!` 루프에서
//! 교차한다. 누적기는 이 루프만 소유하므로 잠금이 필요 없다.
//!
//! 봉인된 스냅샷은 FIFO 대기열에 쌓이고 `max_in_flight` 개까지 동시에 실행된다.
//! 완료된 사이클만 자기 에포크를 비운다.

use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use ledgerbatch_core::config::{AppConfig, FailurePolicy};
use ledgerbatch_core::models::cycle::{FlushCycle, FlushTrigger};
use ledgerbatch_core::ports::ledger::TransactionalService;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::BatchError;
use crate::executor::{ConfirmPolicy, FlushExecutor};
use crate::scheduler::{sleep_until_deadline, FlushScheduler, ScheduledFlush};

/// 실행 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// 소비한 키 수
    pub records: u64,
    pub cycles_confirmed: u64,
    pub cycles_failed: u64,
    /// 확인된 사이클들에 담긴 델타 수
    pub deltas_delivered: u64,
    /// 확인된 사이클들에 담긴 발생 횟수 합
    pub occurrences_delivered: u64,
    pub elapsed: Duration,
    /// 종료 신호로 키 소비가 중단됐는지
    pub interrupted: bool,
    /// 루프 종료 시 전달되지 못한 발생 횟수 (정상 종료면 0)
    pub pending_after: u64,
}

enum LoopEvent {
    Key(String),
    KeysExhausted,
    DebounceElapsed,
    Shutdown,
    Completed(u64, Result<FlushCycle, BatchError>),
    Idle,
}

/// 종료 신호 대기. 수신기가 없거나 송신측이 사라지면 영원히 대기.
async fn shutdown_requested(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

pub struct BatchPipeline {
    scheduler: FlushScheduler,
    executor: Arc<FlushExecutor>,
    max_in_flight: usize,
    flush_on_close: bool,
    failure_policy: FailurePolicy,
    requeue_timeouts: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BatchPipeline {
    pub fn new(scheduler: FlushScheduler, executor: FlushExecutor) -> Self {
        Self {
            scheduler,
            executor: Arc::new(executor),
            max_in_flight: 1,
            flush_on_close: false,
            failure_policy: FailurePolicy::Abort,
            requeue_timeouts: false,
            shutdown: None,
        }
    }

    /// 설정에서 스케줄러/실행기/정책을 한 번에 구성
    pub fn from_config(config: &AppConfig, service: Arc<dyn TransactionalService>) -> Self {
        let executor = FlushExecutor::new(service, config.ledger.submit_operation.clone())
            .with_confirmation(ConfirmPolicy::from_config(&config.confirm));

        Self::new(FlushScheduler::from_config(&config.flush), executor)
            .with_max_in_flight(config.flush.max_in_flight)
            .with_flush_on_close(config.flush.flush_on_close)
            .with_failure_policy(config.failure_policy)
            .with_requeue_timeouts(config.ledger.idempotent)
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// 키 스트림이 끝나면 디바운스를 기다리지 않고 바로 플러시
    pub fn with_flush_on_close(mut self, flush_on_close: bool) -> Self {
        self.flush_on_close = flush_on_close;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// 확인 시간 초과된 에포크도 재제출 허용 (원장이 멱등일 때만)
    pub fn with_requeue_timeouts(mut self, allowed: bool) -> Self {
        self.requeue_timeouts = allowed;
        self
    }

    /// `true`가 전송되면 키 소비를 멈추고 열린 에포크를 즉시 플러시
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// 키 스트림을 끝까지 소비하고 모든 사이클이 끝날 때까지 실행
    pub async fn run<S>(mut self, mut keys: S) -> Result<RunReport, BatchError>
    where
        S: Stream<Item = String> + Unpin,
    {
        let started = Instant::now();
        let mut report = RunReport::default();
        let mut queued: VecDeque<ScheduledFlush> = VecDeque::new();
        let mut in_flight = FuturesUnordered::new();
        let mut keys_done = false;
        let mut shutdown = self.shutdown.take();

        loop {
            while in_flight.len() < self.max_in_flight {
                let Some(flush) = queued.pop_front() else {
                    break;
                };
                let epoch = flush.snapshot.epoch();
                let executor = Arc::clone(&self.executor);
                debug!("사이클 디스패치: 에포크 {epoch} ({})", flush.trigger);
                in_flight.push(async move { (epoch, executor.flush(flush).await) });
            }

            let deadline = self.scheduler.debounce_deadline();
            if keys_done && deadline.is_none() && queued.is_empty() && in_flight.is_empty() {
                break;
            }

            let event = tokio::select! {
                biased;
                Some((epoch, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    LoopEvent::Completed(epoch, result)
                }
                _ = shutdown_requested(&mut shutdown), if !report.interrupted => LoopEvent::Shutdown,
                _ = sleep_until_deadline(deadline), if deadline.is_some() => LoopEvent::DebounceElapsed,
                key = keys.next(), if !keys_done => match key {
                    Some(key) => LoopEvent::Key(key),
                    None => LoopEvent::KeysExhausted,
                },
                else => LoopEvent::Idle,
            };

            match event {
                LoopEvent::Key(key) => {
                    report.records += 1;
                    queued.extend(self.scheduler.record(&key));
                }
                LoopEvent::KeysExhausted => {
                    keys_done = true;
                    debug!("키 스트림 종료: {}개 소비", report.records);
                    if self.flush_on_close {
                        queued.extend(self.scheduler.flush_now(FlushTrigger::Close));
                    }
                }
                LoopEvent::DebounceElapsed => {
                    queued.extend(self.scheduler.on_debounce_elapsed());
                }
                LoopEvent::Shutdown => {
                    info!("종료 신호 수신: 열린 에포크 플러시 후 진행 중 사이클 대기");
                    report.interrupted = true;
                    keys_done = true;
                    queued.extend(self.scheduler.flush_now(FlushTrigger::Shutdown));
                }
                LoopEvent::Completed(epoch, Ok(cycle)) => {
                    self.scheduler.complete(epoch);
                    report.cycles_confirmed += 1;
                    report.deltas_delivered += cycle.deltas.len() as u64;
                    report.occurrences_delivered += cycle.total_count();
                }
                LoopEvent::Completed(epoch, Err(e)) => {
                    report.cycles_failed += 1;
                    match self.failure_policy {
                        FailurePolicy::Abort => {
                            error!("사이클 실패, 실행 중단: {e}");
                            return Err(e);
                        }
                        FailurePolicy::Requeue if e.is_confirmation_timeout() && !self.requeue_timeouts => {
                            error!("원장이 멱등이 아니므로 확인 시간 초과 에포크는 재제출 불가: {e}");
                            return Err(e);
                        }
                        FailurePolicy::Requeue => {
                            warn!("사이클 실패, 에포크 {epoch} 재대기: {e}");
                            queued.extend(self.scheduler.requeue(epoch));
                        }
                    }
                }
                LoopEvent::Idle => {}
            }
        }

        report.elapsed = started.elapsed();
        report.pending_after = self.scheduler.accumulator().total_pending();
        info!(
            "배치 실행 완료: 키 {}개, 사이클 {}개 확인 / {}개 실패, 델타 {}개 전달 ({:?})",
            report.records,
            report.cycles_confirmed,
            report.cycles_failed,
            report.deltas_delivered,
            report.elapsed
        );
        Ok(report)
    }
}
