//! 플러시 실행기.
//!
//! 봉인된 스냅샷 하나를 `{ "keys": [{key, count}] }` 요청 하나로 원장에 제출하고,
//! 설정돼 있으면 원장의 `flush` 연산을 폴링해 반영을 확인한다.
//!
//! 제출 자체는 재시도하지 않는다. 확인 폴링만 지수 백오프로 재시도하며
//! 시도 횟수에 상한이 있다.

use ledgerbatch_core::config::ConfirmConfig;
use ledgerbatch_core::error::CoreError;
use ledgerbatch_core::models::cycle::FlushCycle;
use ledgerbatch_core::models::delta::BatchRequest;
use ledgerbatch_core::ports::ledger::TransactionalService;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::BatchError;
use crate::scheduler::ScheduledFlush;

/// 확인 폴링 정책
#[derive(Debug, Clone)]
pub struct ConfirmPolicy {
    /// 폴링 연산 이름 (기본 `flush`)
    pub operation: String,
    /// 필요한 0 아닌 응답 수
    pub required: u32,
    /// 최대 폴링 횟수
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ConfirmPolicy {
    /// 설정에서 정책 생성. 비활성화돼 있으면 `None`.
    pub fn from_config(config: &ConfirmConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            operation: config.operation.clone(),
            required: config.required_confirmations.max(1),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        })
    }
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            operation: "flush".to_string(),
            required: 3,
            max_attempts: 20,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// `flush` 응답에서 반영된 개수 해석 (`"5"`, `5`, `"\"5\""` 허용)
fn parse_flushed_count(payload: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(payload).ok()?;
    text.trim().trim_matches('"').parse().ok()
}

/// 플러시 실행기: 사이클 상태 머신 구동
pub struct FlushExecutor {
    service: Arc<dyn TransactionalService>,
    submit_operation: String,
    confirm: Option<ConfirmPolicy>,
    next_cycle_id: AtomicU64,
}

impl FlushExecutor {
    pub fn new(service: Arc<dyn TransactionalService>, submit_operation: impl Into<String>) -> Self {
        Self {
            service,
            submit_operation: submit_operation.into(),
            confirm: None,
            next_cycle_id: AtomicU64::new(1),
        }
    }

    /// 제출 후 확인 폴링 사용
    pub fn with_confirmation(mut self, policy: Option<ConfirmPolicy>) -> Self {
        self.confirm = policy;
        self
    }

    /// 스케줄된 플러시 하나를 끝까지 처리
    ///
    /// 성공하면 `Confirmed` 상태의 사이클을, 실패하면 사이클 ID와 에포크를 담은
    /// 에러를 돌려준다. 누적기 정리/복원은 호출자가 결과를 보고 결정한다.
    pub async fn flush(&self, flush: ScheduledFlush) -> Result<FlushCycle, BatchError> {
        let id = self.next_cycle_id.fetch_add(1, Ordering::Relaxed);
        let mut cycle = FlushCycle::new(
            id,
            flush.snapshot.epoch(),
            flush.trigger,
            Arc::clone(flush.snapshot.deltas()),
        );

        if cycle.deltas.is_empty() {
            debug!("사이클 #{id}: 빈 스냅샷, 제출 생략");
            cycle.mark_submitted();
            cycle.mark_confirmed();
            return Ok(cycle);
        }

        self.submit(&mut cycle).await?;

        match &self.confirm {
            Some(policy) => self.confirm(&mut cycle, policy).await?,
            None => cycle.mark_confirmed(),
        }

        info!(
            "사이클 #{} 완료 ({}): 키 {}개, 발생 {}회",
            cycle.id,
            cycle.trigger,
            cycle.deltas.len(),
            cycle.total_count()
        );
        Ok(cycle)
    }

    /// 스냅샷을 요청 하나로 직렬화해 제출 (`Pending → Submitted`)
    pub async fn submit(&self, cycle: &mut FlushCycle) -> Result<Vec<u8>, BatchError> {
        let request = BatchRequest::from(&cycle.deltas[..]);
        let payload = match serde_json::to_string(&request) {
            Ok(payload) => payload,
            Err(e) => return Err(submission_failed(cycle, e.into())),
        };

        debug!(
            "사이클 #{} 제출: {} (키 {}개)",
            cycle.id,
            self.submit_operation,
            request.keys.len()
        );

        match self
            .service
            .submit(&self.submit_operation, &[payload])
            .await
        {
            Ok(result) => {
                cycle.mark_submitted();
                Ok(result)
            }
            Err(e) => Err(submission_failed(cycle, e)),
        }
    }

    /// 확인 폴링 (`Submitted → Confirmed | Failed`)
    ///
    /// 응답 0은 아직 반영 전이므로 재시도. 0이 아닌 응답이 `required`번 모이면 확인.
    /// 서비스 에러와 해석 불가 응답도 한 번의 실패한 폴링으로 센다.
    pub async fn confirm(
        &self,
        cycle: &mut FlushCycle,
        policy: &ConfirmPolicy,
    ) -> Result<(), BatchError> {
        let mut confirmed = 0u32;
        let mut delay = policy.initial_backoff;

        for attempt in 1..=policy.max_attempts {
            cycle.confirm_attempts = attempt;

            match self.service.submit(&policy.operation, &[]).await {
                Ok(payload) => match parse_flushed_count(&payload) {
                    Some(0) => debug!("사이클 #{} 확인 폴링 {attempt}: 아직 반영 전", cycle.id),
                    Some(flushed) => {
                        confirmed += 1;
                        debug!(
                            "사이클 #{} 확인 폴링 {attempt}: {flushed}건 반영 ({confirmed}/{})",
                            cycle.id, policy.required
                        );
                        if confirmed >= policy.required {
                            cycle.mark_confirmed();
                            return Ok(());
                        }
                    }
                    None => warn!(
                        "사이클 #{} 확인 응답 해석 불가: {:?}",
                        cycle.id,
                        String::from_utf8_lossy(&payload)
                    ),
                },
                Err(e) => warn!(
                    "사이클 #{} 확인 폴링 실패 (시도 {attempt}/{}): {e}",
                    cycle.id, policy.max_attempts
                ),
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_backoff);
            }
        }

        error!(
            "사이클 #{} 확인 시간 초과: {}회 폴링, 확인 {confirmed}/{}",
            cycle.id, policy.max_attempts, policy.required
        );
        cycle.mark_failed();
        Err(BatchError::ConfirmationTimeout {
            cycle_id: cycle.id,
            epoch: cycle.epoch,
            attempts: policy.max_attempts,
            confirmed,
            required: policy.required,
        })
    }
}

/// 제출 실패: 사이클을 `Failed`로 바꾸고 에러 생성
fn submission_failed(cycle: &mut FlushCycle, source: CoreError) -> BatchError {
    error!("사이클 #{} 제출 실패: {source}", cycle.id);
    cycle.mark_failed();
    BatchError::Submission {
        cycle_id: cycle.id,
        epoch: cycle.epoch,
        source,
    }
}
