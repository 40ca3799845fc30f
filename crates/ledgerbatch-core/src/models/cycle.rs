//! 플러시 사이클 모델.
//!
//! 플러시가 트리거된 순간의 스냅샷과 그 처리 상태를 담는 값 객체.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::delta::PendingDelta;

/// 플러시를 일으킨 트리거
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// 서로 다른 키 수가 임계값에 도달
    Size,
    /// 마지막 기록 이후 조용한 구간이 지남
    Debounce,
    /// 키 스트림 종료 시 즉시 플러시
    Close,
    /// 종료 신호 수신
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Debounce => "debounce",
            FlushTrigger::Close => "close",
            FlushTrigger::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// 사이클 상태
///
/// `Pending → Submitted → Confirmed` 또는 `Pending → Submitted → Failed`.
/// 제출 자체가 실패하면 `Pending → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl CycleState {
    /// 더 이상 전이가 없는 상태인지
    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Confirmed | CycleState::Failed)
    }
}

/// 플러시 사이클: 스냅샷 + 단조 증가 ID + 처리 결과
#[derive(Debug, Clone)]
pub struct FlushCycle {
    /// 실행기 안에서 단조 증가하는 사이클 ID
    pub id: u64,
    /// 스냅샷을 만든 누적 에포크
    pub epoch: u64,
    pub trigger: FlushTrigger,
    /// 트리거 시점의 델타 목록 (삽입 순서 유지)
    pub deltas: Arc<[PendingDelta]>,
    pub state: CycleState,
    /// 확인 폴링 시도 횟수
    pub confirm_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FlushCycle {
    pub fn new(id: u64, epoch: u64, trigger: FlushTrigger, deltas: Arc<[PendingDelta]>) -> Self {
        Self {
            id,
            epoch,
            trigger,
            deltas,
            state: CycleState::Pending,
            confirm_attempts: 0,
            created_at: Utc::now(),
            submitted_at: None,
            finished_at: None,
        }
    }

    /// 사이클에 포함된 전체 발생 횟수
    pub fn total_count(&self) -> u64 {
        self.deltas.iter().map(|d| d.count).sum()
    }

    pub fn mark_submitted(&mut self) {
        debug_assert_eq!(self.state, CycleState::Pending);
        self.state = CycleState::Submitted;
        self.submitted_at = Some(Utc::now());
    }

    pub fn mark_confirmed(&mut self) {
        debug_assert_eq!(self.state, CycleState::Submitted);
        self.state = CycleState::Confirmed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = CycleState::Failed;
        self.finished_at = Some(Utc::now());
    }
}
