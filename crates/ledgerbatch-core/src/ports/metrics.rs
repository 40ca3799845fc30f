//! 실행 시간 기록 포트.
//!
//! 구현: [`crate::run_store::MetricsFile`]

use crate::error::CoreError;

/// 연산 레이블별 실행 시간을 저장하는 싱크
pub trait MetricsSink: Send + Sync {
    /// 레이블 하나를 병합 저장 (같은 레이블은 마지막 값이 이긴다)
    fn record_duration(&self, label: &str, millis: u64) -> Result<(), CoreError>;
}
