//! 배치 레이어 에러.

use ledgerbatch_core::error::CoreError;
use thiserror::Error;

/// 플러시 사이클 / 실행 에러
#[derive(Debug, Error)]
pub enum BatchError {
    /// 원장이 배치 제출을 거부하거나 실패함. 에포크는 비워지지 않는다.
    #[error("플러시 사이클 #{cycle_id} 제출 실패 (에포크 {epoch}): {source}")]
    Submission {
        cycle_id: u64,
        epoch: u64,
        #[source]
        source: CoreError,
    },

    /// 확인 폴링이 상한 안에 필요한 확인 수에 도달하지 못함
    #[error(
        "플러시 사이클 #{cycle_id} 확인 시간 초과 (에포크 {epoch}): {attempts}회 폴링, 확인 {confirmed}/{required}"
    )]
    ConfirmationTimeout {
        cycle_id: u64,
        epoch: u64,
        attempts: u32,
        confirmed: u32,
        required: u32,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BatchError {
    /// 실패한 사이클이 담고 있던 에포크
    pub fn epoch(&self) -> Option<u64> {
        match self {
            BatchError::Submission { epoch, .. } | BatchError::ConfirmationTimeout { epoch, .. } => {
                Some(*epoch)
            }
            BatchError::Core(_) => None,
        }
    }

    pub fn is_confirmation_timeout(&self) -> bool {
        matches!(self, BatchError::ConfirmationTimeout { .. })
    }
}
