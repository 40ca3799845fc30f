//! ledgerbatch 핵심 에러 타입.
//!
//! 어댑터/배치 crate는 자체 에러 타입에서 `#[from] CoreError`로 래핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 직렬화, 설정, 원장 서비스 호출 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류 (누락, 파싱 실패 등)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Asset", "Operation")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 원장 서비스가 트랜잭션을 거부함
    #[error("서비스 에러 ({operation}): {message}")]
    Service {
        /// 호출한 원장 연산 이름
        operation: String,
        /// 서비스가 반환한 사유
        message: String,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// 같은 요청을 다시 보내면 성공할 수 있는 에러인지 판별
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network(_) | CoreError::ServiceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::Network("timeout".to_string()).is_retryable());
        assert!(CoreError::ServiceUnavailable("busy".to_string()).is_retryable());
        assert!(!CoreError::Config("bad".to_string()).is_retryable());
        assert!(!CoreError::Service {
            operation: "batch".to_string(),
            message: "endorsement failure".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn service_error_message_names_operation() {
        let err = CoreError::Service {
            operation: "batch".to_string(),
            message: "MVCC_READ_CONFLICT".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch"));
        assert!(msg.contains("MVCC_READ_CONFLICT"));
    }
}
