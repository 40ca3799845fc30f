//! 애플리케이션 설정 구조체.
//!
//! 플러시 트리거, 확인 폴링, 원장 백엔드, 실패 정책 등 런타임 설정을 정의한다.
//! [`crate::config_manager::ConfigManager`]가 파일/환경변수에서 계층 로드한다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 플러시 스케줄링 설정
    #[serde(default)]
    pub flush: FlushConfig,
    /// 플러시 확인 폴링 설정
    #[serde(default)]
    pub confirm: ConfirmConfig,
    /// 원장 백엔드 설정
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// 사이클 실패 시 처리 정책
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl AppConfig {
    /// 설정값 상호 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.flush.size_threshold == 0 {
            return Err(invalid("flush.size_threshold", "1 이상이어야 합니다"));
        }
        if self.flush.max_in_flight == 0 {
            return Err(invalid("flush.max_in_flight", "1 이상이어야 합니다"));
        }
        if self.confirm.enabled {
            if self.confirm.required_confirmations == 0 {
                return Err(invalid(
                    "confirm.required_confirmations",
                    "1 이상이어야 합니다",
                ));
            }
            if self.confirm.max_attempts < self.confirm.required_confirmations {
                return Err(invalid(
                    "confirm.max_attempts",
                    "required_confirmations 이상이어야 합니다",
                ));
            }
        }
        if self.ledger.doc_type.is_empty() {
            return Err(invalid("ledger.doc_type", "비어 있을 수 없습니다"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// ============================================================
// 플러시 스케줄링
// ============================================================

/// 플러시 트리거 설정: 크기 임계값 + 디바운스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// 서로 다른 키 수가 이 값에 도달하면 즉시 플러시
    #[serde(default = "default_size_threshold")]
    pub size_threshold: usize,
    /// 마지막 기록 이후 이 시간 동안 조용하면 플러시 (밀리초)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 동시에 진행 가능한 플러시 사이클 수
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// 키 스트림이 끝나면 디바운스를 기다리지 않고 즉시 플러시
    #[serde(default)]
    pub flush_on_close: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            size_threshold: default_size_threshold(),
            debounce_ms: default_debounce_ms(),
            max_in_flight: default_max_in_flight(),
            flush_on_close: false,
        }
    }
}

impl FlushConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_size_threshold() -> usize {
    25
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_in_flight() -> usize {
    1
}

// ============================================================
// 플러시 확인 폴링
// ============================================================

/// 확인 폴링 설정: 스테이징 후 명시적 `flush` 커밋을 쓰는 원장용
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// 확인 폴링 활성화 여부
    #[serde(default)]
    pub enabled: bool,
    /// 폴링에 사용하는 원장 연산 이름
    #[serde(default = "default_confirm_operation")]
    pub operation: String,
    /// 0이 아닌 응답이 이 횟수만큼 모이면 확인 완료
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u32,
    /// 최대 폴링 횟수 (초과 시 ConfirmationTimeout)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 첫 재시도 대기 (밀리초), 매 시도마다 2배
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 재시도 대기 상한 (밀리초)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            operation: default_confirm_operation(),
            required_confirmations: default_required_confirmations(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ConfirmConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_confirm_operation() -> String {
    "flush".to_string()
}

fn default_required_confirmations() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    20
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

// ============================================================
// 원장 백엔드
// ============================================================

/// 원장 백엔드 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// 프로세스 내 시뮬레이션 원장
    #[default]
    Memory,
    /// HTTP 게이트웨이
    Http,
}

/// 원장 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
    /// HTTP 게이트웨이 주소
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 배치 제출에 사용하는 원장 연산 이름
    #[serde(default = "default_submit_operation")]
    pub submit_operation: String,
    /// 키 접두어 (`<docType><number>`)
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    /// 같은 배치를 다시 제출해도 안전한지 (키 단위 멱등)
    #[serde(default)]
    pub idempotent: bool,
    /// 인메모리 원장: `batch`를 스테이징하고 `flush`에서 커밋
    #[serde(default)]
    pub staging: bool,
    /// 인메모리 원장: 스테이징된 배치가 보이기까지 필요한 `flush` 호출 수
    #[serde(default)]
    pub commit_lag_polls: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            gateway_url: default_gateway_url(),
            timeout_ms: default_timeout_ms(),
            submit_operation: default_submit_operation(),
            doc_type: default_doc_type(),
            idempotent: false,
            staging: false,
            commit_lag_polls: 0,
        }
    }
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_submit_operation() -> String {
    "batch".to_string()
}

fn default_doc_type() -> String {
    "asset".to_string()
}

// ============================================================
// 실패 정책
// ============================================================

/// 플러시 사이클 실패 시 처리
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 첫 실패를 치명적 에러로 실행 중단
    #[default]
    Abort,
    /// 실패한 에포크를 열린 에포크에 되돌려 다음 플러시에 포함
    Requeue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"flush":{"size_threshold":3}}"#).unwrap();
        assert_eq!(config.flush.size_threshold, 3);
        assert_eq!(config.flush.debounce_ms, 500);
        assert_eq!(config.confirm.operation, "flush");
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let mut config = AppConfig::default();
        config.flush.size_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_attempts_below_required() {
        let mut config = AppConfig::default();
        config.confirm.enabled = true;
        config.confirm.required_confirmations = 3;
        config.confirm.max_attempts = 2;
        assert!(config.validate().is_err());

        config.confirm.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_helpers() {
        let config = AppConfig::default();
        assert_eq!(config.flush.debounce(), Duration::from_millis(500));
        assert_eq!(config.confirm.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.ledger.timeout(), Duration::from_secs(30));
    }
}
