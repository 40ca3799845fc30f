//! 인메모리 원장.
//!
//! 자산 컨트랙트(`create`, `read`, `update`, `delete`, `batch`, `flush`)를 프로세스 안에서
//! 흉내 낸다. 오프라인 기본 백엔드이자 테스트 대역으로 쓰인다.
//!
//! 스테이징 모드에서는 `batch`가 바로 반영되지 않고 쌓이며, `flush` 호출이
//! `commit_lag_polls`번 지난 뒤에야 커밋된다. 그 전까지 `flush`는 `0`을 돌려준다.

use async_trait::async_trait;
use ledgerbatch_core::config::LedgerConfig;
use ledgerbatch_core::error::CoreError;
use ledgerbatch_core::models::delta::BatchRequest;
use ledgerbatch_core::ports::ledger::TransactionalService;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// 원장에 저장되는 자산
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "docType")]
    pub doc_type: String,
    pub key: String,
    pub value: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    assets: BTreeMap<String, Asset>,
    staged: Vec<BatchRequest>,
    lag_remaining: u32,
    /// 마지막 커밋에 포함된 키 수 (`flush` 응답)
    last_committed: u64,
    fail_next: u32,
    submits: u64,
}

pub struct MemoryLedger {
    doc_type: String,
    staging: bool,
    commit_lag_polls: u32,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// 즉시 반영 모드
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            staging: false,
            commit_lag_polls: 0,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        let ledger = Self::new(config.doc_type.clone());
        if config.staging {
            ledger.with_staging(config.commit_lag_polls)
        } else {
            ledger
        }
    }

    /// `batch`를 스테이징하고 `flush`가 `lag_polls`번 호출된 뒤 커밋
    pub fn with_staging(mut self, lag_polls: u32) -> Self {
        self.staging = true;
        self.commit_lag_polls = lag_polls;
        self
    }

    /// 다음 `n`번의 쓰기 제출을 `ServiceUnavailable`로 실패시킨다
    pub fn fail_next_submits(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    pub fn asset(&self, key: &str) -> Option<Asset> {
        self.state.lock().assets.get(key).cloned()
    }

    pub fn value_of(&self, key: &str) -> Option<u64> {
        self.state.lock().assets.get(key).map(|a| a.value)
    }

    /// 전체 자산 값의 합
    pub fn total_value(&self) -> u64 {
        self.state.lock().assets.values().map(|a| a.value).sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 성공한 쓰기 제출 수 (`flush` 폴링 제외)
    pub fn submit_count(&self) -> u64 {
        self.state.lock().submits
    }

    pub fn staged_len(&self) -> usize {
        self.state.lock().staged.len()
    }

    fn new_asset(&self, key: &str, value: u64) -> Asset {
        Asset {
            doc_type: self.doc_type.clone(),
            key: key.to_string(),
            value,
        }
    }

    fn apply(&self, state: &mut LedgerState, request: &BatchRequest) {
        for delta in &request.keys {
            state
                .assets
                .entry(delta.key.clone())
                .or_insert_with(|| self.new_asset(&delta.key, 0))
                .value += delta.count;
        }
    }

    fn batch(&self, state: &mut LedgerState, payload: &str) -> Result<Vec<u8>, CoreError> {
        let request: BatchRequest = serde_json::from_str(payload)?;
        if request.keys.iter().any(|d| d.count == 0) {
            return Err(CoreError::Validation {
                field: "keys.count".to_string(),
                message: "1 이상이어야 합니다".to_string(),
            });
        }

        if self.staging {
            debug!("배치 스테이징: 키 {}개", request.keys.len());
            state.staged.push(request);
            state.lag_remaining = self.commit_lag_polls;
            state.last_committed = 0;
        } else {
            self.apply(state, &request);
            state.last_committed = request.keys.len() as u64;
        }
        Ok(b"Success".to_vec())
    }

    fn flush(&self, state: &mut LedgerState) -> Vec<u8> {
        if !state.staged.is_empty() {
            if state.lag_remaining > 0 {
                state.lag_remaining -= 1;
                return b"0".to_vec();
            }
            let staged = std::mem::take(&mut state.staged);
            for request in &staged {
                self.apply(state, request);
            }
            state.last_committed = staged.iter().map(|r| r.keys.len() as u64).sum();
            debug!("스테이징 배치 {}개 커밋", staged.len());
        }
        state.last_committed.to_string().into_bytes()
    }
}

fn single_arg<'a>(operation: &str, args: &'a [String]) -> Result<&'a str, CoreError> {
    match args {
        [arg] => Ok(arg.as_str()),
        _ => Err(CoreError::Validation {
            field: operation.to_string(),
            message: format!("인자 1개가 필요합니다 (받은 개수: {})", args.len()),
        }),
    }
}

fn not_found(key: &str) -> CoreError {
    CoreError::NotFound {
        resource_type: "Asset".to_string(),
        id: key.to_string(),
    }
}

#[async_trait]
impl TransactionalService for MemoryLedger {
    async fn submit(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError> {
        let mut state = self.state.lock();

        if operation == "flush" {
            return Ok(self.flush(&mut state));
        }

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(CoreError::ServiceUnavailable(format!("{operation}: 주입된 장애")));
        }

        let result = match operation {
            "create" => {
                let key = single_arg(operation, args)?;
                let asset = self.new_asset(key, 0);
                state.assets.insert(key.to_string(), asset);
                Vec::new()
            }
            "update" => {
                let key = single_arg(operation, args)?;
                state
                    .assets
                    .get_mut(key)
                    .ok_or_else(|| not_found(key))?
                    .value += 1;
                Vec::new()
            }
            "delete" => {
                let key = single_arg(operation, args)?;
                state.assets.remove(key).ok_or_else(|| not_found(key))?;
                Vec::new()
            }
            "batch" => {
                let payload = single_arg(operation, args)?;
                self.batch(&mut state, payload)?
            }
            other => {
                return Err(CoreError::Service {
                    operation: other.to_string(),
                    message: "알 수 없는 연산".to_string(),
                })
            }
        };

        state.submits += 1;
        Ok(result)
    }

    async fn evaluate(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError> {
        match operation {
            "read" => {
                let key = single_arg(operation, args)?;
                let state = self.state.lock();
                let asset = state.assets.get(key).ok_or_else(|| not_found(key))?;
                Ok(serde_json::to_vec(asset)?)
            }
            other => Err(CoreError::Service {
                operation: other.to_string(),
                message: "조회할 수 없는 연산".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let ledger = MemoryLedger::new("asset");
        ledger.submit("create", &args(&["asset1"])).await.unwrap();
        ledger.submit("update", &args(&["asset1"])).await.unwrap();

        let raw = ledger.evaluate("read", &args(&["asset1"])).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"docType": "asset", "key": "asset1", "value": 1})
        );

        ledger.submit("delete", &args(&["asset1"])).await.unwrap();
        assert_matches!(
            ledger.evaluate("read", &args(&["asset1"])).await,
            Err(CoreError::NotFound { .. })
        );
        assert_eq!(ledger.submit_count(), 3);
    }

    #[tokio::test]
    async fn batch_upserts_counts() {
        let ledger = MemoryLedger::new("asset");
        ledger.submit("create", &args(&["asset1"])).await.unwrap();

        let payload = r#"{"keys":[{"key":"asset1","count":2},{"key":"asset2","count":1}]}"#;
        let result = ledger.submit("batch", &args(&[payload])).await.unwrap();
        assert_eq!(result, b"Success");
        assert_eq!(ledger.value_of("asset1"), Some(2));
        assert_eq!(ledger.value_of("asset2"), Some(1));

        let flushed = ledger.submit("flush", &[]).await.unwrap();
        assert_eq!(flushed, b"2");
    }

    #[tokio::test]
    async fn staged_batch_commits_after_lag() {
        let ledger = MemoryLedger::new("asset").with_staging(2);
        let payload = r#"{"keys":[{"key":"asset1","count":3}]}"#;
        ledger.submit("batch", &args(&[payload])).await.unwrap();
        assert_eq!(ledger.value_of("asset1"), None);
        assert_eq!(ledger.staged_len(), 1);

        assert_eq!(ledger.submit("flush", &[]).await.unwrap(), b"0");
        assert_eq!(ledger.submit("flush", &[]).await.unwrap(), b"0");
        assert_eq!(ledger.submit("flush", &[]).await.unwrap(), b"1");
        assert_eq!(ledger.submit("flush", &[]).await.unwrap(), b"1");
        assert_eq!(ledger.value_of("asset1"), Some(3));
        assert_eq!(ledger.staged_len(), 0);
    }

    #[tokio::test]
    async fn injected_failures_skip_writes() {
        let ledger = MemoryLedger::new("asset");
        ledger.fail_next_submits(1);

        let payload = r#"{"keys":[{"key":"asset1","count":1}]}"#;
        assert_matches!(
            ledger.submit("batch", &args(&[payload])).await,
            Err(CoreError::ServiceUnavailable(_))
        );
        assert!(ledger.is_empty());

        ledger.submit("batch", &args(&[payload])).await.unwrap();
        assert_eq!(ledger.total_value(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let ledger = MemoryLedger::new("asset");
        assert_matches!(
            ledger.submit("update", &args(&["asset9"])).await,
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(
            ledger.submit("create", &[]).await,
            Err(CoreError::Validation { .. })
        );
        assert_matches!(
            ledger.submit("batch", &args(&["not json"])).await,
            Err(CoreError::Serialization(_))
        );
        assert_matches!(
            ledger.submit("mint", &args(&["asset1"])).await,
            Err(CoreError::Service { .. })
        );
    }
}
