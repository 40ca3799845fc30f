//! 델타 모델.
//!
//! 아직 플러시되지 않은 키별 발생 횟수와, 원장에 보내는 배치 요청 형태.

use serde::{Deserialize, Serialize};

/// 키 하나에 대한 미전송 발생 횟수
///
/// 한 에포크 안에서 키당 최대 하나만 존재한다. `count`는 항상 1 이상.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelta {
    /// 원장 키 (예: `asset17`)
    pub key: String,
    /// 마지막 성공 플러시 이후 누적된 발생 횟수
    pub count: u64,
}

impl PendingDelta {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// 원장 `batch` 연산에 전달되는 단일 요청 형태
///
/// 트리거 종류와 상관없이 플러시 한 번 = 요청 한 번.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub keys: Vec<PendingDelta>,
}

impl BatchRequest {
    /// 요청에 포함된 전체 발생 횟수 합
    pub fn total_count(&self) -> u64 {
        self.keys.iter().map(|d| d.count).sum()
    }
}

impl From<&[PendingDelta]> for BatchRequest {
    fn from(deltas: &[PendingDelta]) -> Self {
        Self {
            keys: deltas.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_parses_wire_json() {
        let json = r#"{"keys":[{"key":"asset3","count":4}]}"#;
        let request: BatchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.keys, vec![PendingDelta::new("asset3", 4)]);
        assert_eq!(request.total_count(), 4);
    }

    #[test]
    fn total_count_sums_all_deltas() {
        let deltas = [PendingDelta::new("a", 2), PendingDelta::new("b", 5)];
        let request = BatchRequest::from(&deltas[..]);
        assert_eq!(request.total_count(), 7);
    }
}
