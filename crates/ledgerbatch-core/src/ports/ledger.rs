//! 원장(트랜잭션 서비스) 포트.
//!
//! 구현: `ledgerbatch-network` crate (HTTP 게이트웨이, 인메모리 원장)

use async_trait::async_trait;

use crate::error::CoreError;

/// 트랜잭션 서비스: 합의 순서가 매겨지는 느린 쓰기 저장소
///
/// 두 호출 모두 느릴 수 있으며, 같은 클라이언트에서 조율 없이
/// 동시에 호출하면 안 된다.
#[async_trait]
pub trait TransactionalService: Send + Sync {
    /// 원장에 커밋되는 트랜잭션 제출
    ///
    /// 반환값은 연산이 돌려준 원시 페이로드.
    async fn submit(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError>;

    /// 원장 상태를 바꾸지 않는 조회 트랜잭션
    async fn evaluate(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError>;
}
