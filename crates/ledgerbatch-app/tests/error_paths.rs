//! Cross-crate 에러 경로 테스트.
//!
//! 원장 어댑터 에러가 배치 레이어까지 전파되는지 검증한다.

use assert_matches::assert_matches;
use futures::stream;
use ledgerbatch_batch::executor::FlushExecutor;
use ledgerbatch_batch::pipeline::BatchPipeline;
use ledgerbatch_batch::scheduler::FlushScheduler;
use ledgerbatch_batch::BatchError;
use ledgerbatch_core::error::CoreError;
use ledgerbatch_core::ports::ledger::TransactionalService;
use ledgerbatch_core::run_store::RunConfigStore;
use ledgerbatch_network::http_client::HttpLedgerClient;
use ledgerbatch_network::memory_ledger::MemoryLedger;
use std::sync::Arc;
use std::time::Duration;

fn unreachable_client() -> HttpLedgerClient {
    HttpLedgerClient::new("http://127.0.0.1:9", Duration::from_secs(2))
        .unwrap()
        .with_max_retries(0)
}

#[tokio::test]
async fn unreachable_gateway_is_network_error() {
    let err = unreachable_client()
        .evaluate("read", &["asset1".to_string()])
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(err, CoreError::Network(_));
}

#[tokio::test]
async fn submission_error_carries_adapter_cause() {
    let pipeline = BatchPipeline::new(
        FlushScheduler::new(2, Duration::from_millis(10)),
        FlushExecutor::new(Arc::new(unreachable_client()), "batch"),
    );

    let keys = ["asset1", "asset2"].map(String::from);
    let err = pipeline.run(stream::iter(keys)).await.unwrap_err();
    assert_matches!(
        err,
        BatchError::Submission {
            source: CoreError::Network(_),
            ..
        }
    );
    assert_eq!(err.epoch(), Some(1));
}

#[tokio::test]
async fn unknown_operation_is_rejected() {
    let ledger = MemoryLedger::new("asset");
    let err = ledger.evaluate("batch", &[]).await.unwrap_err();
    assert_matches!(err, CoreError::Service { .. });
}

#[test]
fn non_positive_window_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = RunConfigStore::new(dir.path());
    std::fs::write(store.path(), r#"{"nextCounter": 1, "windowSize": 0}"#).unwrap();

    assert_matches!(store.load_or_init(), Err(CoreError::Validation { .. }));
}
