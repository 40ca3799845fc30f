//! HTTP 원장 게이트웨이 클라이언트.
//!
//! `TransactionalService` 포트 구현. 게이트웨이는 다음 두 엔드포인트를 노출한다:
//!
//! - `POST /transactions/submit`: 합의를 거치는 트랜잭션
//! - `POST /transactions/evaluate`: 읽기 전용 질의
//!
//! 요청 본문은 `{ "operation": "...", "args": [...] }`, 응답 본문은 원장 결과 바이트 그대로.
//! 조회(`evaluate`)만 재시도한다. 제출은 중복 반영될 수 있으므로 어댑터가 재시도하지 않는다.

use async_trait::async_trait;
use ledgerbatch_core::config::LedgerConfig;
use ledgerbatch_core::error::CoreError;
use ledgerbatch_core::ports::ledger::TransactionalService;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 기본 첫 재시도 대기
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct TransactionRequest<'a> {
    operation: &'a str,
    args: &'a [String],
}

/// 원장 게이트웨이 클라이언트
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, CoreError> {
        Self::new(&config.gateway_url, config.timeout())
    }

    /// 조회 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 첫 재시도 대기 설정 (이후 2배씩, 최대 30초)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 요청 하나 전송 후 응답 본문 반환
    async fn post(&self, path: &str, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(&TransactionRequest { operation, args })
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("{operation} 요청 실패: {e}")))?;

        let resp = check_response(operation, resp).await?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| CoreError::Network(format!("{operation} 응답 읽기 실패: {e}")))?;
        Ok(body.to_vec())
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: backoff → 2x → 4x (최대 30초)
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = self.retry_backoff;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() || attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!(
                        "요청 실패 (시도 {attempt}/{}): {e}, {delay:?} 후 재시도",
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }
}

/// 응답 상태 코드 확인 및 에러 매핑
async fn check_response(
    operation: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_else(|e| {
        warn!("응답 본문 읽기 실패: {e}");
        String::new()
    });

    match status.as_u16() {
        404 => Err(CoreError::NotFound {
            resource_type: "Operation".to_string(),
            id: operation.to_string(),
        }),
        503 => Err(CoreError::ServiceUnavailable(text)),
        400..=499 => Err(CoreError::Service {
            operation: operation.to_string(),
            message: format!("{status}: {text}"),
        }),
        _ => Err(CoreError::Internal(format!("게이트웨이 에러 ({status}): {text}"))),
    }
}

#[async_trait]
impl TransactionalService for HttpLedgerClient {
    async fn submit(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError> {
        debug!("트랜잭션 제출: {operation} (인자 {}개)", args.len());
        self.post("/transactions/submit", operation, args).await
    }

    async fn evaluate(&self, operation: &str, args: &[String]) -> Result<Vec<u8>, CoreError> {
        debug!("트랜잭션 조회: {operation} {args:?}");
        self.execute_with_retry(move || self.post("/transactions/evaluate", operation, args))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> HttpLedgerClient {
        HttpLedgerClient::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_retry_backoff(Duration::from_millis(10))
    }

    #[test]
    fn client_creation() {
        let client = HttpLedgerClient::new("http://localhost:8080/", Duration::from_secs(30)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[tokio::test]
    async fn submit_posts_operation_and_args() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transactions/submit")
            .match_body(Matcher::Json(serde_json::json!({
                "operation": "batch",
                "args": [r#"{"keys":[{"key":"asset1","count":2}]}"#]
            })))
            .with_status(200)
            .with_body("Success")
            .create_async()
            .await;

        let result = client(&server)
            .submit(
                "batch",
                &[r#"{"keys":[{"key":"asset1","count":2}]}"#.to_string()],
            )
            .await
            .unwrap();
        assert_eq!(result, b"Success");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transactions/submit")
            .with_status(503)
            .with_body("busy")
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).submit("batch", &[]).await.unwrap_err();
        assert_matches!(err, CoreError::ServiceUnavailable(_));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn evaluate_retries_retryable_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transactions/evaluate")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server)
            .with_max_retries(2)
            .evaluate("read", &["asset1".to_string()])
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::ServiceUnavailable(_));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn evaluate_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"docType":"asset","key":"asset1","value":3}"#;
        let mock = server
            .mock("POST", "/transactions/evaluate")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let result = client(&server)
            .evaluate("read", &["asset1".to_string()])
            .await
            .unwrap();
        assert_eq!(result, body.as_bytes());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let _not_found = server
            .mock("POST", "/transactions/evaluate")
            .with_status(404)
            .create_async()
            .await;
        let _rejected = server
            .mock("POST", "/transactions/submit")
            .with_status(400)
            .with_body("asset99 does not exist")
            .create_async()
            .await;

        let client = client(&server);
        assert_matches!(
            client.evaluate("nope", &[]).await,
            Err(CoreError::NotFound { .. })
        );
        let err = client.submit("delete", &["asset99".to_string()]).await.unwrap_err();
        assert_matches!(err, CoreError::Service { ref operation, .. } if operation == "delete");
    }

    #[tokio::test]
    async fn server_error_is_internal_and_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transactions/evaluate")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).evaluate("read", &[]).await.unwrap_err();
        assert_matches!(err, CoreError::Internal(_));
        mock.assert_async().await;
    }
}
