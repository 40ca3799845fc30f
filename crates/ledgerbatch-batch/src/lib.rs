//! # ledgerbatch-batch
//!
//! 느린 트랜잭션 원장 앞단의 클라이언트 측 쓰기 배칭.
//!
//! - [`sequencer`]: 윈도우 안의 키 스트림 생성 (순차/난수)
//! - [`accumulator`]: 키별 발생 횟수 누적, 에포크 단위 스냅샷
//! - [`scheduler`]: 크기 임계값/디바운스 트리거, 에포크당 플러시 1회
//! - [`executor`]: 스냅샷 제출 + 확인 폴링 (지수 백오프, 상한 있음)
//! - [`pipeline`]: 위 구성요소를 하나의 협력형 루프로 구동
//! - [`run_metrics`]: 실행 시간 측정 및 기록

pub mod accumulator;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod run_metrics;
pub mod scheduler;
pub mod sequencer;

pub use error::BatchError;
