//! ledgerbatch 도메인 모델.
//!
//! 배치 델타, 플러시 사이클, 실행 설정 등 크레이트 간 공유 데이터 구조체를 정의한다.

pub mod cycle;
pub mod delta;
pub mod run;
