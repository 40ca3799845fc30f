//! # ledgerbatch-network
//!
//! `TransactionalService` 포트의 어댑터.
//!
//! - [`http_client::HttpLedgerClient`]: REST 게이트웨이 (`/transactions/submit`, `/transactions/evaluate`)
//! - [`memory_ledger::MemoryLedger`]: 자산 컨트랙트 인메모리 시뮬레이션 (스테이징/커밋 지연 지원)
//!
//! ```rust,ignore
//! use ledgerbatch_network::memory_ledger::MemoryLedger;
//!
//! let ledger = Arc::new(MemoryLedger::new("asset"));
//! ```

pub mod http_client;
pub mod memory_ledger;
