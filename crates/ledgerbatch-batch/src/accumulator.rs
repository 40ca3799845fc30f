//! 배치 누적기.
//!
//! 키 → 미전송 델타의 삽입 순서 유지 맵. 같은 키는 횟수만 늘린다.
//!
//! 스냅샷을 뜨면 현재 에포크는 봉인(draining)되고, 이후 기록은 새 에포크로 간다.
//! 봉인된 에포크는 전달이 확인된 뒤 [`BatchAccumulator::clear`]로 지우거나,
//! 실패 시 [`BatchAccumulator::restore`]로 열린 에포크에 되돌린다.

use ledgerbatch_core::models::delta::PendingDelta;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// 봉인된 에포크의 불변 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSnapshot {
    epoch: u64,
    deltas: Arc<[PendingDelta]>,
}

impl EpochSnapshot {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn deltas(&self) -> &Arc<[PendingDelta]> {
        &self.deltas
    }

    /// 서로 다른 키 수
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// 스냅샷에 담긴 전체 발생 횟수
    pub fn total_count(&self) -> u64 {
        self.deltas.iter().map(|d| d.count).sum()
    }

    /// 키 하나의 횟수 (없으면 0)
    pub fn count_of(&self, key: &str) -> u64 {
        self.deltas
            .iter()
            .find(|d| d.key == key)
            .map_or(0, |d| d.count)
    }
}

/// 열린 에포크 저장소
#[derive(Debug)]
struct Epoch {
    id: u64,
    index: HashMap<String, usize>,
    deltas: Vec<PendingDelta>,
}

impl Epoch {
    fn new(id: u64) -> Self {
        Self {
            id,
            index: HashMap::new(),
            deltas: Vec::new(),
        }
    }

    fn add(&mut self, key: &str, count: u64) -> usize {
        match self.index.get(key) {
            Some(&slot) => self.deltas[slot].count += count,
            None => {
                self.index.insert(key.to_string(), self.deltas.len());
                self.deltas.push(PendingDelta::new(key, count));
            }
        }
        self.deltas.len()
    }
}

/// 배치 누적기: 에포크 단위로 키별 델타를 모은다
#[derive(Debug)]
pub struct BatchAccumulator {
    open: Epoch,
    /// 봉인됐지만 아직 전달 확인 전인 에포크 (봉인 순서)
    draining: VecDeque<EpochSnapshot>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self {
            open: Epoch::new(1),
            draining: VecDeque::new(),
        }
    }

    /// 키 발생 1회 기록. 열린 에포크의 서로 다른 키 수를 반환한다.
    pub fn record(&mut self, key: &str) -> usize {
        self.open.add(key, 1)
    }

    /// 열린 에포크를 봉인하고 스냅샷 반환
    ///
    /// 열린 에포크가 비어 있으면 아무것도 봉인하지 않고 `None`.
    pub fn seal(&mut self) -> Option<EpochSnapshot> {
        if self.open.deltas.is_empty() {
            return None;
        }
        let next = Epoch::new(self.open.id + 1);
        let sealed = std::mem::replace(&mut self.open, next);
        let snapshot = EpochSnapshot {
            epoch: sealed.id,
            deltas: sealed.deltas.into(),
        };
        debug!(
            "에포크 {} 봉인: 키 {}개, 발생 {}회",
            snapshot.epoch,
            snapshot.len(),
            snapshot.total_count()
        );
        self.draining.push_back(snapshot.clone());
        Some(snapshot)
    }

    /// 현재 누적분 스냅샷
    ///
    /// 새 기록이 있으면 봉인해서 반환하고, 없으면 가장 최근에 봉인된
    /// 스냅샷을 그대로 돌려준다. 중간에 `record`가 없으면 두 번 불러도 같은 내용.
    pub fn snapshot(&mut self) -> EpochSnapshot {
        if let Some(snapshot) = self.seal() {
            return snapshot;
        }
        match self.draining.back() {
            Some(latest) => latest.clone(),
            None => EpochSnapshot {
                epoch: self.open.id,
                deltas: Vec::new().into(),
            },
        }
    }

    /// 전달이 확인된 에포크 제거. 이미 지워졌으면 `false`.
    pub fn clear(&mut self, epoch: u64) -> bool {
        match self.draining.iter().position(|s| s.epoch == epoch) {
            Some(pos) => {
                self.draining.remove(pos);
                debug!("에포크 {epoch} 정리");
                true
            }
            None => false,
        }
    }

    /// 실패한 에포크를 열린 에포크에 되돌린다
    ///
    /// 되돌린 델타가 앞에 오고, 그 사이 쌓인 기록은 뒤에 합쳐진다.
    /// 반환값은 병합 후 열린 에포크의 서로 다른 키 수.
    pub fn restore(&mut self, epoch: u64) -> Option<usize> {
        let pos = self.draining.iter().position(|s| s.epoch == epoch)?;
        let failed = self.draining.remove(pos)?;

        let open_id = self.open.id;
        let current = std::mem::replace(&mut self.open, Epoch::new(open_id));
        for delta in failed.deltas.iter().chain(current.deltas.iter()) {
            self.open.add(&delta.key, delta.count);
        }
        debug!(
            "에포크 {epoch} 복원 → 열린 에포크 {} (키 {}개)",
            self.open.id,
            self.open.deltas.len()
        );
        Some(self.open.deltas.len())
    }

    /// 열린 에포크 ID
    pub fn open_epoch(&self) -> u64 {
        self.open.id
    }

    /// 열린 에포크의 서로 다른 키 수
    pub fn open_len(&self) -> usize {
        self.open.deltas.len()
    }

    /// 봉인 후 확인 대기 중인 에포크 수
    pub fn draining_len(&self) -> usize {
        self.draining.len()
    }

    /// 열린 에포크 + 봉인된 에포크를 합친 키 하나의 미전송 횟수
    pub fn pending_count(&self, key: &str) -> u64 {
        let open = self
            .open
            .index
            .get(key)
            .map_or(0, |&slot| self.open.deltas[slot].count);
        let draining: u64 = self.draining.iter().map(|s| s.count_of(key)).sum();
        open + draining
    }

    /// 전체 미전송 발생 횟수
    pub fn total_pending(&self) -> u64 {
        let open: u64 = self.open.deltas.iter().map(|d| d.count).sum();
        let draining: u64 = self.draining.iter().map(|s| s.total_count()).sum();
        open + draining
    }

    /// 열린 에포크도 비었고 확인 대기 에포크도 없음
    pub fn is_idle(&self) -> bool {
        self.open.deltas.is_empty() && self.draining.is_empty()
    }
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
