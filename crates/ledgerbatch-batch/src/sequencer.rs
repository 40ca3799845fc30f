//! 키 시퀀서.
//!
//! `[low, high)` 윈도우와 모드(순차/난수)로 `<docType><number>` 형태의 키를
//! 지연 생성한다. 부수 효과 없음.

use ledgerbatch_core::models::run::{KeyMode, KeyWindow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 키 시퀀서: 윈도우 + 모드로 유한 키 스트림 생성
#[derive(Debug, Clone)]
pub struct KeySequencer {
    doc_type: String,
    window: KeyWindow,
    mode: KeyMode,
    /// 난수 모드 재현용 시드 (없으면 OS 엔트로피)
    seed: Option<u64>,
}

impl KeySequencer {
    pub fn new(doc_type: impl Into<String>, window: KeyWindow, mode: KeyMode) -> Self {
        Self {
            doc_type: doc_type.into(),
            window,
            mode,
            seed: None,
        }
    }

    /// 난수 모드 시드 고정
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn window(&self) -> KeyWindow {
        self.window
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// 생성될 키 개수 (`high - low`, 모드와 무관)
    pub fn len(&self) -> u64 {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// 번호 하나에 대한 키 이름
    pub fn key_for(&self, number: i64) -> String {
        format!("{}{}", self.doc_type, number)
    }

    /// 처음부터 키 스트림 생성
    pub fn keys(&self) -> Keys {
        let rng = match (self.mode, self.seed) {
            (KeyMode::Sequential, _) => None,
            (KeyMode::Random, Some(seed)) => Some(StdRng::seed_from_u64(seed)),
            (KeyMode::Random, None) => Some(StdRng::from_os_rng()),
        };
        Keys {
            doc_type: self.doc_type.clone(),
            window: self.window,
            position: 0,
            rng,
        }
    }

    /// `offset`번째 키부터 재시작
    ///
    /// 순차 모드는 `low + offset`부터, 시드가 고정된 난수 모드는
    /// 처음부터 생성했을 때의 같은 위치부터 이어진다.
    pub fn keys_from(&self, offset: u64) -> Keys {
        let mut keys = self.keys();
        keys.advance(offset);
        keys
    }
}

/// 키 스트림 이터레이터
#[derive(Debug)]
pub struct Keys {
    doc_type: String,
    window: KeyWindow,
    position: u64,
    rng: Option<StdRng>,
}

impl Keys {
    fn advance(&mut self, offset: u64) {
        let target = offset.min(self.window.len());
        match self.rng.as_mut() {
            None => self.position = target,
            Some(rng) => {
                while self.position < target {
                    let _: i64 = rng.random_range(self.window.low()..self.window.high());
                    self.position += 1;
                }
            }
        }
    }

    fn remaining(&self) -> usize {
        (self.window.len() - self.position) as usize
    }
}

impl Iterator for Keys {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.position >= self.window.len() {
            return None;
        }
        let number = match self.rng.as_mut() {
            None => self.window.low() + self.position as i64,
            Some(rng) => rng.random_range(self.window.low()..self.window.high()),
        };
        self.position += 1;
        Some(format!("{}{}", self.doc_type, number))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Keys {}
