//! 실행 설정 모델.
//!
//! 실행 간에 유지되는 카운터/윈도우 설정, 키 윈도우, 실행 시간 기록.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 실행 시간 기록: 연산 레이블 → 경과 밀리초
pub type MetricsRecord = BTreeMap<String, u64>;

/// 실행 간에 유지되는 설정 (`setConfig.json`)
///
/// 실행 시작 시 한 번 읽고, 모든 사이클이 성공한 뒤 한 번 쓴다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// 다음에 생성할 키 번호
    #[serde(alias = "nextAssetNumber")]
    pub next_counter: i64,
    /// 한 번의 실행이 다루는 키 개수
    #[serde(alias = "numberAssetsToSet")]
    pub window_size: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            next_counter: 1,
            window_size: 100,
        }
    }
}

impl RunConfig {
    /// 배치 실행 윈도우 `[nextCounter - windowSize, nextCounter + reps)`
    ///
    /// `multiplier`가 주어지면 `reps = windowSize * (multiplier - 1)`, 아니면 0.
    pub fn batch_window(&self, multiplier: Option<u32>) -> Result<KeyWindow, CoreError> {
        let reps = match multiplier {
            Some(0) => {
                return Err(CoreError::Validation {
                    field: "multiplier".to_string(),
                    message: "1 이상이어야 합니다".to_string(),
                })
            }
            Some(m) => self
                .window_size
                .checked_mul(i64::from(m) - 1)
                .ok_or_else(|| overflow("multiplier", self.window_size, i64::from(m)))?,
            None => 0,
        };
        KeyWindow::new(self.window_start()?, self.offset_counter(reps)?)
    }

    /// 새 키 생성 윈도우 `[nextCounter, nextCounter + windowSize)`
    pub fn create_window(&self) -> Result<KeyWindow, CoreError> {
        KeyWindow::new(self.next_counter, self.offset_counter(self.window_size)?)
    }

    /// 조회 윈도우 `[nextCounter - windowSize, nextCounter)`
    pub fn read_window(&self) -> Result<KeyWindow, CoreError> {
        KeyWindow::new(self.window_start()?, self.next_counter)
    }

    /// 생성 실행이 끝난 뒤의 설정 (카운터를 윈도우만큼 전진)
    pub fn advanced(&self) -> Result<Self, CoreError> {
        Ok(Self {
            next_counter: self.offset_counter(self.window_size)?,
            window_size: self.window_size,
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_size <= 0 {
            return Err(CoreError::Validation {
                field: "windowSize".to_string(),
                message: format!("양수여야 합니다: {}", self.window_size),
            });
        }
        Ok(())
    }

    fn window_start(&self) -> Result<i64, CoreError> {
        self.next_counter
            .checked_sub(self.window_size)
            .ok_or_else(|| overflow("nextCounter", self.next_counter, self.window_size))
    }

    fn offset_counter(&self, delta: i64) -> Result<i64, CoreError> {
        self.next_counter
            .checked_add(delta)
            .ok_or_else(|| overflow("nextCounter", self.next_counter, delta))
    }
}

fn overflow(field: &str, base: i64, operand: i64) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: format!("키 번호 범위를 벗어남: {base}, {operand}"),
    }
}

/// 키 번호 반열린 구간 `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    low: i64,
    high: i64,
}

impl KeyWindow {
    pub fn new(low: i64, high: i64) -> Result<Self, CoreError> {
        if high < low {
            return Err(CoreError::Validation {
                field: "window".to_string(),
                message: format!("high({high}) < low({low})"),
            });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    /// 구간에 포함된 정수 개수
    pub fn len(&self) -> u64 {
        self.high.abs_diff(self.low)
    }

    pub fn is_empty(&self) -> bool {
        self.high == self.low
    }
}

impl fmt::Display for KeyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}

/// 키 생성 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// 구간 안의 정수를 순서대로
    #[default]
    Sequential,
    /// 구간 안에서 균등 난수 (중복 허용)
    Random,
}

impl KeyMode {
    /// 메트릭 레이블에 쓰이는 한 글자 태그
    pub fn tag(self) -> &'static str {
        match self {
            KeyMode::Sequential => "S",
            KeyMode::Random => "R",
        }
    }
}
