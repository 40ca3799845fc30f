//! 실행 설정 / 실행 시간 파일 관리.
//!
//! `setConfig.json`(다음 카운터, 윈도우 크기)과 `record.json`(레이블별 실행 시간)을
//! JSON으로 읽고 쓴다. 실행 설정은 시작 시 한 번 읽고 성공 종료 시 한 번 쓴다.

use std::fs;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::models::run::{MetricsRecord, RunConfig};
use crate::ports::metrics::MetricsSink;

/// 실행 설정 파일 이름
pub const RUN_CONFIG_FILE_NAME: &str = "setConfig.json";

/// 실행 시간 기록 파일 이름
pub const METRICS_FILE_NAME: &str = "record.json";

/// 실행 설정 저장소
#[derive(Debug, Clone)]
pub struct RunConfigStore {
    path: PathBuf,
}

impl RunConfigStore {
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(RUN_CONFIG_FILE_NAME))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 설정 로드. 파일이 없으면 기본값을 만들어 저장한다.
    pub fn load_or_init(&self) -> Result<RunConfig, CoreError> {
        if !self.path.exists() {
            let config = RunConfig::default();
            self.save(&config)?;
            info!("기본 실행 설정 생성: {}", self.path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            CoreError::Config(format!(
                "실행 설정 읽기 실패: {}: {e}",
                self.path.display()
            ))
        })?;
        let config: RunConfig = serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!(
                "실행 설정 파싱 실패: {}: {e}",
                self.path.display()
            ))
        })?;
        config.validate()?;

        debug!(
            "실행 설정 로드: nextCounter={}, windowSize={}",
            config.next_counter, config.window_size
        );
        Ok(config)
    }

    pub fn save(&self, config: &RunConfig) -> Result<(), CoreError> {
        write_json(&self.path, config)
    }
}

/// 실행 시간 기록 파일: [`MetricsSink`] 구현
///
/// 읽기 → 병합 → 쓰기. 같은 프로세스 안의 동시 기록은 뮤텍스로 직렬화한다.
#[derive(Debug)]
pub struct MetricsFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetricsFile {
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(METRICS_FILE_NAME))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 기록 전체 (파일이 없으면 빈 기록)
    pub fn load(&self) -> Result<MetricsRecord, CoreError> {
        if !self.path.exists() {
            return Ok(MetricsRecord::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(MetricsRecord::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!(
                "실행 시간 기록 파싱 실패: {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl MetricsSink for MetricsFile {
    fn record_duration(&self, label: &str, millis: u64) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock();

        let mut record = self.load()?;
        record.insert(label.to_string(), millis);
        write_json(&self.path, &record)?;

        debug!("실행 시간 기록: {label}={millis}ms");
        Ok(())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
        .map_err(|e| CoreError::Config(format!("파일 저장 실패: {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_config_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunConfigStore::new(temp_dir.path());

        let config = store.load_or_init().unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(store.path().exists());
    }

    #[test]
    fn run_config_roundtrip_after_advance() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunConfigStore::new(temp_dir.path());
        let config = store.load_or_init().unwrap();

        store.save(&config.advanced().unwrap()).unwrap();
        let reloaded = store.load_or_init().unwrap();
        assert_eq!(reloaded.next_counter, 101);
    }

    #[test]
    fn malformed_run_config_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunConfigStore::new(temp_dir.path());
        fs::write(store.path(), r#"{"nextCounter": "one"}"#).unwrap();

        assert!(matches!(store.load_or_init(), Err(CoreError::Config(_))));
    }

    #[test]
    fn metrics_merge_is_last_write_wins_per_label() {
        let temp_dir = TempDir::new().unwrap();
        let metrics = MetricsFile::new(temp_dir.path());

        metrics.record_duration("set", 1200).unwrap();
        metrics.record_duration("batchR2", 800).unwrap();
        metrics.record_duration("set", 900).unwrap();

        let record = metrics.load().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record["set"], 900);
        assert_eq!(record["batchR2"], 800);
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let temp_dir = TempDir::new().unwrap();
        let metrics = std::sync::Arc::new(MetricsFile::new(temp_dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = std::sync::Arc::clone(&metrics);
                std::thread::spawn(move || metrics.record_duration(&format!("batchS{i}"), i))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(metrics.load().unwrap().len(), 8);
    }

    #[test]
    fn metrics_preserves_foreign_labels() {
        let temp_dir = TempDir::new().unwrap();
        let metrics = MetricsFile::new(temp_dir.path());
        fs::write(metrics.path(), r#"{"update": 4321}"#).unwrap();

        metrics.record_duration("get", 10).unwrap();

        let record = metrics.load().unwrap();
        assert_eq!(record["update"], 4321);
        assert_eq!(record["get"], 10);
    }
}
