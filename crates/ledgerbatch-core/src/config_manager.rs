//! 설정 로드 관리.
//!
//! 기본값 → 데이터 디렉토리의 `ledgerbatch.json` → 환경 변수 순서로 덮어쓴다.
//! CLI 인자는 호출자가 마지막에 적용한다.

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::CoreError;

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "ledgerbatch.json";

/// 환경 변수 접두어 (`LEDGERBATCH__FLUSH__SIZE_THRESHOLD=10`)
const ENV_PREFIX: &str = "LEDGERBATCH";

/// 설정 관리자
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 설정 파일 경로 (없어도 됨)
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// 데이터 디렉토리 기준 설정 관리자 생성
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(CONFIG_FILE_NAME))
    }

    /// 지정된 경로로 설정 관리자 생성
    pub fn with_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// 환경 변수 접두어 변경
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// 설정 파일 경로 반환
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 계층 설정 로드 + 검증
    pub fn load(&self) -> Result<AppConfig, CoreError> {
        let defaults = Config::try_from(&AppConfig::default())
            .map_err(|e| CoreError::Config(format!("기본 설정 직렬화 실패: {e}")))?;

        let layered = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(self.config_path.as_path())
                    .format(FileFormat::Json)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                CoreError::Config(format!(
                    "설정 로드 실패: {}: {e}",
                    self.config_path.display()
                ))
            })?;

        let config: AppConfig = layered
            .try_deserialize()
            .map_err(|e| CoreError::Config(format!("설정 파싱 실패: {e}")))?;
        config.validate()?;

        debug!("설정 로드 완료: {}", self.config_path.display());
        Ok(config)
    }

    /// 설정 파일이 없으면 기본 설정으로 생성
    pub fn write_default_if_missing(&self) -> Result<bool, CoreError> {
        if self.config_path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(&self.config_path, content).map_err(|e| {
            CoreError::Config(format!(
                "설정 파일 저장 실패: {}: {e}",
                self.config_path.display()
            ))
        })?;
        info!("기본 설정 파일 생성: {}", self.config_path.display());
        Ok(true)
    }

    /// 플랫폼별 기본 데이터 디렉토리
    ///
    /// - macOS: `~/Library/Application Support/dev.ledgerbatch.ledgerbatch/`
    /// - Windows: `%APPDATA%\ledgerbatch\ledgerbatch\data\`
    /// - Linux: `~/.local/share/ledgerbatch/`
    pub fn default_data_dir() -> Result<PathBuf, CoreError> {
        ProjectDirs::from("dev", "ledgerbatch", "ledgerbatch")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
    }
}
