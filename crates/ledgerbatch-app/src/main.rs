//! # ledgerbatch
//!
//! 느린 트랜잭션 원장을 상대로 키 생성/조회/배치 갱신을 실행하고
//! 실행 시간을 기록하는 명령행 도구.

mod commands;
mod lifecycle;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledgerbatch_core::config::{AppConfig, FailurePolicy, LedgerBackend};
use ledgerbatch_core::config_manager::ConfigManager;
use ledgerbatch_core::models::run::KeyMode;
use ledgerbatch_core::ports::ledger::TransactionalService;
use ledgerbatch_core::run_store::{MetricsFile, RunConfigStore};
use ledgerbatch_network::http_client::HttpLedgerClient;
use ledgerbatch_network::memory_ledger::MemoryLedger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{BatchOptions, CommandContext};
use crate::lifecycle::RunLifecycle;

/// 원장 쓰기 배칭 벤치마크 도구
#[derive(Parser, Debug)]
#[command(name = "ledgerbatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정/실행 상태 저장 경로 (기본: 플랫폼 데이터 디렉토리)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 원장 백엔드
    #[arg(long, global = true, value_enum)]
    ledger: Option<BackendArg>,

    /// HTTP 게이트웨이 주소
    #[arg(long, global = true)]
    gateway_url: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    Http,
}

impl From<BackendArg> for LedgerBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => LedgerBackend::Memory,
            BackendArg::Http => LedgerBackend::Http,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// `[next, next + window)` 키 생성 후 카운터 전진
    Create,
    /// `[next - window, next)` 키 값 합산
    Read,
    /// `[next - window, next)` 키마다 `update`를 하나씩 제출 (배치 없는 기준 실행)
    Update,
    /// 키 스트림을 배치로 모아 플러시
    Batch(BatchArgs),
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// 키 모드: S (순차) 또는 R (난수)
    #[arg(value_parser = parse_mode, default_value = "S")]
    mode: KeyMode,

    /// 윈도우 반복 배수 (주어지면 `window * (multiplier - 1)`개 추가)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    multiplier: Option<u32>,

    /// 크기 임계값 (서로 다른 키 수)
    #[arg(long)]
    threshold: Option<usize>,

    /// 디바운스 간격 (밀리초)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// 동시 진행 플러시 사이클 수
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// 제출 후 `flush` 폴링으로 반영 확인
    #[arg(long)]
    confirm: bool,

    /// 키 스트림이 끝나면 디바운스 없이 바로 플러시
    #[arg(long)]
    flush_on_close: bool,

    /// 실패한 에포크를 다음 플러시에 다시 포함
    #[arg(long)]
    requeue: bool,

    /// 난수 모드 시드
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_mode(value: &str) -> Result<KeyMode, String> {
    match value.to_ascii_uppercase().as_str() {
        "S" => Ok(KeyMode::Sequential),
        "R" => Ok(KeyMode::Random),
        other => Err(format!("알 수 없는 모드: {other} (S 또는 R)")),
    }
}

/// 데이터 디렉토리 결정 (CLI 인자 또는 플랫폼별 기본 경로)
fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(dir) => Ok(dir),
        None => Ok(ConfigManager::default_data_dir()?),
    }
}

/// 계층 설정 로드 후 CLI 오버라이드 적용
fn load_config(args: &Args, data_dir: &std::path::Path) -> Result<AppConfig> {
    let manager = ConfigManager::new(data_dir);
    manager.write_default_if_missing()?;
    let mut config = manager.load()?;

    if let Some(backend) = args.ledger {
        config.ledger.backend = backend.into();
    }
    if let Some(url) = &args.gateway_url {
        config.ledger.gateway_url = url.clone();
    }

    if let Command::Batch(batch) = &args.command {
        if let Some(threshold) = batch.threshold {
            config.flush.size_threshold = threshold;
        }
        if let Some(debounce_ms) = batch.debounce_ms {
            config.flush.debounce_ms = debounce_ms;
        }
        if let Some(max_in_flight) = batch.max_in_flight {
            config.flush.max_in_flight = max_in_flight;
        }
        config.confirm.enabled |= batch.confirm;
        config.flush.flush_on_close |= batch.flush_on_close;
        if batch.requeue {
            config.failure_policy = FailurePolicy::Requeue;
        }
    }

    config.validate()?;
    Ok(config)
}

/// 설정된 백엔드로 원장 어댑터 생성
fn build_ledger(config: &AppConfig) -> Result<Arc<dyn TransactionalService>> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            warn!("인메모리 원장 사용: 프로세스 종료 시 상태가 사라집니다");
            Ok(Arc::new(MemoryLedger::from_config(&config.ledger)))
        }
        LedgerBackend::Http => {
            info!("HTTP 원장: {}", config.ledger.gateway_url);
            let client = HttpLedgerClient::from_config(&config.ledger)
                .context("HTTP 원장 클라이언트 생성 실패")?;
            Ok(Arc::new(client))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "ledgerbatch={},ledgerbatch_app={},ledgerbatch_core={},ledgerbatch_batch={},ledgerbatch_network={}",
        args.log_level, args.log_level, args.log_level, args.log_level, args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let result = run(args).await;
    if let Err(e) = &result {
        error!("실행 실패: {e:#}");
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let data_dir = resolve_data_dir(args.data_dir.clone())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("데이터 디렉토리 생성 실패: {}", data_dir.display()))?;

    let config = load_config(&args, &data_dir)?;
    let service = build_ledger(&config)?;

    let lifecycle = Arc::new(RunLifecycle::new());
    let signal_watcher = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move {
            if let Err(e) = lifecycle.stop_on_signal().await {
                warn!("시그널 핸들러 등록 실패: {e}");
            }
        })
    };

    let ctx = CommandContext {
        config,
        service,
        run_store: RunConfigStore::new(&data_dir),
        metrics: MetricsFile::new(&data_dir),
        shutdown: lifecycle.stop_receiver(),
        progress: lifecycle.progress(),
    };

    let outcome = match &args.command {
        Command::Create => commands::run_create(&ctx).await.map(|next| {
            info!("다음 카운터: {}", next.next_counter);
        }),
        Command::Read => commands::run_read(&ctx).await.map(|total| {
            info!("total value: {total}");
        }),
        Command::Update => commands::run_update(&ctx).await.map(|updated| {
            info!("갱신한 키: {updated}개");
        }),
        Command::Batch(batch) => {
            let options = BatchOptions {
                mode: batch.mode,
                multiplier: batch.multiplier,
                seed: batch.seed,
            };
            commands::run_batch(&ctx, &options).await.map(|report| {
                info!(
                    "사이클 {}개, 델타 {}개, 발생 {}회, {:?}",
                    report.cycles_confirmed,
                    report.deltas_delivered,
                    report.occurrences_delivered,
                    report.elapsed
                );
            })
        }
    };

    signal_watcher.abort();
    outcome
}
