//! 명령 처리기.
//!
//! - `create`: `[next, next + window)` 키 생성 후 카운터 전진 (레이블 `set`)
//! - `read`: `[next - window, next)` 키 값 합산 (레이블 `get`)
//! - `update`: `[next - window, next)` 키마다 `update` 하나씩 제출 (레이블 `update`)
//! - `batch`: 키 스트림을 배치 파이프라인으로 플러시 (레이블 `batch<MODE><MULT>`)
//!
//! 실행 설정 파일은 명령이 끝까지 성공했을 때만 쓴다.

use anyhow::{bail, Context, Result};
use futures::Stream;
use ledgerbatch_batch::pipeline::{BatchPipeline, RunReport};
use ledgerbatch_batch::run_metrics::RunMetrics;
use ledgerbatch_batch::sequencer::{KeySequencer, Keys};
use ledgerbatch_core::config::AppConfig;
use ledgerbatch_core::models::run::{KeyMode, RunConfig};
use ledgerbatch_core::ports::ledger::TransactionalService;
use ledgerbatch_core::run_store::{MetricsFile, RunConfigStore};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::lifecycle::KeyProgress;

/// 명령 실행에 필요한 의존성 묶음
pub struct CommandContext {
    pub config: AppConfig,
    pub service: Arc<dyn TransactionalService>,
    pub run_store: RunConfigStore,
    pub metrics: MetricsFile,
    pub shutdown: watch::Receiver<bool>,
    pub progress: KeyProgress,
}

impl CommandContext {
    fn interrupted(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn doc_type(&self) -> &str {
        &self.config.ledger.doc_type
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub mode: KeyMode,
    pub multiplier: Option<u32>,
    pub seed: Option<u64>,
}

/// `read` 응답에서 필요한 필드
#[derive(Debug, Deserialize)]
struct AssetValue {
    value: u64,
}

/// 키마다 진행 수를 올리고 런타임에 양보하는 스트림
fn key_stream(keys: Keys, progress: KeyProgress) -> impl Stream<Item = String> + Unpin {
    Box::pin(futures::stream::unfold(keys, move |mut keys| {
        let progress = progress.clone();
        async move {
            let key = keys.next()?;
            progress.advance();
            tokio::task::yield_now().await;
            Some((key, keys))
        }
    }))
}

pub async fn run_create(ctx: &CommandContext) -> Result<RunConfig> {
    let metrics = RunMetrics::start("set");
    let run_config = ctx.run_store.load_or_init()?;
    let window = run_config.create_window()?;
    let next = run_config.advanced()?;
    info!("키 생성 시작: {window}");

    let sequencer = KeySequencer::new(ctx.doc_type(), window, KeyMode::Sequential);
    for key in sequencer.keys() {
        if ctx.interrupted() {
            bail!("종료 신호로 생성 중단 (실행 설정 유지)");
        }
        ctx.progress.advance();
        ctx.service
            .submit("create", std::slice::from_ref(&key))
            .await
            .with_context(|| format!("{key} 생성 실패"))?;
        debug!("생성 완료: {key}");
    }

    ctx.run_store.save(&next)?;
    metrics.record(&ctx.metrics)?;
    info!("키 {}개 생성, 다음 카운터 {}", window.len(), next.next_counter);
    Ok(next)
}

pub async fn run_read(ctx: &CommandContext) -> Result<u64> {
    let metrics = RunMetrics::start("get");
    let run_config = ctx.run_store.load_or_init()?;
    let window = run_config.read_window()?;
    info!("키 조회 시작: {window}");

    let sequencer = KeySequencer::new(ctx.doc_type(), window, KeyMode::Sequential);
    let mut total = 0u64;
    for key in sequencer.keys() {
        if ctx.interrupted() {
            bail!("종료 신호로 조회 중단");
        }
        ctx.progress.advance();
        let raw = ctx
            .service
            .evaluate("read", std::slice::from_ref(&key))
            .await
            .with_context(|| format!("{key} 조회 실패"))?;
        let asset: AssetValue = serde_json::from_slice(&raw)
            .with_context(|| format!("{key} 응답 파싱 실패"))?;
        debug!("조회 완료: {key} = {}", asset.value);
        total += asset.value;
    }

    metrics.record(&ctx.metrics)?;
    info!("전체 값 합계: {total}");
    Ok(total)
}

/// 배치 없이 키마다 `update`를 하나씩 제출하는 기준 실행
///
/// 반환값은 갱신한 키 수. 실행 설정은 읽기만 한다.
pub async fn run_update(ctx: &CommandContext) -> Result<u64> {
    let metrics = RunMetrics::start("update");
    let run_config = ctx.run_store.load_or_init()?;
    let window = run_config.read_window()?;
    info!("키 개별 갱신 시작: {window}");

    let sequencer = KeySequencer::new(ctx.doc_type(), window, KeyMode::Sequential);
    let mut updated = 0u64;
    for key in sequencer.keys() {
        if ctx.interrupted() {
            bail!("종료 신호로 갱신 중단: 키 {}개 중 {updated}개 처리", sequencer.len());
        }
        ctx.progress.advance();
        ctx.service
            .submit("update", std::slice::from_ref(&key))
            .await
            .with_context(|| format!("{key} 갱신 실패"))?;
        debug!("갱신 완료: {key}");
        updated += 1;
    }

    metrics.record(&ctx.metrics)?;
    info!("키 {updated}개 개별 갱신");
    Ok(updated)
}

pub async fn run_batch(ctx: &CommandContext, options: &BatchOptions) -> Result<RunReport> {
    let metrics = RunMetrics::start(RunMetrics::batch_label(options.mode, options.multiplier));
    let run_config = ctx.run_store.load_or_init()?;
    let window = run_config.batch_window(options.multiplier)?;

    let mut sequencer = KeySequencer::new(ctx.doc_type(), window, options.mode);
    if let Some(seed) = options.seed {
        sequencer = sequencer.with_seed(seed);
    }
    info!(
        "{} 시작: {}, 모드 {:?}, 임계값 {}, 디바운스 {}ms",
        metrics.label(),
        sequencer.window(),
        sequencer.mode(),
        ctx.config.flush.size_threshold,
        ctx.config.flush.debounce_ms
    );

    let report = BatchPipeline::from_config(&ctx.config, Arc::clone(&ctx.service))
        .with_shutdown(ctx.shutdown.clone())
        .run(key_stream(sequencer.keys(), ctx.progress.clone()))
        .await?;

    if report.interrupted {
        bail!(
            "종료 신호로 배치 중단: 키 {}개 중 {}개 처리",
            sequencer.len(),
            report.records
        );
    }

    ctx.run_store.save(&run_config)?;
    metrics.record(&ctx.metrics)?;
    Ok(report)
}
