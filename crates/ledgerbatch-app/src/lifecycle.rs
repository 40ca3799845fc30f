//! 실행 라이프사이클.
//!
//! 종료 요청을 명령에 전달하고, 요청 시점까지 발행된 키 수를 남긴다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// 명령이 지금까지 발행한 키 수
#[derive(Debug, Clone, Default)]
pub struct KeyProgress(Arc<AtomicU64>);

impl KeyProgress {
    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issued(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// 한 번의 명령 실행에 대한 종료 채널과 진행 상황
pub struct RunLifecycle {
    stop_tx: watch::Sender<bool>,
    progress: KeyProgress,
}

impl RunLifecycle {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            progress: KeyProgress::default(),
        }
    }

    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn progress(&self) -> KeyProgress {
        self.progress.clone()
    }

    /// 종료 요청. 요청 시점의 발행 키 수를 돌려준다.
    pub fn request_stop(&self, reason: &str) -> u64 {
        let issued = self.progress.issued();
        if self.stop_tx.send_replace(true) {
            debug!("이미 종료 요청됨 ({reason})");
        } else {
            info!("{reason}: 키 {issued}개 발행 후 종료 요청");
        }
        issued
    }

    /// OS 시그널(SIGINT, SIGTERM)을 기다렸다가 종료 요청
    pub async fn stop_on_signal(&self) -> std::io::Result<()> {
        let reason = wait_for_os_signal().await?;
        self.request_stop(reason);
        Ok(())
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    })
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
