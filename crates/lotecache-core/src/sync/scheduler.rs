use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

/// Single-flight flag shared between scheduler ticks.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held while a run is in progress; dropping it frees the guard.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A permit, or None while another run holds one.
    pub fn try_start(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run `job` now and then every `period` until `shutdown` resolves.
///
/// Each run is spawned; a tick that arrives while the previous run is still
/// going is skipped.
pub async fn run_every<F, Fut, S>(period: Duration, shutdown: S, job: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
    S: Future<Output = ()>,
{
    let guard = RunGuard::new();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                match guard.try_start() {
                    Some(permit) => {
                        let run = job();
                        tokio::spawn(async move {
                            let _permit = permit;
                            run.await;
                        });
                    }
                    None => info!("Previous run still in progress, skipping this tick"),
                }
            }
        }
    }
}
