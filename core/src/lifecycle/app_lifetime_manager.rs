use futures::{Future, FutureExt};
use mmb_utils::nothing_to_do;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use std::panic;
use std::sync::Arc;

use crate::lifecycle::shutdown::ShutdownService;
use mmb_utils::cancellation_token::CancellationToken;

pub struct AppLifetimeManager {
    cancellation_token: CancellationToken,
    shutdown_service: Mutex<Option<Arc<ShutdownService>>>,
    /// Fired exactly once, after the shutdown sequence below completes,
    /// regardless of which caller triggered it. `RunningBot::wait_for_shutdown`
    /// waits on the paired receiver to know when it's safe to return.
    finish_signal: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    pub futures_cancellation_token: CancellationToken,
}

impl AppLifetimeManager {
    pub fn new(cancellation_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            cancellation_token,
            shutdown_service: Mutex::new(None),
            finish_signal: Mutex::new(None),
            futures_cancellation_token: CancellationToken::default(),
        })
    }

    /// Cancellation token that provide signal about starting graceful shutdown
    pub fn stop_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn setup_shutdown_service(&self, shutdown_service: Arc<ShutdownService>) {
        let mut guard = self
            .shutdown_service
            .try_lock()
            .expect("method should be invoked just after creation when there are no aliases");
        *guard = Some(shutdown_service);
    }

    pub fn setup_finish_signal(&self, finish_signal: tokio::sync::oneshot::Sender<()>) {
        let mut guard = self
            .finish_signal
            .try_lock()
            .expect("method should be invoked just after creation when there are no aliases");
        *guard = Some(finish_signal);
    }

    pub fn spawn_graceful_shutdown(&self, reason: impl Into<String>) -> Option<JoinHandle<()>> {
        let reason = reason.into();
        let shutdown_service_guard = self.shutdown_service.try_lock().ok()?;
        let finish_signal = self.finish_signal.try_lock().ok().and_then(|mut guard| guard.take());

        let handler = start_graceful_shutdown_inner(
            shutdown_service_guard,
            &reason,
            self.cancellation_token.clone(),
            self.futures_cancellation_token.clone(),
            finish_signal,
        )?;

        Some(tokio::spawn(async move {
            static FUTURE_NAME: &str = "Graceful shutdown future";

            let action_outcome = panic::AssertUnwindSafe(handler).catch_unwind().await;

            match action_outcome {
                Ok(()) => log::info!("{} completed successfully", FUTURE_NAME),
                Err(_) => log::error!("{} panicked", FUTURE_NAME),
            }
        }))
    }

    /// Launch async graceful shutdown operation
    pub async fn run_graceful_shutdown(&self, reason: &str) {
        let shutdown_service_guard = self.shutdown_service.lock().await;
        let finish_signal = self.finish_signal.lock().await.take();
        let fut_opt = start_graceful_shutdown_inner(
            shutdown_service_guard,
            reason,
            self.cancellation_token.clone(),
            self.futures_cancellation_token.clone(),
            finish_signal,
        );
        match fut_opt {
            None => nothing_to_do(),
            Some(fut) => fut.await,
        }
    }
}

fn start_graceful_shutdown_inner(
    shutdown_service_guard: MutexGuard<'_, Option<Arc<ShutdownService>>>,
    reason: &str,
    cancellation_token: CancellationToken,
    futures_cancellation_token: CancellationToken,
    finish_signal: Option<tokio::sync::oneshot::Sender<()>>,
) -> Option<impl Future<Output = ()> + 'static> {
    let shutdown_service = shutdown_service_guard.as_ref().or_else(|| {
        log::error!("Tried to request graceful shutdown with reason '{}', but 'shutdown_service' is not specified", reason);
        None
    })?.clone();

    log::info!("Requested graceful shutdown: {}", reason);

    Some(async move {
        cancellation_token.cancel();
        futures_cancellation_token.cancel();
        shutdown_service.user_lvl_shutdown().await;
        shutdown_service.core_lvl_shutdown().await;

        if let Some(finish_signal) = finish_signal {
            let _ = finish_signal.send(());
        }
    })
}
