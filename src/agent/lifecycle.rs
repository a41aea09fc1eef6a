//! Panic-recovering wrappers around the agent's lifecycle hooks.
//!
//! Start and stop hooks run inside spawned tasks so a panicking hook is
//! observed as a [`tokio::task::JoinError`] instead of unwinding through the
//! supervisor. A panic becomes a named error the supervisor can roll back
//! on, and a panicking stop hook additionally requests whole-process
//! shutdown so the agent cannot survive in a half-stopped state.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("start hook panicked: {0}")]
    StartPanic(String),

    #[error("stop hook panicked: {0}")]
    StopPanic(String),

    #[error("process shutdown request failed after stop panic: {0}")]
    ShutdownPanic(String),
}

/// Handle for requesting whole-process shutdown. The agent's run loop holds
/// the receiving side and exits when a request arrives.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ShutdownHandle { tx }, rx)
    }

    fn request(&self) -> Result<(), String> {
        self.tx.send(()).map_err(|e| e.to_string())
    }
}

/// Run a start hook, converting a panic into [`LifecycleError::StartPanic`].
pub async fn guard_start<F>(hook: F) -> Result<(), LifecycleError>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(hook).await {
        Ok(()) => Ok(()),
        Err(join) => Err(LifecycleError::StartPanic(panic_text(join))),
    }
}

/// Run a stop hook. A panic is reported as [`LifecycleError::StopPanic`] and
/// whole-process shutdown is requested; if even that request fails, the
/// error escalates to [`LifecycleError::ShutdownPanic`].
pub async fn guard_stop<F>(hook: F, shutdown: &ShutdownHandle) -> Result<(), LifecycleError>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(hook).await {
        Ok(()) => Ok(()),
        Err(join) => {
            let text = panic_text(join);
            if let Err(send_err) = shutdown.request() {
                return Err(LifecycleError::ShutdownPanic(format!(
                    "{} (stop hook panic: {})",
                    send_err, text
                )));
            }
            Err(LifecycleError::StopPanic(text))
        }
    }
}

fn panic_text(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    match err.into_panic().downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(text) => (*text).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_hook_panic_is_recovered() {
        let result = guard_start(async { panic!("boom at startup") }).await;
        match result {
            Err(LifecycleError::StartPanic(text)) => assert!(text.contains("boom at startup")),
            other => panic!("expected StartPanic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn clean_hooks_pass_through() {
        let (handle, _rx) = ShutdownHandle::new();
        assert!(guard_start(async {}).await.is_ok());
        assert!(guard_stop(async {}, &handle).await.is_ok());
    }

    #[tokio::test]
    async fn stop_hook_panic_requests_process_shutdown() {
        let (handle, mut rx) = ShutdownHandle::new();
        let result = guard_stop(async { panic!("boom at stop") }, &handle).await;
        assert!(matches!(result, Err(LifecycleError::StopPanic(_))));
        assert!(rx.try_recv().is_ok(), "shutdown should have been requested");
    }

    #[tokio::test]
    async fn failed_shutdown_request_escalates() {
        let (handle, rx) = ShutdownHandle::new();
        drop(rx);
        let result = guard_stop(async { panic!("boom") }, &handle).await;
        assert!(matches!(result, Err(LifecycleError::ShutdownPanic(_))));
    }
}
