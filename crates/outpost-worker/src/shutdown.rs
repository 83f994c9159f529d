//! Cooperative shutdown.
//!
//! A [`ShutdownFlag`] is handed to every loop. Only the signal listener raises
//! it; loops check it once per iteration and wake from idle sleeps when it is
//! raised. A cycle that is already running always finishes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    token: CancellationToken,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the flag is raised.
    pub async fn raised(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `duration` unless shutdown is requested first.
    /// Returns `false` when woken by shutdown.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.token.cancelled() => false,
        }
    }
}

/// Spawns the signal listener: SIGINT, SIGTERM and SIGQUIT on Unix,
/// Ctrl-C elsewhere.
///
/// Handlers are registered before this returns, so a signal arriving while
/// the listener task is still unscheduled is not lost.
pub fn install_signal_handlers(flag: ShutdownFlag) -> JoinHandle<()> {
    let listener = SignalListener::register();
    tokio::spawn(async move {
        let signal = listener.recv().await;
        tracing::info!(signal, "Shutdown signal received, finishing in-flight tasks");
        flag.raise();
    })
}

enum SignalListener {
    #[cfg(unix)]
    Unix {
        interrupt: tokio::signal::unix::Signal,
        terminate: tokio::signal::unix::Signal,
        quit: tokio::signal::unix::Signal,
    },
    CtrlC,
}

impl SignalListener {
    #[cfg(unix)]
    fn register() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let streams = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        );
        match streams {
            (Ok(interrupt), Ok(terminate), Ok(quit)) => Self::Unix {
                interrupt,
                terminate,
                quit,
            },
            _ => {
                tracing::warn!("Failed to install Unix signal handlers, falling back to Ctrl-C");
                Self::CtrlC
            }
        }
    }

    #[cfg(not(unix))]
    fn register() -> Self {
        Self::CtrlC
    }

    async fn recv(self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Unix {
                mut interrupt,
                mut terminate,
                mut quit,
            } => tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = quit.recv() => "SIGQUIT",
            },
            Self::CtrlC => ctrl_c().await,
        }
    }
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn raise_is_visible_to_clones() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_raised());
        flag.raise();
        assert!(clone.is_raised());
        clone.raised().await;
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_shutdown() {
        let flag = ShutdownFlag::new();
        let sleeper = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.sleep(Duration::from_secs(3600)).await })
        };
        flag.raise();
        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn sleep_completes_without_shutdown() {
        let flag = ShutdownFlag::new();
        assert!(flag.sleep(Duration::from_millis(5)).await);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn signal_sent_right_after_install_raises_flag() {
        let flag = ShutdownFlag::new();
        let listener = install_signal_handlers(flag.clone());

        // The listener task has not been polled yet on this runtime.
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .expect("signal was not observed")
            .unwrap();
        assert!(flag.is_raised());
    }
}
