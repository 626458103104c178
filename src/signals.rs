use std::future::pending;

use tokio::signal;
use tracing::warn;

/// Resolves on the first SIGINT or SIGTERM (Ctrl+C elsewhere).
///
/// A listener that cannot be installed never resolves, so a broken signal
/// setup does not end the run on its own.
pub async fn interrupted() {
    let sigint = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let sigterm = async {
            match unix_signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to listen for SIGTERM");
                    pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = sigint => {}
            _ = sigterm => {}
        }
    }

    #[cfg(not(unix))]
    sigint.await;
}
