//! Interrupt handling.
//!
//! The first SIGINT/SIGTERM starts a graceful shutdown. Further interrupts
//! count down to a forced exit for when draining hangs.

use tracing::warn;

/// Interrupts needed after the first one to force the process down.
pub const FORCE_QUIT_AFTER: u32 = 2;

/// SIGINT or SIGTERM on unix, Ctrl+C elsewhere.
pub struct QuitSignal {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl QuitSignal {
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sigint: signal(SignalKind::interrupt())?,
                sigterm: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => {}
                _ = self.sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Wait for the first quit signal, then arm the forced-exit countdown.
///
/// Signals delivered after `quit` was created but before this is awaited are
/// not lost.
pub async fn wait_for_quit(mut quit: QuitSignal) {
    quit.recv().await;
    warn!("quit signal received, shutting down gracefully");
    tokio::spawn(force_quit(quit, FORCE_QUIT_AFTER));
}

async fn force_quit(mut quit: QuitSignal, presses: u32) {
    for remaining in (1..=presses).rev() {
        warn!("Hit Ctrl-C {remaining} more times to force quit");
        quit.recv().await;
    }
    warn!("forced quit");
    std::process::exit(1);
}
